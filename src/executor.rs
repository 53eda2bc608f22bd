//! Fixed-size worker pool with chunked "parallel for" primitives.
//!
//! Work is partitioned into contiguous chunks, one task per chunk. Tasks only
//! ever receive `&mut` access to the elements of their own chunk, so disjoint
//! writes are enforced by the borrow checker rather than by locking.
//!
//! Three scheduling shapes are offered:
//!
//! - [`Executor::parallel_for_mut`]: blocking; returns once every chunk ran.
//! - [`Executor::batch`]: non-blocking scheduling of any number of
//!   [`Batch::parallel_for_mut`] calls, joined when the batch closure returns.
//!   This is the barrier between the two histogram phases.
//! - [`Executor::spawn`]: detached `'static` tasks (statistics computations),
//!   joined with [`Executor::wait_until_idle`].

use std::num::NonZeroUsize;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::error::{Error, Result};

/// Worker count matching the available hardware parallelism.
#[must_use]
pub fn default_threads() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Bounded worker pool.
pub struct Executor {
    pool: rayon::ThreadPool,
    pending: Arc<Pending>,
}

impl Executor {
    /// Create a pool with `threads` workers (at least one).
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("hdr-inspect-{i}"))
            .build()
            .map_err(|e| Error::Executor(e.to_string()))?;

        Ok(Self {
            pool,
            pending: Arc::new(Pending::default()),
        })
    }

    /// Create a pool sized to the available hardware parallelism.
    pub fn with_available_parallelism() -> Result<Self> {
        Self::new(default_threads())
    }

    /// Number of worker threads.
    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Call `f(index, &mut items[index])` for every element, in parallel
    /// chunks, and return once all chunks completed.
    pub fn parallel_for_mut<T, F>(&self, items: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Send + Sync,
    {
        self.batch(|batch| batch.parallel_for_mut(items, f));
    }

    /// Schedule work without waiting, then join all of it.
    ///
    /// Every [`Batch::parallel_for_mut`] issued inside `op` starts running
    /// immediately; `batch` returns only after all of them have finished.
    pub fn batch<'scope, OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce(&Batch<'_, 'scope>) -> R + Send,
        R: Send,
    {
        let threads = self.num_threads();
        self.pool.scope(|scope| op(&Batch { scope, threads }))
    }

    /// Run a detached task on the pool.
    ///
    /// A panic inside `task` is fatal: the pool's panic handler aborts.
    pub fn spawn<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = PendingGuard::enter(&self.pending);
        self.pool.spawn(move || {
            let _guard = guard;
            task();
        });
    }

    /// Block until every task started with [`Executor::spawn`] has finished.
    ///
    /// Must not be called from one of this pool's own workers.
    pub fn wait_until_idle(&self) {
        let mut count = self.pending.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            count = self.pending.idle.wait(count).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("threads", &self.num_threads())
            .finish_non_exhaustive()
    }
}

/// Handle for scheduling chunked work inside [`Executor::batch`].
pub struct Batch<'a, 'scope> {
    scope: &'a rayon::Scope<'scope>,
    threads: usize,
}

impl<'scope> Batch<'_, 'scope> {
    /// Schedule `f(index, &mut items[index])` for every element and return
    /// immediately. Results are only complete once the batch has returned.
    pub fn parallel_for_mut<T, F>(&self, items: &'scope mut [T], f: F)
    where
        T: Send + 'scope,
        F: Fn(usize, &mut T) + Send + Sync + 'scope,
    {
        if items.is_empty() {
            return;
        }

        let chunk_len = items.len().div_ceil(self.threads).max(1);
        let f = Arc::new(f);
        for (chunk_index, chunk) in items.chunks_mut(chunk_len).enumerate() {
            let f = Arc::clone(&f);
            let start = chunk_index * chunk_len;
            self.scope.spawn(move |_| {
                for (offset, item) in chunk.iter_mut().enumerate() {
                    f(start + offset, item);
                }
            });
        }
    }
}

#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

/// Counts a spawned task as pending until dropped, even if the task unwinds.
struct PendingGuard(Arc<Pending>);

impl PendingGuard {
    fn enter(pending: &Arc<Pending>) -> Self {
        *pending.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Self(Arc::clone(pending))
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut count = self.0.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count -= 1;
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}
