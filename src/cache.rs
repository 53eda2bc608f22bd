//! Memoized statistics, keyed by request fingerprint.
//!
//! [`StatisticsCache::get_or_compute`] is the single synchronization point
//! between concurrent statistics requests: the lookup and the insertion of a
//! pending entry happen under one lock, so concurrent first-time requests for
//! the same [`Fingerprint`] collapse into one scheduled computation and every
//! caller receives a clone of the same [`StatisticsHandle`].
//!
//! Computations are never cancelled. Without a capacity the cache grows for
//! the lifetime of its owner; with one, only completed entries are evicted.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::crop::CropRegion;
use crate::executor::Executor;
use crate::image::ImageId;
use crate::operators::{Metric, PostProcessing};
use crate::stats::Statistics;

/// Deterministic key of a statistics request.
///
/// Built from the image id, the comma-joined channel names, the reference id
/// and metric (only with a reference, since the metric is inert without
/// one), the post-processing id and, when cropping, the raw crop corners.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of a request.
    #[must_use]
    pub fn new(
        image: ImageId,
        channels: &[&str],
        reference: Option<(ImageId, Metric)>,
        post_processing: PostProcessing,
        crop: Option<CropRegion>,
    ) -> Self {
        let channels = channels.join(",");
        let mut key = match reference {
            Some((reference, metric)) => format!(
                "{image}-{channels}-{reference}-{}-{}",
                metric.id(),
                post_processing.id()
            ),
            None => format!("{image}-{channels}-{}", post_processing.id()),
        };
        if let Some(crop) = crop {
            key.push_str(&format!(
                "-crop-{}-{}-{}-{}",
                crop.min.0, crop.min.1, crop.max.0, crop.max.1
            ));
        }
        Self(key)
    }

    /// The key as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Default)]
struct Slot {
    value: Mutex<Option<Arc<Statistics>>>,
    ready: Condvar,
}

/// Shared handle to a possibly still running statistics computation.
///
/// Once set, the value never changes; all clones observe the same `Arc`.
#[derive(Clone, Default)]
pub struct StatisticsHandle {
    slot: Arc<Slot>,
}

impl StatisticsHandle {
    fn pending() -> Self {
        Self::default()
    }

    fn set(&self, statistics: Statistics) {
        let mut value = self.slot.value.lock().unwrap_or_else(PoisonError::into_inner);
        if value.is_none() {
            *value = Some(Arc::new(statistics));
            self.slot.ready.notify_all();
        }
    }

    /// The result, if the computation has finished. Never blocks on it.
    #[must_use]
    pub fn try_get(&self) -> Option<Arc<Statistics>> {
        self.slot.value.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Whether the computation has finished.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.slot.value.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Block until the computation has finished and return its result.
    ///
    /// Must not be called from a worker of the executor running the
    /// computation, which could deadlock a single-threaded pool.
    #[must_use]
    pub fn wait(&self) -> Arc<Statistics> {
        let mut value = self.slot.value.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(statistics) = value.as_ref() {
                return Arc::clone(statistics);
            }
            value = self.slot.ready.wait(value).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Whether two handles refer to the same computation.
    #[must_use]
    pub fn same_computation(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl fmt::Debug for StatisticsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatisticsHandle")
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[derive(Default)]
struct Entries {
    map: HashMap<Fingerprint, StatisticsHandle>,
    order: VecDeque<Fingerprint>,
}

impl Entries {
    fn evict(&mut self, capacity: usize) {
        while self.map.len() > capacity {
            let Some(position) = self
                .order
                .iter()
                .position(|fp| self.map.get(fp).is_some_and(StatisticsHandle::is_ready))
            else {
                break;
            };
            if let Some(fingerprint) = self.order.remove(position) {
                tracing::debug!(%fingerprint, "evicted statistics");
                self.map.remove(&fingerprint);
            }
        }
    }
}

/// Fingerprint-keyed statistics cache that schedules misses on an executor.
pub struct StatisticsCache {
    executor: Arc<Executor>,
    capacity: Option<usize>,
    entries: Mutex<Entries>,
}

impl StatisticsCache {
    /// Unbounded cache scheduling on `executor`.
    #[must_use]
    pub fn new(executor: Arc<Executor>) -> Self {
        Self::with_capacity(executor, None)
    }

    /// Cache holding at most `capacity` completed entries (`None`: unbounded).
    #[must_use]
    pub fn with_capacity(executor: Arc<Executor>, capacity: Option<usize>) -> Self {
        Self {
            executor,
            capacity,
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Return the handle for `fingerprint`, scheduling `compute` on a miss.
    ///
    /// Existing entries are returned as-is, finished or not; `compute` is
    /// then dropped without being called.
    pub fn get_or_compute<F>(&self, fingerprint: Fingerprint, compute: F) -> StatisticsHandle
    where
        F: FnOnce() -> Statistics + Send + 'static,
    {
        let handle = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(handle) = entries.map.get(&fingerprint) {
                tracing::debug!(%fingerprint, ready = handle.is_ready(), "statistics cache hit");
                return handle.clone();
            }

            tracing::debug!(%fingerprint, "statistics cache miss");
            let handle = StatisticsHandle::pending();
            entries.map.insert(fingerprint.clone(), handle.clone());
            entries.order.push_back(fingerprint);
            if let Some(capacity) = self.capacity {
                entries.evict(capacity);
            }
            handle
        };

        let result = handle.clone();
        self.executor.spawn(move || handle.set(compute()));
        result
    }

    /// Number of entries, pending ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).map.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Executor computations are scheduled on.
    #[must_use]
    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }
}

impl fmt::Debug for StatisticsCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatisticsCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crop::PixelRect;
    use crate::image::{Channel, Image, Size};
    use crate::stats::Histogram;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Barrier, mpsc};
    use std::time::Duration;

    fn stub(mean: f32) -> Statistics {
        Statistics {
            mean,
            minimum: mean,
            maximum: mean,
            histogram: Histogram::empty(),
            histogram_zero_bin: 0,
            channels: Vec::new(),
            sample_count: 1,
            region: PixelRect::full(Size::new(1, 1)),
        }
    }

    fn key(name: &str) -> Fingerprint {
        Fingerprint(name.to_string())
    }

    fn image() -> Image {
        let size = Size::new(1, 1);
        Image::new(size, vec![Channel::new("R", size)]).unwrap()
    }

    #[test]
    fn test_fingerprint_format() {
        let a = image();
        let b = image();
        let plain = Fingerprint::new(a.id(), &["R", "G"], None, PostProcessing::Square, None);
        assert_eq!(plain.as_str(), format!("{}-R,G-1", a.id()));

        let compared = Fingerprint::new(
            a.id(),
            &["R", "G"],
            Some((b.id(), Metric::SquaredError)),
            PostProcessing::Identity,
            Some(CropRegion::new((4, 3), (-1, 2))),
        );
        assert_eq!(
            compared.as_str(),
            format!("{}-R,G-{}-2-0-crop-4-3--1-2", a.id(), b.id())
        );
    }

    #[test]
    fn test_fingerprint_distinguishes_images() {
        let a = image();
        let b = image();
        assert_ne!(
            Fingerprint::new(a.id(), &["R"], None, PostProcessing::Identity, None),
            Fingerprint::new(b.id(), &["R"], None, PostProcessing::Identity, None)
        );
    }

    #[test]
    fn test_concurrent_requests_compute_once() {
        let cache = StatisticsCache::new(Arc::new(Executor::new(4).unwrap()));
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Barrier::new(8);

        let handles: Vec<StatisticsHandle> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        let calls = Arc::clone(&calls);
                        cache.get_or_compute(key("same"), move || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(20));
                            stub(2.0)
                        })
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        let first = handles[0].wait();
        for handle in &handles {
            assert!(handle.same_computation(&handles[0]));
            assert!(Arc::ptr_eq(&handle.wait(), &first));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.mean, 2.0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_poll_before_and_after_completion() {
        let cache = StatisticsCache::new(Arc::new(Executor::new(2).unwrap()));
        let (tx, rx) = mpsc::channel::<()>();
        let handle = cache.get_or_compute(key("slow"), move || {
            rx.recv().ok();
            stub(1.0)
        });
        assert!(!handle.is_ready());
        assert!(handle.try_get().is_none());

        tx.send(()).unwrap();
        assert_eq!(handle.wait().mean, 1.0);
        assert!(handle.is_ready());
        assert_eq!(handle.try_get().unwrap().mean, 1.0);
    }

    #[test]
    fn test_capacity_evicts_completed_entries_only() {
        let executor = Arc::new(Executor::new(2).unwrap());
        let cache = StatisticsCache::with_capacity(Arc::clone(&executor), Some(1));

        let (tx, rx) = mpsc::channel::<()>();
        let blocked = cache.get_or_compute(key("a"), move || {
            rx.recv().ok();
            stub(1.0)
        });
        let b = cache.get_or_compute(key("b"), || stub(2.0));
        assert_eq!(b.wait().mean, 2.0);
        // "a" is still pending, so only "b" may go
        let c = cache.get_or_compute(key("c"), || stub(3.0));
        assert_eq!(cache.len(), 2);

        tx.send(()).unwrap();
        assert_eq!(blocked.wait().mean, 1.0);
        assert_eq!(c.wait().mean, 3.0);
        let again = cache.get_or_compute(key("a"), || stub(9.0));
        assert!(again.same_computation(&blocked));

        cache.get_or_compute(key("d"), || stub(4.0));
        assert_eq!(cache.len(), 1);
        executor.wait_until_idle();
    }

    #[test]
    fn test_unbounded_cache_keeps_everything() {
        let executor = Arc::new(Executor::new(2).unwrap());
        let cache = StatisticsCache::new(Arc::clone(&executor));
        for i in 0..20 {
            cache.get_or_compute(key(&format!("k{i}")), move || stub(i as f32));
        }
        executor.wait_until_idle();
        assert_eq!(cache.len(), 20);
    }
}
