//! Comparison session: the entry point tying compositor, statistics,
//! cache and export together.
//!
//! A [`Session`] owns its worker pool and its statistics cache; cached
//! results live exactly as long as the session.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use imgref::ImgVec;
use rgb::{RGBA, RGBA8};
use serde::{Deserialize, Serialize};

use crate::cache::{Fingerprint, StatisticsCache, StatisticsHandle};
use crate::composite::{Composite, compose};
use crate::crop::CropRegion;
use crate::error::{Error, Result};
use crate::executor::{Executor, default_threads};
use crate::export::{self, DisplaySettings, DynamicRange, ExportPixels, Exporter};
use crate::image::Image;
use crate::operators::{Metric, PostProcessing};
use crate::stats::compute_statistics;

/// Configuration for a comparison session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Worker threads in the pool.
    pub threads: usize,

    /// Maximum number of cached statistics; `None` keeps everything.
    pub cache_capacity: Option<usize>,

    /// Display transform for LDR export.
    pub display: DisplaySettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            cache_capacity: None,
            display: DisplaySettings::default(),
        }
    }
}

impl SessionConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Read a configuration from a JSON file. Missing fields take their
    /// default values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    threads: Option<usize>,
    cache_capacity: Option<usize>,
    display: Option<DisplaySettings>,
}

impl SessionConfigBuilder {
    /// Set the number of worker threads.
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Bound the statistics cache.
    #[must_use]
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Set the display transform used for LDR export.
    #[must_use]
    pub fn display(mut self, display: DisplaySettings) -> Self {
        self.display = Some(display);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            threads: self.threads.unwrap_or_else(default_threads),
            cache_capacity: self.cache_capacity,
            display: self.display.unwrap_or_default(),
        }
    }
}

/// What to compare: an image, an optional reference, the channel group and
/// the per-pixel operators.
#[derive(Debug, Clone)]
pub struct CompareRequest {
    /// Primary image.
    pub image: Arc<Image>,
    /// Optional reference image.
    pub reference: Option<Arc<Image>>,
    /// Channel group (layer prefix, `""` for the root layer).
    pub group: String,
    /// Difference function against the reference.
    pub metric: Metric,
    /// Transform applied after the metric.
    pub post_processing: PostProcessing,
}

impl CompareRequest {
    /// Request for the root channel group of `image`, without a reference.
    #[must_use]
    pub fn new(image: Arc<Image>) -> Self {
        Self {
            image,
            reference: None,
            group: String::new(),
            metric: Metric::default(),
            post_processing: PostProcessing::default(),
        }
    }

    /// Compare against `reference`.
    #[must_use]
    pub fn with_reference(mut self, reference: Arc<Image>) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Select a channel group.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Set the metric.
    #[must_use]
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Set the post-processing.
    #[must_use]
    pub fn with_post_processing(mut self, post_processing: PostProcessing) -> Self {
        self.post_processing = post_processing;
        self
    }

    /// Check that the group exists in the primary image.
    ///
    /// Session operations accept unknown groups (they produce empty results);
    /// this is for front-ends that want to reject them up front.
    pub fn validate(&self) -> Result<()> {
        if self.image.has_group(&self.group) {
            Ok(())
        } else {
            Err(Error::UnknownGroup(self.group.clone()))
        }
    }

    /// Cache key of this request's statistics over `crop`.
    #[must_use]
    pub fn fingerprint(&self, crop: Option<CropRegion>) -> Fingerprint {
        Fingerprint::new(
            self.image.id(),
            &self.image.channels_in_group(&self.group),
            self.reference.as_ref().map(|r| (r.id(), self.metric)),
            self.post_processing,
            crop,
        )
    }

    fn compose(&self, executor: &Executor) -> Composite {
        compose(
            executor,
            &self.image,
            self.reference.as_deref(),
            &self.group,
            self.metric,
            self.post_processing,
        )
    }
}

/// Comparison session owning a worker pool and a statistics cache.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use std::sync::Arc;
/// use hdr_inspect::{CompareRequest, Metric, Session, SessionConfig, decode};
///
/// let session = Session::new(SessionConfig::builder().threads(4).build())?;
/// let image = Arc::new(decode::open("render.pfm")?);
/// let reference = Arc::new(decode::open("reference.pfm")?);
///
/// let request = CompareRequest::new(image)
///     .with_reference(reference)
///     .with_metric(Metric::RelativeSquaredError);
///
/// let stats = session.statistics(&request, None).wait();
/// println!("mean {}", stats.mean);
/// session.save(&request, Path::new("difference.png"))?;
/// # Ok::<(), hdr_inspect::Error>(())
/// ```
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    executor: Arc<Executor>,
    cache: StatisticsCache,
}

impl Session {
    /// Create a session, starting its worker pool.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let executor = Arc::new(Executor::new(config.threads)?);
        let cache = StatisticsCache::with_capacity(Arc::clone(&executor), config.cache_capacity);
        tracing::debug!(
            threads = executor.num_threads(),
            cache_capacity = ?config.cache_capacity,
            "created session"
        );
        Ok(Self {
            config,
            executor,
            cache,
        })
    }

    /// Session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Statistics cache.
    #[must_use]
    pub fn cache(&self) -> &StatisticsCache {
        &self.cache
    }

    /// Full-resolution composite of `request`.
    #[must_use]
    pub fn composite(&self, request: &CompareRequest) -> Composite {
        request.compose(&self.executor)
    }

    /// Statistics of `request` over `crop`, computed at most once per
    /// fingerprint. Returns immediately; poll or wait on the handle.
    pub fn statistics(&self, request: &CompareRequest, crop: Option<CropRegion>) -> StatisticsHandle {
        let fingerprint = request.fingerprint(crop);
        let request = request.clone();
        let executor = Arc::clone(&self.executor);
        self.cache.get_or_compute(fingerprint, move || {
            let composite = request.compose(&executor);
            compute_statistics(&executor, composite, crop)
        })
    }

    /// Interleaved float RGBA pixels of the composite (`None` without channels).
    #[must_use]
    pub fn hdr_pixels(&self, request: &CompareRequest, divide_alpha: bool) -> Option<ImgVec<RGBA<f32>>> {
        export::hdr_pixels(&self.executor, &self.composite(request), divide_alpha)
    }

    /// Display-encoded 8-bit RGBA pixels using the session's display settings.
    #[must_use]
    pub fn ldr_pixels(&self, request: &CompareRequest, divide_alpha: bool) -> Option<ImgVec<RGBA8>> {
        export::ldr_pixels(
            &self.executor,
            &self.composite(request),
            divide_alpha,
            &self.config.display,
        )
    }

    /// Save the composite to `path`, choosing the exporter by extension.
    ///
    /// A composite without channels writes nothing.
    pub fn save(&self, request: &CompareRequest, path: &Path) -> Result<()> {
        let exporter = Exporter::for_path(path)?;
        let start = Instant::now();
        let divide_alpha = !exporter.has_premultiplied_alpha();

        let pixels = match exporter.dynamic_range() {
            DynamicRange::Hdr => self.hdr_pixels(request, divide_alpha).map(ExportPixels::Hdr),
            DynamicRange::Ldr => self.ldr_pixels(request, divide_alpha).map(ExportPixels::Ldr),
        };
        let Some(pixels) = pixels else {
            tracing::warn!(path = %path.display(), group = %request.group, "nothing to save, composite has no channels");
            return Ok(());
        };

        exporter.save(&pixels, path)?;
        tracing::info!(
            path = %path.display(),
            format = exporter.extension(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "saved composite"
        );
        Ok(())
    }

    /// Block until every scheduled statistics computation has finished.
    pub fn wait_until_idle(&self) {
        self.executor.wait_until_idle();
    }
}

/// Output path next to `input` with the given extension.
#[must_use]
pub fn sibling_path(input: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = input.file_stem().map_or_else(|| "image".into(), |s| s.to_string_lossy().into_owned());
    input.with_file_name(format!("{stem}{suffix}.{extension}"))
}
