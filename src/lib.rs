//! # hdr-inspect
//!
//! High-dynamic-range image comparison core.
//!
//! A primary image is compared against an optional reference under
//! configurable per-pixel operators. The result is available both as a pixel
//! stream for display and export, and as cached region statistics (mean,
//! minimum, maximum and a symmetric-log histogram).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hdr_inspect::{CompareRequest, CropRegion, Metric, PostProcessing, Session, SessionConfig, decode};
//!
//! let session = Session::new(SessionConfig::default())?;
//! let request = CompareRequest::new(Arc::new(decode::open("a.pfm")?))
//!     .with_reference(Arc::new(decode::open("b.pfm")?))
//!     .with_metric(Metric::AbsoluteError)
//!     .with_post_processing(PostProcessing::Clip10);
//!
//! let handle = session.statistics(&request, Some(CropRegion::new((0, 0), (64, 64))));
//! if let Some(stats) = handle.try_get() {
//!     println!("already done: {}", stats.mean);
//! }
//! println!("max {}", handle.wait().maximum);
//! # Ok::<(), hdr_inspect::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`error`]: Error types for the library
//! - [`image`]: Channels, channel groups and images
//! - [`crop`]: Crop normalization and pixel rectangles
//! - [`operators`]: Metric, post-processing and tonemap operators
//! - [`composite`]: Merging a primary image with a reference
//! - [`stats`]: Region statistics and histograms
//! - [`cache`]: Fingerprint-keyed statistics cache
//! - [`executor`]: Worker pool with parallel-for primitives
//! - [`export`]: Flat pixel export and file encoders
//! - [`decode`]: PFM decoding
//! - [`session`]: Comparison session tying everything together

pub mod cache;
pub mod composite;
pub mod crop;
pub mod decode;
pub mod error;
pub mod executor;
pub mod export;
pub mod image;
pub mod operators;
pub mod session;
pub mod stats;

// Re-export commonly used types
pub use cache::{Fingerprint, StatisticsCache, StatisticsHandle};
pub use composite::{Composite, compose};
pub use crop::{CropRegion, PixelRect};
pub use error::{Error, Result};
pub use executor::Executor;
pub use export::{DisplaySettings, DynamicRange, ExportPixels, Exporter};
pub use image::{Channel, Image, ImageId, Size};
pub use operators::{Metric, PostProcessing, Tonemap};
pub use session::{CompareRequest, Session, SessionConfig};
pub use stats::{Histogram, Statistics};
