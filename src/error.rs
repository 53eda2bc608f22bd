//! Error types for hdr-inspect operations.
//!
//! Only boundary failures live here: loading and saving files, building
//! malformed images, and parsing operator names. Numeric anomalies inside
//! the compositor and the statistics engine are absorbed, never reported.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for hdr-inspect operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, comparing or exporting images.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Failed to load an image file.
    #[error("Image load failed: {path}: {reason}")]
    ImageLoad {
        /// Path to the image that failed to load.
        path: PathBuf,
        /// Reason for the failure.
        reason: String,
    },

    /// The image cannot be constructed (zero pixels, no channels, ...).
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// A channel's sample buffer does not cover the image dimensions.
    #[error("Channel {channel} has {actual} samples, expected {expected}")]
    ChannelLength {
        /// Channel name.
        channel: String,
        /// Expected sample count (width * height).
        expected: usize,
        /// Actual sample count.
        actual: usize,
    },

    /// The requested channel group does not exist in the image.
    #[error("Unknown channel group: {0:?}")]
    UnknownGroup(String),

    /// An operator name or id does not map to any variant.
    #[error("Unknown {kind}: {value}")]
    UnknownVariant {
        /// Which enumeration was being parsed (metric, tonemap, ...).
        kind: &'static str,
        /// The offending input.
        value: String,
    },

    /// No exporter handles the requested file type.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The worker pool could not be created.
    #[error("Executor error: {0}")]
    Executor(String),

    /// Encoding pixels into an output format failed.
    #[error("Encode error: {0}")]
    Encode(String),

    /// I/O error wrapper.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
