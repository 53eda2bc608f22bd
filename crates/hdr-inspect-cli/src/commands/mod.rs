//! Subcommands and the argument groups they share.

pub mod export;
pub mod probe;
pub mod stats;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use hdr_inspect::{
    CompareRequest, CropRegion, DisplaySettings, Metric, PostProcessing, Session, SessionConfig,
    Tonemap, decode,
};

/// Image selection and per-pixel operators.
#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    /// Primary image (PFM)
    pub image: PathBuf,

    /// Reference image to compare against (PFM)
    #[arg(short, long)]
    pub reference: Option<PathBuf>,

    /// Channel group (layer prefix); empty selects the root layer
    #[arg(short, long, default_value = "")]
    pub group: String,

    /// Difference metric: E, AE, SE, RAE, RSE or DIV
    #[arg(short, long, default_value = "E")]
    pub metric: Metric,

    /// Post-processing: Identity, Square, Clip10, Clip100 or Magnitude
    #[arg(short, long, default_value = "Identity")]
    pub post_processing: PostProcessing,
}

/// Display transform overrides for tonemapped export.
#[derive(Args, Debug, Clone, Default)]
pub struct DisplayArgs {
    /// Exposure in stops
    #[arg(long)]
    pub exposure: Option<f32>,

    /// Offset added after exposure
    #[arg(long)]
    pub offset: Option<f32>,

    /// Gamma for the Gamma tonemap
    #[arg(long)]
    pub gamma: Option<f32>,

    /// Tonemap: sRGB, Gamma, FC, PN, Complex, Vector or Ramp
    #[arg(long)]
    pub tonemap: Option<Tonemap>,
}

impl DisplayArgs {
    /// Apply the given overrides on top of `display`.
    pub fn apply(&self, display: DisplaySettings) -> DisplaySettings {
        DisplaySettings {
            exposure: self.exposure.unwrap_or(display.exposure),
            offset: self.offset.unwrap_or(display.offset),
            gamma: self.gamma.unwrap_or(display.gamma),
            tonemap: self.tonemap.unwrap_or(display.tonemap),
        }
    }
}

/// Parse `x0,y0,x1,y1` into a crop region.
pub fn parse_crop(s: &str) -> std::result::Result<CropRegion, String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<i64>().map_err(|e| format!("invalid crop value {v:?}: {e}")))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    match values.as_slice() {
        &[x0, y0, x1, y1] => Ok(CropRegion::new((x0, y0), (x1, y1))),
        _ => Err(format!("expected x0,y0,x1,y1, got {} values", values.len())),
    }
}

/// Session configuration from an optional file, with the thread override.
pub fn load_config(path: Option<&Path>, threads: Option<usize>) -> Result<SessionConfig> {
    let mut config = match path {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(threads) = threads {
        config.threads = threads;
    }
    Ok(config)
}

/// Load the images named by `args` and build the request.
pub fn load_request(args: &CompareArgs) -> Result<CompareRequest> {
    let image = decode::open(&args.image)
        .with_context(|| format!("Failed to load image {}", args.image.display()))?;
    tracing::info!(path = %args.image.display(), size = %image.size(), "loaded image");

    let mut request = CompareRequest::new(Arc::new(image))
        .with_group(args.group.clone())
        .with_metric(args.metric)
        .with_post_processing(args.post_processing);

    if let Some(path) = &args.reference {
        let reference = decode::open(path)
            .with_context(|| format!("Failed to load reference {}", path.display()))?;
        tracing::info!(path = %path.display(), size = %reference.size(), "loaded reference");
        if reference.size() != request.image.size() {
            tracing::warn!(
                image = %request.image.size(),
                reference = %reference.size(),
                "image sizes differ, aligning centers"
            );
        }
        request = request.with_reference(Arc::new(reference));
    }

    request.validate().with_context(|| {
        format!(
            "Available groups: {}",
            request
                .image
                .groups()
                .iter()
                .map(|g| format!("{g:?}"))
                .collect::<Vec<_>>()
                .join(", ")
        )
    })?;
    Ok(request)
}

/// Start a session for `config`.
pub fn start_session(config: SessionConfig) -> Result<Session> {
    Session::new(config).context("Failed to start worker pool")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crop() {
        assert_eq!(parse_crop("1,2,3,4").unwrap(), CropRegion::new((1, 2), (3, 4)));
        assert_eq!(parse_crop(" -5, 0 ,7,8").unwrap(), CropRegion::new((-5, 0), (7, 8)));
        assert!(parse_crop("1,2,3").is_err());
        assert!(parse_crop("a,b,c,d").is_err());
    }

    #[test]
    fn test_display_overrides() {
        let args = DisplayArgs {
            exposure: Some(1.5),
            tonemap: Some(Tonemap::PositiveNegative),
            ..DisplayArgs::default()
        };
        let display = args.apply(DisplaySettings::default());
        assert_eq!(display.exposure, 1.5);
        assert_eq!(display.offset, 0.0);
        assert_eq!(display.gamma, 2.2);
        assert_eq!(display.tonemap, Tonemap::PositiveNegative);
    }

    #[test]
    fn test_load_config_threads_override() {
        let config = load_config(None, Some(2)).unwrap();
        assert_eq!(config.threads, 2);
        assert!(load_config(Some(Path::new("/nonexistent/config.json")), None).is_err());
    }
}
