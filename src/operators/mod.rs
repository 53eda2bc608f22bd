//! Stateless per-pixel operators.
//!
//! Three closed operator families are applied, in this order, to every sample
//! that reaches the screen or an exported file:
//!
//! 1. [`Metric`]: compares a primary sample against a reference sample.
//! 2. [`PostProcessing`]: reshapes the metric output.
//! 3. [`Tonemap`]: encodes an RGB triple for display (display/export only,
//!    never used for statistics).
//!
//! | Metric | Formula |
//! |--------|---------|
//! | Error | `v - r` |
//! | AbsoluteError | `\|v - r\|` |
//! | SquaredError | `(v - r)^2` |
//! | RelativeAbsoluteError | `\|v - r\| / (r + 0.001)` |
//! | RelativeSquaredError | `(v - r)^2 / (r^2 + 0.001)` |
//! | Division | `(v + 0.001) / (r + 0.001)` |
//!
//! All operators are pure functions on explicit numeric inputs, so a shader,
//! an export encoder or a terminal renderer can call them identically.

pub mod tonemap;

use std::fmt;
use std::str::FromStr;

use rgb::RGB;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use tonemap::{Tonemap, to_srgb};

/// Regularizer for relative metrics and division.
pub const METRIC_EPSILON: f32 = 0.001;

/// Per-pixel difference between a primary and a reference sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Metric {
    /// `value - reference`
    #[default]
    Error,
    /// `|value - reference|`
    AbsoluteError,
    /// `(value - reference)^2`
    SquaredError,
    /// `|value - reference| / (reference + eps)`
    RelativeAbsoluteError,
    /// `(value - reference)^2 / (reference^2 + eps)`
    RelativeSquaredError,
    /// `(value + eps) / (reference + eps)`
    Division,
}

impl Metric {
    /// Every metric, in id order.
    pub const ALL: [Self; 6] = [
        Self::Error,
        Self::AbsoluteError,
        Self::SquaredError,
        Self::RelativeAbsoluteError,
        Self::RelativeSquaredError,
        Self::Division,
    ];

    /// Apply the metric to one sample pair.
    #[inline]
    #[must_use]
    pub fn apply(self, value: f32, reference: f32) -> f32 {
        let diff = value - reference;
        match self {
            Self::Error => diff,
            Self::AbsoluteError => diff.abs(),
            Self::SquaredError => diff * diff,
            Self::RelativeAbsoluteError => diff.abs() / (reference + METRIC_EPSILON),
            Self::RelativeSquaredError => diff * diff / (reference * reference + METRIC_EPSILON),
            Self::Division => (value + METRIC_EPSILON) / (reference + METRIC_EPSILON),
        }
    }

    /// Stable numeric id, used in cache fingerprints.
    #[must_use]
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Short code, as accepted on the command line.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Error => "E",
            Self::AbsoluteError => "AE",
            Self::SquaredError => "SE",
            Self::RelativeAbsoluteError => "RAE",
            Self::RelativeSquaredError => "RSE",
            Self::Division => "DIV",
        }
    }
}

impl TryFrom<u8> for Metric {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self> {
        Self::ALL.get(usize::from(id)).copied().ok_or_else(|| Error::UnknownVariant {
            kind: "metric",
            value: id.to_string(),
        })
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.code().eq_ignore_ascii_case(s) || m.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownVariant {
                kind: "metric",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "Error"),
            Self::AbsoluteError => write!(f, "AbsoluteError"),
            Self::SquaredError => write!(f, "SquaredError"),
            Self::RelativeAbsoluteError => write!(f, "RelativeAbsoluteError"),
            Self::RelativeSquaredError => write!(f, "RelativeSquaredError"),
            Self::Division => write!(f, "Division"),
        }
    }
}

/// Scalar reshaping applied after the metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PostProcessing {
    /// `v`
    #[default]
    Identity,
    /// `v^2`
    Square,
    /// `min(v, 10)`
    Clip10,
    /// `min(v, 100)`
    Clip100,
    /// Euclidean length across the non-alpha channels of a pixel.
    ///
    /// This is a cross-channel operator: the compositor evaluates it over
    /// whole pixels. Applied to a lone scalar it degenerates to `|v|`.
    Magnitude,
}

impl PostProcessing {
    /// Every post-processing variant, in id order.
    pub const ALL: [Self; 5] = [
        Self::Identity,
        Self::Square,
        Self::Clip10,
        Self::Clip100,
        Self::Magnitude,
    ];

    /// Apply to a single sample.
    #[inline]
    #[must_use]
    pub fn apply(self, value: f32) -> f32 {
        match self {
            Self::Identity => value,
            Self::Square => value * value,
            Self::Clip10 => value.min(10.0),
            Self::Clip100 => value.min(100.0),
            Self::Magnitude => value.abs(),
        }
    }

    /// Apply to an RGB triple, as the display path does.
    #[must_use]
    pub fn apply_rgb(self, value: RGB<f32>) -> RGB<f32> {
        match self {
            Self::Magnitude => {
                let length = (value.r * value.r + value.g * value.g + value.b * value.b).sqrt();
                RGB::new(length, length, length)
            }
            _ => RGB::new(self.apply(value.r), self.apply(value.g), self.apply(value.b)),
        }
    }

    /// Whether each channel can be processed independently of the others.
    #[must_use]
    pub fn is_per_channel(self) -> bool {
        self != Self::Magnitude
    }

    /// Stable numeric id, used in cache fingerprints.
    #[must_use]
    pub fn id(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PostProcessing {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self> {
        Self::ALL.get(usize::from(id)).copied().ok_or_else(|| Error::UnknownVariant {
            kind: "post-processing",
            value: id.to_string(),
        })
    }
}

impl FromStr for PostProcessing {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownVariant {
                kind: "post-processing",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for PostProcessing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "Identity"),
            Self::Square => write!(f, "Square"),
            Self::Clip10 => write!(f, "Clip10"),
            Self::Clip100 => write!(f, "Clip100"),
            Self::Magnitude => write!(f, "Magnitude"),
        }
    }
}

/// Exposure scaling and offset applied before tonemapping:
/// `2^exposure * v + offset`.
#[inline]
#[must_use]
pub fn apply_exposure_and_offset(value: f32, exposure: f32, offset: f32) -> f32 {
    exposure.exp2() * value + offset
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: [f32; 9] = [-1e6, -150.0, -3.5, -0.001, 0.0, 0.25, 9.99, 42.0, 1e7];

    #[test]
    fn test_metric_formulas() {
        assert_eq!(Metric::Error.apply(3.0, 1.0), 2.0);
        assert_eq!(Metric::AbsoluteError.apply(1.0, 3.0), 2.0);
        assert_eq!(Metric::SquaredError.apply(1.0, 4.0), 9.0);
        assert!((Metric::RelativeAbsoluteError.apply(1.0, 3.0) - 2.0 / 3.001).abs() < 1e-6);
        assert!((Metric::RelativeSquaredError.apply(1.0, 3.0) - 4.0 / 9.001).abs() < 1e-6);
        assert!((Metric::Division.apply(2.0, 1.0) - 2.001 / 1.001).abs() < 1e-6);
    }

    #[test]
    fn test_identical_inputs_give_neutral_error() {
        for v in SAMPLES {
            assert_eq!(Metric::Error.apply(v, v), 0.0);
            assert_eq!(Metric::SquaredError.apply(v, v), 0.0);
        }
    }

    #[test]
    fn test_post_processing_bounds() {
        for v in SAMPLES {
            assert!(PostProcessing::Clip10.apply(v) <= 10.0);
            assert!(PostProcessing::Clip100.apply(v) <= 100.0);
            assert!(PostProcessing::Square.apply(v) >= 0.0);
            assert_eq!(PostProcessing::Identity.apply(v), v);
        }
    }

    #[test]
    fn test_magnitude_rgb() {
        let out = PostProcessing::Magnitude.apply_rgb(RGB::new(3.0, 0.0, -4.0));
        assert_eq!(out, RGB::new(5.0, 5.0, 5.0));
        assert_eq!(PostProcessing::Magnitude.apply(-2.5), 2.5);
    }

    #[test]
    fn test_parse_codes_and_names() {
        assert_eq!("rae".parse::<Metric>().unwrap(), Metric::RelativeAbsoluteError);
        assert_eq!("Division".parse::<Metric>().unwrap(), Metric::Division);
        assert_eq!("clip100".parse::<PostProcessing>().unwrap(), PostProcessing::Clip100);
        assert!(matches!(
            "bogus".parse::<Metric>(),
            Err(Error::UnknownVariant { kind: "metric", .. })
        ));
    }

    #[test]
    fn test_ids_round_trip() {
        for m in Metric::ALL {
            assert_eq!(Metric::try_from(m.id()).unwrap(), m);
        }
        for p in PostProcessing::ALL {
            assert_eq!(PostProcessing::try_from(p.id()).unwrap(), p);
        }
        assert!(Metric::try_from(6).is_err());
        assert!(PostProcessing::try_from(200).is_err());
    }

    #[test]
    fn test_exposure_and_offset() {
        assert_eq!(apply_exposure_and_offset(1.0, 1.0, 0.5), 2.5);
        assert_eq!(apply_exposure_and_offset(3.0, 0.0, 0.0), 3.0);
    }
}
