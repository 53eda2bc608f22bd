//! Display and export color encoding.
//!
//! Tonemaps turn a linear RGB triple into a `[0, 1]` display triple. They are
//! only used on the way to the screen or to a low-dynamic-range file and
//! never feed into statistics.

use std::fmt;
use std::str::FromStr;

use rgb::RGB;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Offset added before taking log2 in the false-color mapping.
const FALSE_COLOR_FLOOR: f32 = 1.0 / 32.0;

/// False-color ramp: black, purple, magenta, orange, pale yellow.
const FALSE_COLOR_STOPS: [[u8; 3]; 5] = [
    [0, 0, 0],
    [80, 18, 123],
    [181, 54, 121],
    [251, 136, 97],
    [251, 252, 191],
];

/// Fixed gamma used by the single-channel ramp.
const RAMP_GAMMA: f32 = 2.2;

/// Color encoding for display and export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Tonemap {
    /// sRGB transfer curve per channel.
    #[default]
    Srgb,
    /// `v^(1/gamma)` per channel.
    Gamma,
    /// Log-scaled mean mapped through a perceptual color ramp.
    FalseColor,
    /// Negative mean to red, positive mean to green.
    PositiveNegative,
    /// Complex-domain hue mapping.
    ///
    /// Not implemented on the CPU path: always returns black.
    Complex,
    /// Unit direction mapped to `[0, 1]` per axis; a zero vector is
    /// mid-grey.
    Vector,
    /// Piecewise-linear blue/green/red ramp over the gamma-corrected first
    /// channel.
    FalseColorRamp,
}

impl Tonemap {
    /// Every tonemap, in id order.
    pub const ALL: [Self; 7] = [
        Self::Srgb,
        Self::Gamma,
        Self::FalseColor,
        Self::PositiveNegative,
        Self::Complex,
        Self::Vector,
        Self::FalseColorRamp,
    ];

    /// Encode `value`, clamping the result into `[0, 1]` per channel.
    ///
    /// `gamma` is only read by [`Tonemap::Gamma`].
    #[must_use]
    pub fn apply(self, value: RGB<f32>, gamma: f32) -> RGB<f32> {
        let result = match self {
            Self::Srgb => map(value, to_srgb),
            Self::Gamma => map(value, |v| v.powf(1.0 / gamma)),
            Self::FalseColor => false_color(mean(value)),
            Self::PositiveNegative => RGB::new(
                -2.0 * mean(map(value, |v| v.min(0.0))),
                2.0 * mean(map(value, |v| v.max(0.0))),
                0.0,
            ),
            Self::Complex => RGB::new(0.0, 0.0, 0.0),
            Self::Vector => {
                let norm = (value.r * value.r + value.g * value.g + value.b * value.b).sqrt();
                // a zero vector has no direction and lands on the midpoint
                let inverse = if norm > 0.0 { norm.recip() } else { 0.0 };
                map(value, |v| to_srgb(0.5 * (1.0 + v * inverse)))
            }
            Self::FalseColorRamp => ramp(value.r.max(0.0).powf(1.0 / RAMP_GAMMA)),
        };

        // max/min rather than clamp so NaN lands on 0
        map(result, |v| v.max(0.0).min(1.0))
    }

    /// Stable numeric id.
    #[must_use]
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Short code, as accepted on the command line.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Srgb => "sRGB",
            Self::Gamma => "Gamma",
            Self::FalseColor => "FC",
            Self::PositiveNegative => "PN",
            Self::Complex => "Complex",
            Self::Vector => "Vector",
            Self::FalseColorRamp => "Ramp",
        }
    }
}

impl TryFrom<u8> for Tonemap {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self> {
        Self::ALL.get(usize::from(id)).copied().ok_or_else(|| Error::UnknownVariant {
            kind: "tonemap",
            value: id.to_string(),
        })
    }
}

impl FromStr for Tonemap {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.code().eq_ignore_ascii_case(s) || t.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownVariant {
                kind: "tonemap",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for Tonemap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Srgb => write!(f, "Srgb"),
            Self::Gamma => write!(f, "Gamma"),
            Self::FalseColor => write!(f, "FalseColor"),
            Self::PositiveNegative => write!(f, "PositiveNegative"),
            Self::Complex => write!(f, "Complex"),
            Self::Vector => write!(f, "Vector"),
            Self::FalseColorRamp => write!(f, "FalseColorRamp"),
        }
    }
}

/// sRGB encoding (linear to sRGB); input is clamped to `[0, 1]` first.
#[inline]
#[must_use]
pub fn to_srgb(linear: f32) -> f32 {
    let v = linear.max(0.0).min(1.0);
    if v < 0.003_130_8 {
        12.92 * v
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

/// sRGB decoding (sRGB to linear); input is clamped to `[0, 1]` first.
#[cfg(test)]
fn to_linear(srgb: f32) -> f32 {
    let v = srgb.max(0.0).min(1.0);
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

#[inline]
fn map(value: RGB<f32>, f: impl Fn(f32) -> f32) -> RGB<f32> {
    RGB::new(f(value.r), f(value.g), f(value.b))
}

#[inline]
fn mean(value: RGB<f32>) -> f32 {
    (value.r + value.g + value.b) / 3.0
}

fn stop(index: usize) -> RGB<f32> {
    let [r, g, b] = FALSE_COLOR_STOPS[index];
    RGB::new(f32::from(r) / 255.0, f32::from(g) / 255.0, f32::from(b) / 255.0)
}

fn false_color(v: f32) -> RGB<f32> {
    let t = ((v + FALSE_COLOR_FLOOR).log2() / 10.0 + 0.5).max(0.0).min(1.0);
    let last = FALSE_COLOR_STOPS.len() - 1;
    let position = t * last as f32;
    let lower = (position as usize).min(last);
    let upper = (lower + 1).min(last);
    let alpha = position - lower as f32;

    let (c0, c1) = (stop(lower), stop(upper));
    RGB::new(
        (1.0 - alpha) * c0.r + alpha * c1.r,
        (1.0 - alpha) * c0.g + alpha * c1.g,
        (1.0 - alpha) * c0.b + alpha * c1.b,
    )
}

fn ramp(v: f32) -> RGB<f32> {
    let v = v.max(0.0).min(1.0);
    if v < 0.25 {
        RGB::new(0.0, 4.0 * v, 1.0)
    } else if v < 0.5 {
        RGB::new(0.0, 1.0, 1.0 + 4.0 * (0.25 - v))
    } else if v < 0.75 {
        RGB::new(4.0 * (v - 0.5), 1.0, 0.0)
    } else {
        RGB::new(1.0, 1.0 + 4.0 * (0.75 - v), 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: RGB<f32>, b: RGB<f32>) -> bool {
        (a.r - b.r).abs() < 1e-4 && (a.g - b.g).abs() < 1e-4 && (a.b - b.b).abs() < 1e-4
    }

    #[test]
    fn test_srgb_curve() {
        assert_eq!(to_srgb(0.0), 0.0);
        assert!((to_srgb(1.0) - 1.0).abs() < 1e-6);
        assert_eq!(to_srgb(5.0), to_srgb(1.0));
        assert!((to_linear(to_srgb(0.2)) - 0.2).abs() < 1e-4);
    }

    #[test]
    fn test_outputs_are_clamped() {
        let inputs = [
            RGB::new(-4.0, 0.5, 12.0),
            RGB::new(f32::NAN, 1.0, 0.0),
            RGB::new(1e9, -1e9, 0.0),
        ];
        for tonemap in Tonemap::ALL {
            for input in inputs {
                let out = tonemap.apply(input, 2.2);
                for c in [out.r, out.g, out.b] {
                    assert!((0.0..=1.0).contains(&c), "{tonemap}: {c}");
                }
            }
        }
    }

    #[test]
    fn test_false_color_endpoints() {
        let black = Tonemap::FalseColor.apply(RGB::new(0.0, 0.0, 0.0), 2.2);
        // log2(1/32) / 10 + 0.5 = 0
        assert!(approx(black, stop(0)));
        let bright = Tonemap::FalseColor.apply(RGB::new(1e6, 1e6, 1e6), 2.2);
        assert!(approx(bright, stop(4)));
    }

    #[test]
    fn test_false_color_interpolates_between_stops() {
        // mean = 1 - 1/32 gives t = 0.5, exactly the middle stop
        let v = 1.0 - FALSE_COLOR_FLOOR;
        let mid = Tonemap::FalseColor.apply(RGB::new(v, v, v), 2.2);
        assert!(approx(mid, stop(2)));
    }

    #[test]
    fn test_positive_negative() {
        let out = Tonemap::PositiveNegative.apply(RGB::new(-0.3, -0.3, -0.3), 2.2);
        assert!(approx(out, RGB::new(0.6, 0.0, 0.0)));
        let out = Tonemap::PositiveNegative.apply(RGB::new(0.1, 0.2, 0.0), 2.2);
        assert!(approx(out, RGB::new(0.0, 0.2, 0.0)));
    }

    #[test]
    fn test_complex_is_black() {
        let out = Tonemap::Complex.apply(RGB::new(0.3, 0.7, 0.1), 2.2);
        assert_eq!(out, RGB::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_vector_maps_axes() {
        let out = Tonemap::Vector.apply(RGB::new(0.0, 0.0, 2.0), 2.2);
        assert!(approx(out, RGB::new(to_srgb(0.5), to_srgb(0.5), 1.0)));
        let zero = Tonemap::Vector.apply(RGB::new(0.0, 0.0, 0.0), 2.2);
        let grey = to_srgb(0.5);
        assert!(approx(zero, RGB::new(grey, grey, grey)));
    }

    #[test]
    fn test_gamma() {
        let out = Tonemap::Gamma.apply(RGB::new(0.25, 1.0, 0.0), 2.0);
        assert!(approx(out, RGB::new(0.5, 1.0, 0.0)));
    }

    #[test]
    fn test_ramp_segments() {
        assert!(approx(ramp(0.0), RGB::new(0.0, 0.0, 1.0)));
        assert!(approx(ramp(0.25), RGB::new(0.0, 1.0, 1.0)));
        assert!(approx(ramp(0.5), RGB::new(0.0, 1.0, 0.0)));
        assert!(approx(ramp(0.75), RGB::new(1.0, 1.0, 0.0)));
        assert!(approx(ramp(1.0), RGB::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_parse() {
        assert_eq!("fc".parse::<Tonemap>().unwrap(), Tonemap::FalseColor);
        assert_eq!("srgb".parse::<Tonemap>().unwrap(), Tonemap::Srgb);
        assert!("nope".parse::<Tonemap>().is_err());
    }
}
