//! Crop regions and their resolution to pixel rectangles.
//!
//! A [`CropRegion`] is whatever two corners the presentation layer handed us.
//! Corners may be reversed or lie outside the image; [`CropRegion::resolve`]
//! swaps them per axis and clamps them into `[0, size]`, so resolution never
//! fails.

use serde::{Deserialize, Serialize};

use crate::image::Size;

/// Two corner points in image-pixel coordinates, possibly unnormalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropRegion {
    /// First corner `(x, y)`.
    pub min: (i64, i64),
    /// Second corner `(x, y)`, exclusive once normalized.
    pub max: (i64, i64),
}

impl CropRegion {
    /// Create a crop region from two corners.
    #[must_use]
    pub const fn new(min: (i64, i64), max: (i64, i64)) -> Self {
        Self { min, max }
    }

    /// Normalize (componentwise min <= max) and clamp into `[0, size]`.
    #[must_use]
    pub fn resolve(self, size: Size) -> PixelRect {
        let clamp_x = |v: i64| v.clamp(0, size.width as i64) as usize;
        let clamp_y = |v: i64| v.clamp(0, size.height as i64) as usize;

        let (x0, x1) = ordered(self.min.0, self.max.0);
        let (y0, y1) = ordered(self.min.1, self.max.1);

        PixelRect {
            x0: clamp_x(x0),
            y0: clamp_y(y0),
            x1: clamp_x(x1),
            y1: clamp_y(y1),
        }
    }
}

fn ordered(a: i64, b: i64) -> (i64, i64) {
    if a > b { (b, a) } else { (a, b) }
}

/// Resolve an optional crop; no crop covers the whole image.
#[must_use]
pub fn resolve_crop(crop: Option<CropRegion>, size: Size) -> PixelRect {
    crop.map_or_else(|| PixelRect::full(size), |crop| crop.resolve(size))
}

/// A normalized, clamped, half-open pixel rectangle `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    /// Left edge (inclusive).
    pub x0: usize,
    /// Top edge (inclusive).
    pub y0: usize,
    /// Right edge (exclusive).
    pub x1: usize,
    /// Bottom edge (exclusive).
    pub y1: usize,
}

impl PixelRect {
    /// Rectangle covering an entire image.
    #[must_use]
    pub const fn full(size: Size) -> Self {
        Self {
            x0: 0,
            y0: 0,
            x1: size.width,
            y1: size.height,
        }
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.x1 - self.x0
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.y1 - self.y0
    }

    /// Number of pixels inside the rectangle.
    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        self.width() * self.height()
    }

    /// Whether the rectangle covers no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pixel_count() == 0
    }

    /// Flat row-major indices of every pixel inside the rectangle, for an
    /// image `stride` pixels wide.
    pub fn indices(&self, stride: usize) -> impl Iterator<Item = usize> + '_ {
        (self.y0..self.y1).flat_map(move |y| (self.x0..self.x1).map(move |x| y * stride + x))
    }

    /// Flat index of the `n`-th pixel of the rectangle in row-major order.
    #[inline]
    #[must_use]
    pub fn nth_index(&self, n: usize, stride: usize) -> usize {
        let width = self.width();
        (self.y0 + n / width) * stride + self.x0 + n % width
    }
}
