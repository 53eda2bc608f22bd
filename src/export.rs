//! Flat pixel export of a composite and the file encoders that consume it.
//!
//! Export always covers the full image, never a crop. The first four
//! composite channels become the RGBA components in composite order; a
//! missing fourth channel is padded with an alpha of `1.0`, and missing
//! color channels read as `0.0`.
//!
//! HDR export hands out the raw float values. LDR export additionally
//! applies exposure and offset, tonemaps the color components and quantizes
//! everything to 8 bits.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::ImageEncoder;
use imgref::ImgVec;
use rgb::{RGB, RGBA, RGBA8};
use serde::{Deserialize, Serialize};

use crate::composite::Composite;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::operators::{Tonemap, apply_exposure_and_offset};

/// Display transform applied by LDR export.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Exposure in stops; values are scaled by `2^exposure`.
    pub exposure: f32,
    /// Added after exposure scaling.
    pub offset: f32,
    /// Exponent denominator of [`Tonemap::Gamma`].
    pub gamma: f32,
    /// Color encoding.
    pub tonemap: Tonemap,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            exposure: 0.0,
            offset: 0.0,
            gamma: 2.2,
            tonemap: Tonemap::Srgb,
        }
    }
}

/// Interleaved float RGBA pixels of `composite`.
///
/// With `divide_alpha`, color is converted from premultiplied to straight
/// alpha; color becomes `0.0` where alpha is exactly zero. Returns `None`
/// when the composite has no channels.
#[must_use]
pub fn hdr_pixels(
    executor: &Executor,
    composite: &Composite,
    divide_alpha: bool,
) -> Option<ImgVec<RGBA<f32>>> {
    if composite.is_empty() {
        return None;
    }

    let size = composite.size();
    let sources = &composite.channels()[..composite.len().min(4)];
    let mut pixels = vec![RGBA::new(0.0, 0.0, 0.0, 1.0); size.pixel_count()];

    executor.parallel_for_mut(&mut pixels, |j, pixel| {
        let mut components = [pixel.r, pixel.g, pixel.b, pixel.a];
        for (component, channel) in components.iter_mut().zip(sources) {
            *component = channel.eval(j);
        }
        let [mut r, mut g, mut b, a] = components;
        if divide_alpha {
            for c in [&mut r, &mut g, &mut b] {
                *c = if a == 0.0 { 0.0 } else { *c / a };
            }
        }
        *pixel = RGBA::new(r, g, b, a);
    });

    Some(ImgVec::new(pixels, size.width, size.height))
}

/// Display-encoded 8-bit RGBA pixels of `composite`.
#[must_use]
pub fn ldr_pixels(
    executor: &Executor,
    composite: &Composite,
    divide_alpha: bool,
    display: &DisplaySettings,
) -> Option<ImgVec<RGBA8>> {
    let hdr = hdr_pixels(executor, composite, divide_alpha)?;
    let (width, height) = (hdr.width(), hdr.height());
    let source = hdr.into_buf();

    let mut pixels = vec![RGBA8::default(); source.len()];
    executor.parallel_for_mut(&mut pixels, |j, pixel| {
        *pixel = encode_ldr(source[j], display);
    });

    Some(ImgVec::new(pixels, width, height))
}

fn encode_ldr(value: RGBA<f32>, display: &DisplaySettings) -> RGBA8 {
    let expose = |v: f32| apply_exposure_and_offset(v, display.exposure, display.offset);
    let color = display
        .tonemap
        .apply(RGB::new(expose(value.r), expose(value.g), expose(value.b)), display.gamma);
    RGBA8::new(
        quantize(color.r),
        quantize(color.g),
        quantize(color.b),
        quantize(value.a),
    )
}

#[inline]
fn quantize(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

/// Whether an encoder stores float or 8-bit data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DynamicRange {
    /// Float samples, exported without any display transform.
    Hdr,
    /// Tonemapped 8-bit samples.
    Ldr,
}

/// Pixels ready for an [`Exporter`].
#[derive(Debug, Clone)]
pub enum ExportPixels {
    /// Output of [`hdr_pixels`].
    Hdr(ImgVec<RGBA<f32>>),
    /// Output of [`ldr_pixels`].
    Ldr(ImgVec<RGBA8>),
}

impl ExportPixels {
    /// Dynamic range of the contained pixels.
    #[must_use]
    pub fn dynamic_range(&self) -> DynamicRange {
        match self {
            Self::Hdr(_) => DynamicRange::Hdr,
            Self::Ldr(_) => DynamicRange::Ldr,
        }
    }
}

/// Closed set of file encoders, selected by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exporter {
    /// Portable float map (little-endian, RGB).
    Pfm,
    /// 8-bit RGBA PNG.
    Png,
}

impl Exporter {
    /// Every exporter, in selection order.
    pub const ALL: [Self; 2] = [Self::Pfm, Self::Png];

    /// File extension handled by this exporter.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pfm => "pfm",
            Self::Png => "png",
        }
    }

    /// Whether this exporter can write `path` (case-insensitive extension).
    #[must_use]
    pub fn can_handle(self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(self.extension()))
    }

    /// First exporter able to write `path`.
    pub fn for_path(path: &Path) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|exporter| exporter.can_handle(path))
            .ok_or_else(|| {
                Error::UnsupportedFormat(
                    path.extension()
                        .map_or_else(|| path.display().to_string(), |e| e.to_string_lossy().into_owned()),
                )
            })
    }

    /// Which pixels this exporter consumes.
    #[must_use]
    pub fn dynamic_range(self) -> DynamicRange {
        match self {
            Self::Pfm => DynamicRange::Hdr,
            Self::Png => DynamicRange::Ldr,
        }
    }

    /// Whether the format stores premultiplied alpha. Pixels for formats
    /// that do not should be exported with alpha divided out.
    #[must_use]
    pub fn has_premultiplied_alpha(self) -> bool {
        match self {
            Self::Pfm | Self::Png => false,
        }
    }

    /// Encode `pixels` into `writer`.
    pub fn encode<W: Write>(self, pixels: &ExportPixels, writer: W) -> Result<()> {
        match (self, pixels) {
            (Self::Pfm, ExportPixels::Hdr(img)) => write_pfm(img, writer),
            (Self::Png, ExportPixels::Ldr(img)) => write_png(img, writer),
            _ => Err(Error::Encode(format!(
                "{} expects {:?} pixels, got {:?}",
                self.extension(),
                self.dynamic_range(),
                pixels.dynamic_range()
            ))),
        }
    }

    /// Encode `pixels` into a new file at `path`.
    pub fn save(self, pixels: &ExportPixels, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.encode(pixels, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

fn write_pfm<W: Write>(img: &ImgVec<RGBA<f32>>, mut writer: W) -> Result<()> {
    // negative scale marks little-endian data
    write!(writer, "PF\n{} {}\n-1.0\n", img.width(), img.height())?;

    let mut row_bytes = Vec::with_capacity(img.width() * 12);
    for y in (0..img.height()).rev() {
        let row = &img.buf()[y * img.stride()..][..img.width()];
        row_bytes.clear();
        for p in row {
            for v in [p.r, p.g, p.b] {
                row_bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        writer.write_all(&row_bytes)?;
    }
    Ok(())
}

fn write_png<W: Write>(img: &ImgVec<RGBA8>, writer: W) -> Result<()> {
    let width = u32::try_from(img.width()).map_err(|e| Error::Encode(e.to_string()))?;
    let height = u32::try_from(img.height()).map_err(|e| Error::Encode(e.to_string()))?;
    let bytes: Vec<u8> = img.pixels().flat_map(|p| [p.r, p.g, p.b, p.a]).collect();

    image::codecs::png::PngEncoder::new(writer)
        .write_image(&bytes, width, height, image::ExtendedColorType::Rgba8)
        .map_err(|e| Error::Encode(e.to_string()))
}
