//! Region statistics over a composite.
//!
//! ## Pipeline
//!
//! 1. The alpha channel (if alpha is not the only kind of channel) is moved
//!    to the end and used as a per-pixel weight instead of as data.
//! 2. The crop rectangle is resolved (normalized and clamped).
//! 3. One pass over the rectangle yields mean, minimum and maximum. NaN
//!    samples are skipped entirely.
//! 4. A [`NUM_BINS`]-bin symmetric-log histogram is built in two phases:
//!    every sample's bin index is computed in parallel, and only after that
//!    phase has fully joined are the alpha weights accumulated per channel.
//! 5. Counts become densities (divided by bin width) and are normalized by
//!    the 10th-largest entry.

pub mod histogram;

use std::io::Write;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::composite::Composite;
use crate::crop::{CropRegion, PixelRect, resolve_crop};
use crate::error::Result;
use crate::executor::Executor;
use crate::image::Channel;

pub use histogram::{Histogram, HistogramDomain, NUM_BINS, symmetric_log, symmetric_log_inverse};

/// Marker for samples that do not contribute to the histogram.
const NO_BIN: u16 = u16::MAX;

/// Statistics of a composite over a pixel rectangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Mean over all valid samples of all data channels; 0 without samples.
    #[serde(with = "non_finite_f32")]
    pub mean: f32,
    /// Smallest valid sample (`+inf` without samples).
    #[serde(with = "non_finite_f32")]
    pub minimum: f32,
    /// Largest valid sample (`-inf` without samples).
    #[serde(with = "non_finite_f32")]
    pub maximum: f32,
    /// Normalized density histogram, one column per data channel.
    pub histogram: Histogram,
    /// Bin containing zero, for drawing a reference line.
    pub histogram_zero_bin: usize,
    /// Names of the data channels, in histogram column order.
    pub channels: Vec<String>,
    /// Number of valid (non-NaN) samples that went into the mean.
    pub sample_count: usize,
    /// The rectangle the statistics cover.
    pub region: PixelRect,
}

impl Statistics {
    /// Write the histogram as CSV: one row per bin, holding the bin's lower
    /// value bound and one density column per data channel.
    pub fn write_histogram_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header = vec!["bin".to_string(), "lower".to_string()];
        header.extend(self.channels.iter().cloned());
        wtr.write_record(&header)?;

        let domain = HistogramDomain::new(self.minimum, self.maximum);
        for bin in 0..self.histogram.bins() {
            let mut record = vec![bin.to_string(), format!("{:.6e}", domain.bin_to_value(bin as f32))];
            record.extend(self.histogram.row(bin).iter().map(|v| format!("{:.6}", v)));
            wtr.write_record(&record)?;
        }

        wtr.flush()?;
        Ok(())
    }
}

/// Floats that survive JSON: non-finite values are written as the strings
/// `"inf"`, `"-inf"` and `"NaN"`.
mod non_finite_f32 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f32),
        Text(String),
    }

    pub fn serialize<S>(value: &f32, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if value.is_finite() {
            value.serialize(serializer)
        } else {
            value.to_string().serialize(serializer)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f32, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => text
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("invalid float {text:?}"))),
        }
    }
}

/// Running sum, count and range of one channel.
#[derive(Debug, Clone, Copy)]
struct Accumulator {
    sum: f64,
    count: usize,
    minimum: f32,
    maximum: f32,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            sum: 0.0,
            count: 0,
            minimum: f32::INFINITY,
            maximum: f32::NEG_INFINITY,
        }
    }
}

impl Accumulator {
    fn add(&mut self, value: f32) {
        if value.is_nan() {
            return;
        }
        self.sum += f64::from(value);
        self.count += 1;
        self.minimum = self.minimum.min(value);
        self.maximum = self.maximum.max(value);
    }

    fn merge(self, other: Self) -> Self {
        Self {
            sum: self.sum + other.sum,
            count: self.count + other.count,
            minimum: self.minimum.min(other.minimum),
            maximum: self.maximum.max(other.maximum),
        }
    }
}

/// Compute statistics of `composite` over `crop` (whole image when `None`).
pub fn compute_statistics(
    executor: &Executor,
    composite: Composite,
    crop: Option<CropRegion>,
) -> Statistics {
    let start = Instant::now();
    let size = composite.size();
    let alpha_index = composite.alpha_index();

    let mut channels = composite.into_channels();
    if let Some(index) = alpha_index {
        let last = channels.len() - 1;
        channels.swap(index, last);
    }
    let data_count = if alpha_index.is_some() { channels.len() - 1 } else { channels.len() };
    let (data, rest) = channels.split_at(data_count);
    let alpha = rest.first();

    let region = resolve_crop(crop, size);
    let stride = size.width;

    let mut partials = vec![Accumulator::default(); data.len()];
    executor.parallel_for_mut(&mut partials, |c, acc| {
        for index in region.indices(stride) {
            acc.add(data[c].eval(index));
        }
    });
    let total = partials.into_iter().fold(Accumulator::default(), Accumulator::merge);

    let mean = if total.count > 0 { (total.sum / total.count as f64) as f32 } else { 0.0 };
    let domain = HistogramDomain::new(total.minimum, total.maximum);

    let histogram = if data.is_empty() {
        Histogram::empty()
    } else {
        let counts = bin_counts(executor, data, alpha, region, stride, &domain);
        let mut histogram = Histogram::from_columns(&counts);
        histogram.convert_to_density(&domain);
        histogram.normalize();
        histogram
    };

    tracing::debug!(
        channels = data.len(),
        weighted = alpha.is_some(),
        samples = total.count,
        region = ?region,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "computed statistics"
    );

    Statistics {
        mean,
        minimum: total.minimum,
        maximum: total.maximum,
        histogram,
        histogram_zero_bin: domain.zero_bin(),
        channels: data.iter().map(|c| c.name().to_string()).collect(),
        sample_count: total.count,
        region,
    }
}

/// Raw, alpha-weighted bin counts: one `NUM_BINS` column per data channel.
fn bin_counts(
    executor: &Executor,
    data: &[Channel],
    alpha: Option<&Channel>,
    region: PixelRect,
    stride: usize,
    domain: &HistogramDomain,
) -> Vec<Vec<f32>> {
    let mut indices = vec![vec![NO_BIN; region.pixel_count()]; data.len()];

    // Phase 1: every bin index, joined before anything reads them.
    executor.batch(|batch| {
        for (column, channel) in indices.iter_mut().zip(data) {
            batch.parallel_for_mut(column, move |n, bin| {
                let value = channel.eval(region.nth_index(n, stride));
                if !value.is_nan() {
                    *bin = domain.bin(value) as u16;
                }
            });
        }
    });

    // Phase 2: per-channel weighted accumulation.
    let mut counts = vec![vec![0.0f32; NUM_BINS]; data.len()];
    executor.parallel_for_mut(&mut counts, |c, column| {
        for (n, &bin) in indices[c].iter().enumerate() {
            if bin != NO_BIN {
                column[usize::from(bin)] +=
                    alpha.map_or(1.0, |a| a.eval(region.nth_index(n, stride)));
            }
        }
    });
    counts
}
