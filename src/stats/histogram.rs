//! Symmetric-log histogram domain and the histogram matrix.
//!
//! Bins are laid out uniformly in symmetric-log space,
//! `slog(x) = sign(x) * (ln(|x| + eps) - ln(eps))`, so values spanning many
//! orders of magnitude on both sides of zero share one readable axis.

use serde::{Deserialize, Serialize};

/// Fixed number of histogram bins.
pub const NUM_BINS: usize = 400;

/// Offset keeping the logarithm finite around zero.
pub const SYMLOG_EPSILON: f32 = 0.001;

/// Rank (from the top) of the value the histogram is normalized by.
const NORMALIZATION_RANK: usize = 10;

/// Floor for the normalization reference value.
const NORMALIZATION_FLOOR: f32 = 0.1;

/// Headroom factor above the normalization reference.
const NORMALIZATION_HEADROOM: f32 = 1.3;

/// Sign-preserving logarithm.
#[inline]
#[must_use]
pub fn symmetric_log(value: f32) -> f32 {
    let smallest = SYMLOG_EPSILON.ln();
    if value > 0.0 {
        (value + SYMLOG_EPSILON).ln() - smallest
    } else {
        -((-value + SYMLOG_EPSILON).ln() - smallest)
    }
}

/// Inverse of [`symmetric_log`].
#[inline]
#[must_use]
pub fn symmetric_log_inverse(value: f32) -> f32 {
    let smallest = SYMLOG_EPSILON.ln();
    if value > 0.0 {
        (value + smallest).exp() - SYMLOG_EPSILON
    } else {
        -((-value + smallest).exp() - SYMLOG_EPSILON)
    }
}

/// Mapping between sample values and bin indices for a `[minimum, maximum]`
/// value range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramDomain {
    min_log: f32,
    width: f32,
}

impl HistogramDomain {
    /// Domain spanning `[minimum, maximum]`.
    #[must_use]
    pub fn new(minimum: f32, maximum: f32) -> Self {
        let min_log = symmetric_log(minimum);
        Self {
            min_log,
            width: symmetric_log(maximum) - min_log,
        }
    }

    /// Bin of `value`, clamped into `[0, NUM_BINS)`.
    ///
    /// Degenerate domains (zero or non-finite width) put everything in bin 0.
    #[inline]
    #[must_use]
    pub fn bin(&self, value: f32) -> usize {
        let scaled = (NUM_BINS as f32 * (symmetric_log(value) - self.min_log) / self.width).floor();
        if scaled.is_nan() {
            0
        } else {
            (scaled.max(0.0) as usize).min(NUM_BINS - 1)
        }
    }

    /// Value at the lower edge of (fractional) bin `bin`.
    #[inline]
    #[must_use]
    pub fn bin_to_value(&self, bin: f32) -> f32 {
        symmetric_log_inverse(self.width * bin / NUM_BINS as f32 + self.min_log)
    }

    /// Width of bin `bin` in value space.
    #[must_use]
    pub fn bin_width(&self, bin: usize) -> f32 {
        self.bin_to_value((bin + 1) as f32) - self.bin_to_value(bin as f32)
    }

    /// Bin containing zero, even if zero lies outside the domain.
    #[must_use]
    pub fn zero_bin(&self) -> usize {
        self.bin(0.0)
    }
}

/// `NUM_BINS` rows by one column per data channel, stored row-major.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Histogram {
    channels: usize,
    values: Vec<f32>,
}

impl Histogram {
    /// Histogram with no channels.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Assemble from per-channel columns of `NUM_BINS` entries each.
    pub(crate) fn from_columns(columns: &[Vec<f32>]) -> Self {
        let channels = columns.len();
        let mut values = vec![0.0; NUM_BINS * channels];
        for (c, column) in columns.iter().enumerate() {
            debug_assert_eq!(column.len(), NUM_BINS);
            for (bin, &v) in column.iter().enumerate() {
                values[bin * channels + c] = v;
            }
        }
        Self { channels, values }
    }

    /// Number of rows: `NUM_BINS`, or 0 for an empty histogram.
    #[must_use]
    pub fn bins(&self) -> usize {
        if self.channels == 0 { 0 } else { NUM_BINS }
    }

    /// Number of columns (data channels).
    #[must_use]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Whether the histogram has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `(bin, channel)`.
    #[must_use]
    pub fn get(&self, bin: usize, channel: usize) -> f32 {
        self.values[bin * self.channels + channel]
    }

    /// All channels' values for one bin.
    #[must_use]
    pub fn row(&self, bin: usize) -> &[f32] {
        &self.values[bin * self.channels..(bin + 1) * self.channels]
    }

    /// One channel's values across all bins.
    pub fn column(&self, channel: usize) -> impl Iterator<Item = f32> + '_ {
        self.values.iter().skip(channel).step_by(self.channels.max(1)).copied()
    }

    /// Raw row-major storage.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Turn counts into densities by dividing each row by its bin width.
    ///
    /// Rows of zero-width bins (degenerate domains) keep their counts.
    pub(crate) fn convert_to_density(&mut self, domain: &HistogramDomain) {
        if self.channels == 0 {
            return;
        }
        for (bin, row) in self.values.chunks_mut(self.channels).enumerate() {
            let width = domain.bin_width(bin);
            if width > 0.0 {
                row.iter_mut().for_each(|v| *v /= width);
            }
        }
    }

    /// Divide everything by `max(10th-largest entry, 0.1) * 1.3`, so a few
    /// spikes cannot flatten the rest of the plot.
    pub(crate) fn normalize(&mut self) {
        if self.values.is_empty() {
            return;
        }
        let mut sorted = self.values.clone();
        let index = sorted.len().saturating_sub(NORMALIZATION_RANK);
        let reference = *sorted.select_nth_unstable_by(index, f32::total_cmp).1;
        let divisor = reference.max(NORMALIZATION_FLOOR) * NORMALIZATION_HEADROOM;
        self.values.iter_mut().for_each(|v| *v /= divisor);
    }
}
