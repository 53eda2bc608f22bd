//! Channel compositor: merges a primary image with an optional reference.
//!
//! The output is a [`Composite`], one derived channel per channel of the
//! selected group, named by the uppercased channel tail and sized like the
//! primary image. Metric and post-processing are already applied; tonemapping
//! is not.
//!
//! With a reference, images of different sizes are aligned about their
//! centers: the reference is sampled at `pixel + (reference_size - size) / 2`
//! and reads outside it count as `0.0`. Alpha channels are averaged instead of
//! being compared, unless the composite consists of alpha channels only.

use std::time::Instant;

use crate::executor::Executor;
use crate::image::{Channel, Image, Size, tail};
use crate::operators::{Metric, PostProcessing};

/// Name of the alpha channel role.
pub const ALPHA: &str = "A";

/// Request-scoped set of derived channels.
#[derive(Debug, Clone)]
pub struct Composite {
    size: Size,
    channels: Vec<Channel>,
}

impl Composite {
    /// Pixel dimensions (those of the primary image).
    #[must_use]
    pub fn size(&self) -> Size {
        self.size
    }

    /// Derived channels in group order.
    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Number of derived channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the composite has no channels at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Whether every channel is an alpha channel (vacuously true when empty).
    #[must_use]
    pub fn is_only_alpha(&self) -> bool {
        is_only_alpha(&self.channels)
    }

    /// Index of the alpha channel, if it should be treated as a weight.
    ///
    /// Alpha is only special when it is not the sole kind of channel.
    #[must_use]
    pub fn alpha_index(&self) -> Option<usize> {
        if self.is_only_alpha() {
            return None;
        }
        self.channels.iter().position(|c| c.name() == ALPHA)
    }

    /// Every channel's value at `(x, y)`, for pixel readouts.
    #[must_use]
    pub fn values_at(&self, x: i64, y: i64) -> Vec<f32> {
        self.channels.iter().map(|c| c.eval_at(x, y)).collect()
    }

    pub(crate) fn into_channels(self) -> Vec<Channel> {
        self.channels
    }
}

fn is_only_alpha(channels: &[Channel]) -> bool {
    channels.iter().all(|c| c.name() == ALPHA)
}

/// Build the composite of `image` (and `reference`) for `group`.
///
/// Unknown groups produce an empty composite.
pub fn compose(
    executor: &Executor,
    image: &Image,
    reference: Option<&Image>,
    group: &str,
    metric: Metric,
    post_processing: PostProcessing,
) -> Composite {
    let start = Instant::now();
    let size = image.size();
    let sources = image.group_channels(group);

    let mut outputs: Vec<Channel> = sources
        .iter()
        .map(|c| Channel::new(tail(c.name()).to_uppercase(), size))
        .collect();
    let only_alpha = is_only_alpha(&outputs);
    let is_alpha: Vec<bool> = outputs.iter().map(|c| !only_alpha && c.name() == ALPHA).collect();

    // Magnitude couples channels, so run the metric alone first and take
    // lengths across the pixel afterwards.
    let scalar_post = if post_processing.is_per_channel() {
        post_processing
    } else {
        PostProcessing::Identity
    };

    match reference {
        None => {
            executor.batch(|batch| {
                for ((output, &source), &alpha) in outputs.iter_mut().zip(&sources).zip(&is_alpha) {
                    let post = if alpha && !post_processing.is_per_channel() {
                        PostProcessing::Identity
                    } else {
                        scalar_post
                    };
                    batch.parallel_for_mut(output.samples_mut(), move |j, out| {
                        *out = post.apply(source.eval(j));
                    });
                }
            });
        }
        Some(reference) => {
            let offset_x = (reference.size().width as i64 - size.width as i64) / 2;
            let offset_y = (reference.size().height as i64 - size.height as i64) / 2;
            if reference.size() != size {
                tracing::debug!(
                    image = %size,
                    reference = %reference.size(),
                    offset_x,
                    offset_y,
                    "aligning reference about image center"
                );
            }

            let reference_sources = reference.group_channels(group);
            let width = size.width;

            executor.batch(|batch| {
                for (i, ((output, &source), &alpha)) in
                    outputs.iter_mut().zip(&sources).zip(&is_alpha).enumerate()
                {
                    let reference_channel = reference_sources.get(i).copied();
                    batch.parallel_for_mut(output.samples_mut(), move |j, out| {
                        let (x, y) = ((j % width) as i64, (j / width) as i64);
                        let value = source.eval(j);
                        *out = match (alpha, reference_channel) {
                            (true, Some(r)) => 0.5 * (value + r.eval_at(x + offset_x, y + offset_y)),
                            (true, None) => value,
                            (false, Some(r)) => scalar_post
                                .apply(metric.apply(value, r.eval_at(x + offset_x, y + offset_y))),
                            (false, None) => scalar_post.apply(metric.apply(value, 0.0)),
                        };
                    });
                }
            });
        }
    }

    if !post_processing.is_per_channel() {
        apply_magnitude(executor, &mut outputs, &is_alpha, size);
    }

    tracing::debug!(
        channels = outputs.len(),
        group,
        has_reference = reference.is_some(),
        %metric,
        %post_processing,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "composited channels"
    );

    Composite {
        size,
        channels: outputs,
    }
}

/// Replace every non-alpha sample by the Euclidean length across the pixel's
/// non-alpha samples.
fn apply_magnitude(executor: &Executor, outputs: &mut [Channel], is_alpha: &[bool], size: Size) {
    let mut lengths = vec![0.0f32; size.pixel_count()];
    {
        let data: Vec<&Channel> = outputs
            .iter()
            .zip(is_alpha)
            .filter(|(_, alpha)| !**alpha)
            .map(|(c, _)| c)
            .collect();
        executor.parallel_for_mut(&mut lengths, |j, length| {
            *length = data.iter().map(|c| c.eval(j) * c.eval(j)).sum::<f32>().sqrt();
        });
    }

    for (output, _) in outputs.iter_mut().zip(is_alpha).filter(|(_, alpha)| !**alpha) {
        output.samples_mut().copy_from_slice(&lengths);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(size: Size, channels: &[(&str, Vec<f32>)]) -> Image {
        let channels = channels
            .iter()
            .map(|(name, data)| Channel::from_data(*name, size, data.clone()).unwrap())
            .collect();
        Image::new(size, channels).unwrap()
    }

    fn executor() -> Executor {
        Executor::new(3).unwrap()
    }

    #[test]
    fn test_without_reference_applies_post_processing() {
        let img = image(Size::new(2, 1), &[("R", vec![-2.0, 3.0]), ("G", vec![20.0, 0.5])]);
        let composite = compose(&executor(), &img, None, "", Metric::Error, PostProcessing::Clip10);
        assert_eq!(composite.len(), 2);
        assert_eq!(composite.channels()[0].samples(), &[-2.0, 3.0]);
        assert_eq!(composite.channels()[1].samples(), &[10.0, 0.5]);
    }

    #[test]
    fn test_names_are_uppercased_tails() {
        let size = Size::new(1, 1);
        let img = image(size, &[("layer.r", vec![1.0]), ("layer.a", vec![1.0]), ("x", vec![0.0])]);
        let composite = compose(&executor(), &img, None, "layer", Metric::Error, PostProcessing::Identity);
        let names: Vec<&str> = composite.channels().iter().map(Channel::name).collect();
        assert_eq!(names, vec!["R", "A"]);
        assert_eq!(composite.alpha_index(), Some(1));
    }

    #[test]
    fn test_unknown_group_is_empty() {
        let img = image(Size::new(1, 1), &[("R", vec![1.0])]);
        let composite = compose(&executor(), &img, None, "nope", Metric::Error, PostProcessing::Identity);
        assert!(composite.is_empty());
        assert_eq!(composite.alpha_index(), None);
    }

    #[test]
    fn test_self_comparison_is_post_processed_zero() {
        let size = Size::new(3, 2);
        let img = image(
            size,
            &[
                ("R", vec![0.1, 5.0, -3.0, 7.5, 0.0, 1e4]),
                ("G", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
                ("A", vec![0.2, 0.4, 0.6, 0.8, 1.0, 0.0]),
            ],
        );
        for post in [PostProcessing::Identity, PostProcessing::Square, PostProcessing::Clip10] {
            let composite = compose(&executor(), &img, Some(&img), "", Metric::Error, post);
            for channel in &composite.channels()[..2] {
                assert!(channel.samples().iter().all(|&v| v == post.apply(0.0)));
            }
            // alpha is averaged with itself
            assert_eq!(composite.channels()[2].samples(), img.channels()[2].samples());
        }
    }

    #[test]
    fn test_alpha_is_averaged() {
        let size = Size::new(2, 1);
        let a = image(size, &[("R", vec![1.0, 1.0]), ("A", vec![1.0, 0.0])]);
        let b = image(size, &[("R", vec![0.5, 0.5]), ("A", vec![0.0, 0.5])]);
        let composite = compose(&executor(), &a, Some(&b), "", Metric::SquaredError, PostProcessing::Identity);
        assert_eq!(composite.channels()[0].samples(), &[0.25, 0.25]);
        assert_eq!(composite.channels()[1].samples(), &[0.5, 0.25]);
    }

    #[test]
    fn test_only_alpha_goes_through_metric() {
        let size = Size::new(1, 1);
        let a = image(size, &[("A", vec![0.75])]);
        let b = image(size, &[("A", vec![0.25])]);
        let composite = compose(&executor(), &a, Some(&b), "", Metric::Error, PostProcessing::Identity);
        assert_eq!(composite.channels()[0].samples(), &[0.5]);
    }

    #[test]
    fn test_missing_reference_channel_reads_zero() {
        let size = Size::new(2, 1);
        let a = image(size, &[("R", vec![1.0, 2.0]), ("G", vec![3.0, 4.0])]);
        let b = image(size, &[("R", vec![1.0, 1.0])]);
        let composite = compose(&executor(), &a, Some(&b), "", Metric::Error, PostProcessing::Identity);
        assert_eq!(composite.channels()[0].samples(), &[0.0, 1.0]);
        assert_eq!(composite.channels()[1].samples(), &[3.0, 4.0]);
    }

    #[test]
    fn test_larger_reference_is_sampled_at_positive_offset() {
        // offset = (4 - 2) / 2 = 1
        let primary = image(Size::new(2, 2), &[("R", vec![0.0; 4])]);
        let reference_data: Vec<f32> = (0..16).map(|i| i as f32).collect();
        let reference = image(Size::new(4, 4), &[("R", reference_data)]);
        let composite = compose(&executor(), &primary, Some(&reference), "", Metric::Error, PostProcessing::Identity);
        // primary (x, y) meets reference (x + 1, y + 1)
        assert_eq!(composite.channels()[0].samples(), &[-5.0, -6.0, -9.0, -10.0]);
    }

    #[test]
    fn test_smaller_reference_is_centered() {
        // offset = (2 - 4) / 2 = -1
        let primary = image(Size::new(4, 4), &[("R", vec![1.0; 16])]);
        let reference = image(Size::new(2, 2), &[("R", vec![1.0, 2.0, 3.0, 4.0])]);
        let composite = compose(&executor(), &primary, Some(&reference), "", Metric::Error, PostProcessing::Identity);
        let out = &composite.channels()[0];
        assert_eq!(out.eval_at(1, 1), 0.0);
        assert_eq!(out.eval_at(2, 1), -1.0);
        assert_eq!(out.eval_at(1, 2), -2.0);
        assert_eq!(out.eval_at(2, 2), -3.0);
        // outside the reference the primary is compared against zero
        assert_eq!(out.eval_at(0, 0), 1.0);
        assert_eq!(out.eval_at(3, 3), 1.0);
    }

    #[test]
    fn test_magnitude_spans_non_alpha_channels() {
        let size = Size::new(1, 1);
        let img = image(size, &[("R", vec![3.0]), ("G", vec![-4.0]), ("A", vec![0.5])]);
        let composite = compose(&executor(), &img, None, "", Metric::Error, PostProcessing::Magnitude);
        assert_eq!(composite.values_at(0, 0), vec![5.0, 5.0, 0.5]);

        let zero = image(size, &[("R", vec![0.0]), ("G", vec![0.0]), ("A", vec![0.5])]);
        let composite = compose(&executor(), &img, Some(&zero), "", Metric::Error, PostProcessing::Magnitude);
        assert_eq!(composite.values_at(0, 0), vec![5.0, 5.0, 0.5]);
    }
}
