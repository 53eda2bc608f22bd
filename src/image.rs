//! Read-only image model: channels, channel groups and images.
//!
//! An [`Image`] is an immutable set of equally sized float [`Channel`]s. Channel
//! names may carry a layer prefix separated by `.` (`"diffuse.R"`); the part
//! after the last separator is the channel's *tail* and identifies its role
//! (`R`, `G`, `B`, `A`, ...). Channels sharing a prefix form a channel group.
//!
//! Every image receives a process-unique [`ImageId`] on construction. The id is
//! part of every statistics fingerprint, so results computed for an image are
//! never reused for a reloaded version of the same file.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Separator between a channel's layer prefix and its tail.
pub const LAYER_SEPARATOR: char = '.';

/// Opaque, process-unique image identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageId(u64);

impl ImageId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value of the id.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pixel dimensions of an image or channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
}

impl Size {
    /// Create a new size.
    #[must_use]
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Number of pixels covered by this size.
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.width * self.height
    }

    /// Whether `(x, y)` lies inside the pixel grid.
    #[must_use]
    pub fn contains(self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Tail of a channel name: everything after the last layer separator.
///
/// ```
/// use hdr_inspect::image::tail;
///
/// assert_eq!(tail("diffuse.R"), "R");
/// assert_eq!(tail("G"), "G");
/// ```
#[must_use]
pub fn tail(name: &str) -> &str {
    name.rsplit_once(LAYER_SEPARATOR).map_or(name, |(_, tail)| tail)
}

/// Layer prefix of a channel name, `""` for channels of the root layer.
#[must_use]
pub fn head(name: &str) -> &str {
    name.rsplit_once(LAYER_SEPARATOR).map_or("", |(head, _)| head)
}

/// A named 2-D grid of float samples, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    name: String,
    size: Size,
    data: Vec<f32>,
}

impl Channel {
    /// Create a zero-filled channel.
    #[must_use]
    pub fn new(name: impl Into<String>, size: Size) -> Self {
        Self {
            name: name.into(),
            size,
            data: vec![0.0; size.pixel_count()],
        }
    }

    /// Create a channel from row-major samples.
    pub fn from_data(name: impl Into<String>, size: Size, data: Vec<f32>) -> Result<Self> {
        let name = name.into();
        if data.len() != size.pixel_count() {
            return Err(Error::ChannelLength {
                channel: name,
                expected: size.pixel_count(),
                actual: data.len(),
            });
        }
        Ok(Self { name, size, data })
    }

    /// Full channel name, including any layer prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Channel role without the layer prefix.
    #[must_use]
    pub fn tail(&self) -> &str {
        tail(&self.name)
    }

    /// Pixel dimensions.
    #[must_use]
    pub fn size(&self) -> Size {
        self.size
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the channel holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sample at a flat row-major index.
    #[inline]
    #[must_use]
    pub fn eval(&self, index: usize) -> f32 {
        self.data[index]
    }

    /// Sample at `(x, y)`; coordinates outside the grid read as `0.0`.
    #[inline]
    #[must_use]
    pub fn eval_at(&self, x: i64, y: i64) -> f32 {
        if self.size.contains(x, y) {
            self.data[y as usize * self.size.width + x as usize]
        } else {
            0.0
        }
    }

    /// All samples, row-major.
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    pub(crate) fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

/// An immutable, uniquely identified collection of equally sized channels.
#[derive(Debug)]
pub struct Image {
    id: ImageId,
    size: Size,
    channels: Vec<Channel>,
}

impl Image {
    /// Build an image from its channels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidImage`] for zero-pixel images, images without
    /// channels or duplicate channel names, and [`Error::ChannelLength`] when
    /// a channel's dimensions differ from `size`.
    pub fn new(size: Size, channels: Vec<Channel>) -> Result<Self> {
        if size.pixel_count() == 0 {
            return Err(Error::InvalidImage(format!("image has zero pixels ({size})")));
        }
        if channels.is_empty() {
            return Err(Error::InvalidImage("image has no channels".to_string()));
        }
        for (i, channel) in channels.iter().enumerate() {
            if channel.size != size {
                return Err(Error::ChannelLength {
                    channel: channel.name.clone(),
                    expected: size.pixel_count(),
                    actual: channel.len(),
                });
            }
            if channels[..i].iter().any(|c| c.name == channel.name) {
                return Err(Error::InvalidImage(format!(
                    "duplicate channel name {:?}",
                    channel.name
                )));
            }
        }

        Ok(Self {
            id: ImageId::next(),
            size,
            channels,
        })
    }

    /// Identity of this image instance.
    #[must_use]
    pub fn id(&self) -> ImageId {
        self.id
    }

    /// Pixel dimensions.
    #[must_use]
    pub fn size(&self) -> Size {
        self.size
    }

    /// All channels in load order.
    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Look up a channel by its full name.
    #[must_use]
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// Names of all channel groups, in first-seen order.
    #[must_use]
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for channel in &self.channels {
            let group = head(&channel.name);
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
        groups
    }

    /// Whether `group` names one of this image's channel groups.
    #[must_use]
    pub fn has_group(&self, group: &str) -> bool {
        self.channels.iter().any(|c| head(&c.name) == group)
    }

    /// Names of the channels in `group`, de-duplicated in first-seen order.
    ///
    /// Unknown groups resolve to an empty list.
    #[must_use]
    pub fn channels_in_group(&self, group: &str) -> Vec<&str> {
        self.group_channels(group).into_iter().map(Channel::name).collect()
    }

    /// The channels of `group`, de-duplicated by name in first-seen order.
    #[must_use]
    pub fn group_channels(&self, group: &str) -> Vec<&Channel> {
        let mut selected: Vec<&Channel> = Vec::new();
        for channel in &self.channels {
            if head(&channel.name) == group && !selected.iter().any(|c| c.name == channel.name) {
                selected.push(channel);
            }
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layered_image() -> Image {
        let size = Size::new(2, 2);
        Image::new(
            size,
            vec![
                Channel::new("R", size),
                Channel::new("G", size),
                Channel::new("normals.X", size),
                Channel::new("B", size),
                Channel::new("normals.Y", size),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_tail_and_head() {
        assert_eq!(tail("layer.sub.A"), "A");
        assert_eq!(head("layer.sub.A"), "layer.sub");
        assert_eq!(tail("R"), "R");
        assert_eq!(head("R"), "");
    }

    #[test]
    fn test_channel_from_data_length_mismatch() {
        let err = Channel::from_data("R", Size::new(2, 2), vec![0.0; 3]).unwrap_err();
        assert!(matches!(err, Error::ChannelLength { expected: 4, actual: 3, .. }));
    }

    #[test]
    fn test_eval_at_outside_reads_zero() {
        let channel = Channel::from_data("R", Size::new(2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(channel.eval_at(1, 1), 4.0);
        assert_eq!(channel.eval_at(0, 1), 3.0);
        assert_eq!(channel.eval_at(-1, 0), 0.0);
        assert_eq!(channel.eval_at(2, 0), 0.0);
        assert_eq!(channel.eval_at(0, 5), 0.0);
    }

    #[test]
    fn test_groups_in_first_seen_order() {
        let image = layered_image();
        assert_eq!(image.groups(), vec!["", "normals"]);
        assert_eq!(image.channels_in_group(""), vec!["R", "G", "B"]);
        assert_eq!(image.channels_in_group("normals"), vec!["normals.X", "normals.Y"]);
        assert!(image.channels_in_group("missing").is_empty());
        assert!(!image.has_group("missing"));
    }

    #[test]
    fn test_image_rejects_degenerate_input() {
        assert!(Image::new(Size::new(0, 3), vec![Channel::new("R", Size::new(0, 3))]).is_err());
        assert!(Image::new(Size::new(1, 1), Vec::new()).is_err());

        let size = Size::new(1, 1);
        let duplicate = Image::new(size, vec![Channel::new("R", size), Channel::new("R", size)]);
        assert!(matches!(duplicate, Err(Error::InvalidImage(_))));

        let mismatched = Image::new(size, vec![Channel::new("R", Size::new(2, 1))]);
        assert!(matches!(mismatched, Err(Error::ChannelLength { .. })));
    }

    #[test]
    fn test_image_ids_are_unique() {
        let a = layered_image();
        let b = layered_image();
        assert_ne!(a.id(), b.id());
    }
}
