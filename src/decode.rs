//! Portable float map (PFM) decoding.
//!
//! PFM is the one HDR format read natively: a short text header
//! (`PF` for RGB or `Pf` for grayscale, dimensions, scale) followed by
//! raw 32-bit floats stored bottom row first. The sign of the scale gives
//! the byte order (negative: little-endian) and its magnitude multiplies
//! every sample.
//!
//! # Example
//!
//! ```no_run
//! use hdr_inspect::decode;
//!
//! let image = decode::open("render.pfm")?;
//! println!("{} with {} channels", image.size(), image.channels().len());
//! # Ok::<(), hdr_inspect::Error>(())
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{Error, Result};
use crate::image::{Channel, Image, Size};

/// Largest accepted width or height.
pub const MAX_DIMENSION: usize = 1 << 16;

/// Load a PFM image from `path`.
pub fn open(path: impl AsRef<Path>) -> Result<Image> {
    let path = path.as_ref();
    let load_error = |reason: String| Error::ImageLoad {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| load_error(e.to_string()))?;
    let image = load_pfm(file).map_err(|e| match e {
        Error::InvalidImage(reason) => load_error(reason),
        other => other,
    })?;

    tracing::debug!(path = %path.display(), size = %image.size(), "loaded PFM image");
    Ok(image)
}

/// Decode a PFM image from `reader`.
///
/// # Errors
///
/// Returns [`Error::InvalidImage`] for a bad magic string, a zero or
/// non-finite scale, zero-pixel dimensions, dimensions above
/// [`MAX_DIMENSION`] and truncated pixel data.
pub fn load_pfm<R: Read>(reader: R) -> Result<Image> {
    let mut reader = BufReader::new(reader);

    let magic = read_token(&mut reader)?;
    let channel_names: &[&str] = match magic.as_str() {
        "PF" => &["R", "G", "B"],
        "Pf" => &["L"],
        other => return Err(Error::InvalidImage(format!("invalid PFM magic {other:?}"))),
    };
    let width = parse_header::<usize>(&mut reader, "width")?;
    let height = parse_header::<usize>(&mut reader, "height")?;
    let scale = parse_header::<f32>(&mut reader, "scale")?;

    if !scale.is_finite() || scale == 0.0 {
        return Err(Error::InvalidImage(format!("invalid PFM scale {scale}")));
    }
    let little_endian = scale < 0.0;
    let scale = scale.abs();

    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(Error::InvalidImage(format!(
            "PFM dimensions {width}x{height} exceed the {MAX_DIMENSION} pixel limit"
        )));
    }
    let size = Size::new(width, height);
    if width == 0 || height == 0 {
        return Err(Error::InvalidImage(format!("image has zero pixels ({size})")));
    }

    let num_channels = channel_names.len();
    let num_bytes = width
        .checked_mul(height)
        .and_then(|pixels| pixels.checked_mul(num_channels * 4))
        .ok_or_else(|| Error::InvalidImage(format!("PFM dimensions {size} overflow")))?;

    // Grows with the data actually present, so a lying header cannot force
    // a huge allocation up front.
    let mut bytes = Vec::new();
    reader.take(num_bytes as u64).read_to_end(&mut bytes)?;
    if bytes.len() < num_bytes {
        return Err(Error::InvalidImage(format!(
            "PFM data is shorter than the expected {num_bytes} bytes"
        )));
    }

    let mut data = vec![vec![0.0f32; size.pixel_count()]; num_channels];
    for (i, chunk) in bytes.chunks_exact(4).enumerate() {
        let raw = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let value = if little_endian { f32::from_le_bytes(raw) } else { f32::from_be_bytes(raw) };

        let pixel = i / num_channels;
        let (x, file_row) = (pixel % width, pixel / width);
        // stored bottom row first
        let y = height - 1 - file_row;
        data[i % num_channels][y * width + x] = scale * value;
    }

    let channels = channel_names
        .iter()
        .zip(data)
        .map(|(name, samples)| Channel::from_data(*name, size, samples))
        .collect::<Result<Vec<_>>>()?;
    Image::new(size, channels)
}

fn parse_header<T: std::str::FromStr>(reader: &mut impl BufRead, field: &str) -> Result<T> {
    let token = read_token(reader)?;
    token
        .parse()
        .map_err(|_| Error::InvalidImage(format!("invalid PFM {field} {token:?}")))
}

/// Next whitespace-delimited header token. Consumes exactly one delimiter
/// after the token, so the pixel data starts right after the scale's newline.
fn read_token(reader: &mut impl BufRead) -> Result<String> {
    let mut token = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        if reader.read(&mut byte)? == 0 {
            break;
        }
        if byte[0].is_ascii_whitespace() {
            if token.is_empty() {
                continue;
            }
            break;
        }
        token.push(byte[0]);
    }

    if token.is_empty() {
        return Err(Error::InvalidImage("truncated PFM header".to_string()));
    }
    String::from_utf8(token).map_err(|_| Error::InvalidImage("PFM header is not ASCII".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pfm(header: &str, values: &[f32], little_endian: bool) -> Vec<u8> {
        let mut bytes = header.as_bytes().to_vec();
        for v in values {
            if little_endian {
                bytes.extend_from_slice(&v.to_le_bytes());
            } else {
                bytes.extend_from_slice(&v.to_be_bytes());
            }
        }
        bytes
    }

    #[test]
    fn test_grayscale_is_flipped_and_scaled() {
        // rows stored bottom first: [3, 4] then [1, 2]
        let bytes = pfm("Pf\n2 2\n-2.0\n", &[3.0, 4.0, 1.0, 2.0], true);
        let image = load_pfm(bytes.as_slice()).unwrap();
        assert_eq!(image.channels().len(), 1);
        assert_eq!(image.channels()[0].name(), "L");
        assert_eq!(image.channels()[0].samples(), &[2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_big_endian_rgb() {
        let bytes = pfm("PF 1 1 1.0\n", &[0.5, -1.0, 8.0], false);
        let image = load_pfm(bytes.as_slice()).unwrap();
        let values: Vec<f32> = image.channels().iter().map(|c| c.eval(0)).collect();
        assert_eq!(values, vec![0.5, -1.0, 8.0]);
        assert_eq!(image.channels_in_group(""), vec!["R", "G", "B"]);
    }

    #[test]
    fn test_data_starting_with_whitespace_byte() {
        // 0x20 is the first little-endian byte of this value
        let value = f32::from_le_bytes([0x20, 0, 0x80, 0x3f]);
        let bytes = pfm("Pf\n1 1\n-1.0\n", &[value], true);
        let image = load_pfm(bytes.as_slice()).unwrap();
        assert_eq!(image.channels()[0].eval(0), value);
    }

    #[test]
    fn test_rejects_bad_headers() {
        for header in ["P6\n1 1\n-1.0\n", "PF\n1 1\n0.0\n", "PF\n1 1\ninf\n", "PF\n0 4\n-1.0\n", "PF\nx 1\n-1.0\n", "PF\n1"] {
            let bytes = pfm(header, &[0.0; 3], true);
            assert!(matches!(load_pfm(bytes.as_slice()), Err(Error::InvalidImage(_))), "{header:?}");
        }
    }

    #[test]
    fn test_rejects_short_data() {
        let bytes = pfm("PF\n2 1\n-1.0\n", &[1.0, 2.0, 3.0, 4.0], true);
        assert!(matches!(load_pfm(bytes.as_slice()), Err(Error::InvalidImage(_))));
    }

    #[test]
    fn test_rejects_oversized_dimensions() {
        for header in ["PF\n4294967296 4294967296\n-1.0\n", "PF\n2000000 2000000\n-1.0\n", "Pf\n1 65537\n-1.0\n"] {
            match load_pfm(header.as_bytes()) {
                Err(Error::InvalidImage(reason)) => assert!(reason.contains("limit"), "{header:?}: {reason}"),
                other => panic!("{header:?}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_large_header_with_little_data_is_short() {
        // 65536 x 65536 RGB claims 48 GiB; only four floats follow.
        let bytes = pfm("PF\n65536 65536\n-1.0\n", &[1.0, 2.0, 3.0, 4.0], true);
        match load_pfm(bytes.as_slice()) {
            Err(Error::InvalidImage(reason)) => assert!(reason.contains("shorter"), "{reason}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_open_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pfm");
        std::fs::write(&path, b"nonsense").unwrap();
        match open(&path) {
            Err(Error::ImageLoad { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(open(dir.path().join("missing.pfm")), Err(Error::ImageLoad { .. })));
    }
}
