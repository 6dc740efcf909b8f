//! Channel containers.
//!
//! A [`ChannelSource`] turns one file into a stack of grayscale planes
//! plus the per-plane channel names used for name-based resolution.
//! [`TiffChannelSource`] reads the two layouts microscopes commonly
//! export as TIFF:
//!
//! - multi-page: one grayscale page per channel, named by the page's
//!   `ImageDescription` tag;
//! - single page with three samples per pixel (no names).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use senoquant_pipeline::Plane;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::IoError;

/// Planes read from one container, in file order.
#[derive(Debug, Clone)]
pub struct ChannelStack {
    /// One plane per channel.
    pub planes: Vec<Plane>,
    /// Channel names, parallel to `planes`. Empty strings where the
    /// container carries no name.
    pub names: Vec<String>,
}

/// Reads channel planes from a file.
pub trait ChannelSource {
    /// Decode every channel in `path`.
    ///
    /// # Errors
    ///
    /// Returns an [`IoError`] if the file cannot be opened or decoded.
    fn read_channels(&self, path: &Path) -> Result<ChannelStack, IoError>;
}

/// TIFF reader for 8- and 16-bit unsigned grayscale or RGB data.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffChannelSource;

impl ChannelSource for TiffChannelSource {
    fn read_channels(&self, path: &Path) -> Result<ChannelStack, IoError> {
        let file = File::open(path).map_err(|source| IoError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let tiff_err = |source| IoError::Tiff {
            path: path.to_path_buf(),
            source,
        };

        // Whole-slide exports easily exceed the decoder's default buffer cap.
        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(tiff_err)?
            .with_limits(Limits::unlimited());

        let mut stack = ChannelStack {
            planes: Vec::new(),
            names: Vec::new(),
        };
        loop {
            read_page(&mut decoder, path, &mut stack)?;
            if !decoder.more_images() {
                break;
            }
            decoder.next_image().map_err(tiff_err)?;
        }

        tracing::debug!(
            path = %path.display(),
            channels = stack.planes.len(),
            names = ?stack.names,
            "decoded channel stack"
        );
        Ok(stack)
    }
}

fn read_page(
    decoder: &mut Decoder<BufReader<File>>,
    path: &Path,
    stack: &mut ChannelStack,
) -> Result<(), IoError> {
    let tiff_err = |source| IoError::Tiff {
        path: path.to_path_buf(),
        source,
    };
    let unsupported = |detail: String| IoError::Unsupported {
        path: path.to_path_buf(),
        detail,
    };

    let (width, height) = decoder.dimensions().map_err(tiff_err)?;
    let color_type = decoder.colortype().map_err(tiff_err)?;
    let samples = match color_type {
        tiff::ColorType::Gray(_) => 1,
        tiff::ColorType::RGB(_) => 3,
        other => return Err(unsupported(format!("color type {other:?}"))),
    };
    let name = decoder
        .get_tag_ascii_string(Tag::ImageDescription)
        .map(|s| s.trim_end_matches('\0').to_string())
        .unwrap_or_default();

    let data: Vec<u16> = match decoder.read_image().map_err(tiff_err)? {
        DecodingResult::U8(buf) => buf.into_iter().map(u16::from).collect(),
        DecodingResult::U16(buf) => buf,
        _ => {
            return Err(unsupported(format!(
                "sample format of {color_type:?} (only 8- and 16-bit unsigned)"
            )));
        }
    };

    let pixels = usize::try_from(u64::from(width) * u64::from(height))
        .map_err(|_| unsupported(format!("page of {width}x{height} is too large")))?;
    if data.len() != pixels * samples {
        return Err(unsupported(format!(
            "expected {} samples, decoded {}",
            pixels * samples,
            data.len()
        )));
    }

    if samples == 1 {
        let plane = Plane::from_raw(width, height, data)
            .ok_or_else(|| unsupported("page buffer size mismatch".to_string()))?;
        stack.planes.push(plane);
        stack.names.push(name);
        return Ok(());
    }

    for channel in 0..samples {
        let raw: Vec<u16> = data.iter().skip(channel).step_by(samples).copied().collect();
        let plane = Plane::from_raw(width, height, raw)
            .ok_or_else(|| unsupported("page buffer size mismatch".to_string()))?;
        stack.planes.push(plane);
        stack.names.push(String::new());
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use tiff::encoder::{TiffEncoder, colortype};

    use super::*;

    fn write_pages(path: &Path, pages: &[(&str, Vec<u16>)], width: u32, height: u32) {
        let mut encoder = TiffEncoder::new(File::create(path).unwrap()).unwrap();
        for (name, data) in pages {
            let mut page = encoder.new_image::<colortype::Gray16>(width, height).unwrap();
            if !name.is_empty() {
                page.encoder().write_tag(Tag::ImageDescription, *name).unwrap();
            }
            page.write_data(data).unwrap();
        }
    }

    #[test]
    fn multi_page_gray16_with_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.tif");
        let pages = [
            ("mCherry", vec![1u16; 12]),
            ("GFP", vec![2u16; 12]),
            ("DAPI", (0..12).collect()),
        ];
        write_pages(&path, &pages, 4, 3);

        let stack = TiffChannelSource.read_channels(&path).unwrap();
        assert_eq!(stack.planes.len(), 3);
        assert_eq!(stack.names, vec!["mCherry", "GFP", "DAPI"]);
        assert_eq!(stack.planes[0].dimensions(), (4, 3));
        assert_eq!(stack.planes[1].get_pixel(2, 1).0[0], 2);
        assert_eq!(stack.planes[2].get_pixel(3, 2).0[0], 11);
    }

    #[test]
    fn unnamed_pages_have_empty_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.tif");
        write_pages(&path, &[("", vec![0; 4]), ("", vec![0; 4])], 2, 2);

        let stack = TiffChannelSource.read_channels(&path).unwrap();
        assert_eq!(stack.names, vec![String::new(), String::new()]);
    }

    #[test]
    fn rgb_page_splits_into_three_planes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgb.tif");
        let data: Vec<u8> = [10u8, 20, 30].repeat(6);
        let mut encoder = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
        encoder
            .write_image::<colortype::RGB8>(3, 2, &data)
            .unwrap();

        let stack = TiffChannelSource.read_channels(&path).unwrap();
        assert_eq!(stack.planes.len(), 3);
        assert_eq!(stack.planes[0].get_pixel(1, 1).0[0], 10);
        assert_eq!(stack.planes[1].get_pixel(1, 1).0[0], 20);
        assert_eq!(stack.planes[2].get_pixel(1, 1).0[0], 30);
    }

    #[test]
    fn missing_file_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TiffChannelSource
            .read_channels(&dir.path().join("none.tif"))
            .unwrap_err();
        assert!(matches!(err, IoError::Open { .. }));
    }

    #[test]
    fn garbage_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.tif");
        File::create(&path).unwrap().write_all(b"not a tiff").unwrap();
        let err = TiffChannelSource.read_channels(&path).unwrap_err();
        assert!(matches!(err, IoError::Tiff { .. }));
    }
}
