//! PNG encoding of overlays and class masks.

use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use senoquant_pipeline::Mask;
use senoquant_pipeline::types::RgbImage;

use crate::ExportError;

/// File names written for one source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    /// Annotated overlay, `<base>.png`.
    pub overlay: String,
    /// Senescent mask, `<base>_senescent.png`.
    pub senescent: String,
    /// Quiescent mask, `<base>_quiescent.png`.
    pub quiescent: String,
}

impl ArtifactNames {
    /// Names derived from the source file stem `base`.
    #[must_use]
    pub fn for_image(base: &str) -> Self {
        Self {
            overlay: format!("{base}.png"),
            senescent: format!("{base}_senescent.png"),
            quiescent: format!("{base}_quiescent.png"),
        }
    }
}

/// Encode an RGB overlay as PNG bytes.
///
/// # Errors
///
/// Returns [`ExportError::PngEncode`] if encoding fails.
pub fn encode_overlay_png(image: &RgbImage) -> Result<Vec<u8>, ExportError> {
    let mut png_bytes = Vec::new();
    let encoder = PngEncoder::new(&mut png_bytes);
    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(png_bytes)
}

/// Encode a {0, 255} mask as an 8-bit grayscale PNG.
///
/// # Errors
///
/// Returns [`ExportError::PngEncode`] if encoding fails.
pub fn encode_mask_png(mask: &Mask) -> Result<Vec<u8>, ExportError> {
    let mut png_bytes = Vec::new();
    let encoder = PngEncoder::new(&mut png_bytes);
    encoder.write_image(
        mask.as_raw(),
        mask.width(),
        mask.height(),
        image::ExtendedColorType::L8,
    )?;
    Ok(png_bytes)
}
