//! Global thresholding of the smoothed nuclear plane.
//!
//! All binarization here uses a strict `>` comparison: a pixel exactly at
//! the level is background.

use image::Luma;

use crate::types::{FloatPlane, FOREGROUND, GrayImage, Mask};

/// An Otsu result with more 8-connected objects than this is treated as
/// background noise and discarded.
pub const OTSU_MAX_OBJECTS: usize = 50_000;

/// Quantize a `[0, 1]` plane onto 256 grey levels.
///
/// Values outside `[0, 1]` are clamped first.
#[must_use]
pub fn quantize(plane: &FloatPlane) -> GrayImage {
    let (w, h) = plane.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let v = plane.get_pixel(x, y).0[0].clamp(0.0, 1.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let q = (v * 255.0).round() as u8;
        Luma([q])
    })
}

/// Otsu's level of a [`quantize`]d plane.
///
/// Foreground is `quantized > level`.
#[must_use]
pub fn otsu_level(quantized: &GrayImage) -> u8 {
    imageproc::contrast::otsu_level(quantized)
}

/// Arithmetic mean of all samples; 0.0 for an empty plane.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn mean_level(plane: &FloatPlane) -> f32 {
    let n = plane.as_raw().len();
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = plane.as_raw().iter().map(|&v| f64::from(v)).sum();
    (sum / n as f64) as f32
}

/// Foreground where `plane > level`.
#[must_use]
pub fn binarize(plane: &FloatPlane, level: f32) -> Mask {
    let (w, h) = plane.dimensions();
    Mask::from_fn(w, h, |x, y| {
        if plane.get_pixel(x, y).0[0] > level {
            Luma([FOREGROUND])
        } else {
            Luma([0])
        }
    })
}

/// Binarize `plane` at its Otsu level.
#[must_use]
pub fn binarize_otsu(plane: &FloatPlane) -> Mask {
    let quantized = quantize(plane);
    let level = otsu_level(&quantized);
    tracing::debug!(level, "otsu level");
    let (w, h) = quantized.dimensions();
    Mask::from_fn(w, h, |x, y| {
        if quantized.get_pixel(x, y).0[0] > level {
            Luma([FOREGROUND])
        } else {
            Luma([0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Dark left half at 0.1, bright right half at 0.9.
    fn bimodal() -> FloatPlane {
        FloatPlane::from_fn(20, 10, |x, _| if x < 10 { Luma([0.1]) } else { Luma([0.9]) })
    }

    #[test]
    fn quantize_maps_unit_interval_to_bytes() {
        let plane = FloatPlane::from_fn(3, 1, |x, _| Luma([[0.0, 0.5, 1.5][x as usize]]));
        let q = quantize(&plane);
        assert_eq!(q.get_pixel(0, 0).0[0], 0);
        assert_eq!(q.get_pixel(1, 0).0[0], 128);
        assert_eq!(q.get_pixel(2, 0).0[0], 255);
    }

    #[test]
    fn otsu_separates_bimodal_plane() {
        let mask = binarize_otsu(&bimodal());
        for (x, _, p) in mask.enumerate_pixels() {
            let expected = if x < 10 { 0 } else { FOREGROUND };
            assert_eq!(p.0[0], expected, "x={x}");
        }
    }

    #[test]
    fn otsu_level_falls_between_modes() {
        let quantized = quantize(&bimodal());
        let level = otsu_level(&quantized);
        // Modes quantize to about 26 and 229.
        assert!((26..229).contains(&level), "level={level}");
        let mask = binarize_otsu(&bimodal());
        for (x, y, q) in quantized.enumerate_pixels() {
            let expected = if q.0[0] > level { FOREGROUND } else { 0 };
            assert_eq!(mask.get_pixel(x, y).0[0], expected);
        }
    }

    #[test]
    fn mean_level_of_bimodal_plane() {
        assert!((mean_level(&bimodal()) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn mean_level_of_empty_plane_is_zero() {
        assert!(mean_level(&FloatPlane::new(0, 0)).abs() < f32::EPSILON);
    }

    #[test]
    fn binarize_is_strict() {
        let plane = FloatPlane::from_fn(3, 1, |x, _| Luma([[0.4, 0.5, 0.6][x as usize]]));
        let mask = binarize(&plane, 0.5);
        assert_eq!(mask.get_pixel(0, 0).0[0], 0);
        assert_eq!(mask.get_pixel(1, 0).0[0], 0, "pixel at level is background");
        assert_eq!(mask.get_pixel(2, 0).0[0], FOREGROUND);
    }
}
