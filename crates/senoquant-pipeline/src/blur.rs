//! Gaussian smoothing of the nuclear stain before thresholding.
//!
//! Wraps [`imageproc::filter::gaussian_blur_f32`] to suppress
//! pixel-level noise without materially eroding nucleus boundaries.
//! Only the nuclear-stain channel is smoothed; the marker channels are
//! averaged per nucleus by the classifier and need no smoothing.

use crate::types::FloatPlane;

/// Apply Gaussian blur to a floating-point plane.
///
/// Non-positive sigma values return the plane unchanged, since
/// `imageproc`'s underlying function panics on `sigma <= 0.0`.
#[must_use = "returns the blurred plane"]
pub fn gaussian_blur(plane: &FloatPlane, sigma: f32) -> FloatPlane {
    if sigma <= 0.0 {
        return plane.clone();
    }

    imageproc::filter::gaussian_blur_f32(plane, sigma)
}
