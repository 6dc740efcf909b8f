//! Binary opening with a disk footprint.
//!
//! Removes thin bridges and specks left by thresholding before holes
//! are filled and sizes are filtered.

use imageproc::distance_transform::Norm;

use crate::types::Mask;

/// Disk radius on the working grid for a native-resolution radius.
///
/// Integer division, so small radii vanish at coarse factors.
#[must_use]
pub const fn working_radius(native_radius: u32, factor: u32) -> u32 {
    if factor == 0 {
        native_radius
    } else {
        native_radius / factor
    }
}

/// Erode then dilate `mask` with a Euclidean disk of `radius`.
///
/// A radius of 0 returns the mask unchanged.
#[must_use = "returns the opened mask"]
pub fn open_disk(mask: &Mask, radius: u32) -> Mask {
    if radius == 0 {
        return mask.clone();
    }
    let k = u8::try_from(radius).unwrap_or(u8::MAX);
    imageproc::morphology::open(mask, Norm::L2, k)
}
