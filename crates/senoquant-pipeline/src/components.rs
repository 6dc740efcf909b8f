//! Connected-component labelling and area-based mask editing.
//!
//! Thin layer over [`imageproc::region_labelling::connected_components`].
//! Labels are re-derived on every call; no stage holds on to a label
//! image from a previous stage.

use image::{ImageBuffer, Luma};
use imageproc::region_labelling::connected_components;

pub use imageproc::region_labelling::Connectivity;

use crate::types::{FOREGROUND, Mask};

/// Per-pixel component labels; 0 is background.
pub type Labels = ImageBuffer<Luma<u32>, Vec<u32>>;

/// One connected foreground region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Component {
    /// Label in the [`Labels`] image it was measured from (1-based).
    pub label: u32,
    /// Pixel count.
    pub area: u64,
    /// Mean `(x, y)` pixel position.
    pub centroid: (f64, f64),
}

/// Label the foreground (non-zero) pixels of `mask`.
#[must_use]
pub fn label(mask: &Mask, connectivity: Connectivity) -> Labels {
    connected_components(mask, connectivity, Luma([0u8]))
}

/// Number of distinct components in `labels`.
#[must_use]
pub fn component_count(labels: &Labels) -> usize {
    labels.as_raw().iter().copied().max().unwrap_or(0) as usize
}

/// Pixel count per label, indexed by label (index 0 is background).
#[must_use]
pub fn areas(labels: &Labels) -> Vec<u64> {
    let mut areas = vec![0u64; component_count(labels) + 1];
    for &l in labels.as_raw() {
        areas[l as usize] += 1;
    }
    areas
}

/// Measure every component in `labels`, ordered by label.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn components(labels: &Labels) -> Vec<Component> {
    let n = component_count(labels);
    let mut area = vec![0u64; n + 1];
    let mut sum_x = vec![0u64; n + 1];
    let mut sum_y = vec![0u64; n + 1];
    for (x, y, p) in labels.enumerate_pixels() {
        let l = p.0[0] as usize;
        if l == 0 {
            continue;
        }
        area[l] += 1;
        sum_x[l] += u64::from(x);
        sum_y[l] += u64::from(y);
    }
    (1..=n)
        .filter(|&l| area[l] > 0)
        .map(|l| {
            let a = area[l] as f64;
            Component {
                label: u32::try_from(l).unwrap_or(u32::MAX),
                area: area[l],
                centroid: (sum_x[l] as f64 / a, sum_y[l] as f64 / a),
            }
        })
        .collect()
}

/// Keep only the foreground components whose area satisfies `keep`.
#[must_use]
pub fn retain_by_area<F>(mask: &Mask, connectivity: Connectivity, keep: F) -> Mask
where
    F: Fn(u64) -> bool,
{
    let labels = label(mask, connectivity);
    let kept: Vec<bool> = areas(&labels)
        .into_iter()
        .enumerate()
        .map(|(l, a)| l != 0 && keep(a))
        .collect();
    let (w, h) = mask.dimensions();
    Mask::from_fn(w, h, |x, y| {
        if kept[labels.get_pixel(x, y).0[0] as usize] {
            Luma([FOREGROUND])
        } else {
            Luma([0])
        }
    })
}

/// Remove components with area outside `[min_area, max_area]`.
///
/// Both bounds are inclusive for retention.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn filter_by_size(mask: &Mask, min_area: f64, max_area: f64) -> Mask {
    retain_by_area(mask, Connectivity::Eight, |a| {
        let a = a as f64;
        a >= min_area && a <= max_area
    })
}

/// Fill 4-connected background regions smaller than `max_hole_area`.
///
/// Any small background region is filled, including one touching the
/// image border.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn fill_holes(mask: &Mask, max_hole_area: f64) -> Mask {
    let background = invert(mask);
    let big_background = retain_by_area(&background, Connectivity::Four, |a| {
        a as f64 >= max_hole_area
    });
    invert(&big_background)
}

/// Swap foreground and background.
#[must_use]
pub fn invert(mask: &Mask) -> Mask {
    let (w, h) = mask.dimensions();
    Mask::from_fn(w, h, |x, y| {
        if mask.get_pixel(x, y).0[0] == 0 {
            Luma([FOREGROUND])
        } else {
            Luma([0])
        }
    })
}

/// Number of foreground pixels.
#[must_use]
pub fn foreground_area(mask: &Mask) -> u64 {
    mask.as_raw().iter().filter(|&&v| v != 0).count() as u64
}
