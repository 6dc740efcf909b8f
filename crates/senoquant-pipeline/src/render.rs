//! Annotated overlay rendering at native resolution.
//!
//! Class masks are produced on the working grid and resampled back to
//! the source dimensions here. Encoding to PNG bytes is left to the
//! export crate.

use image::imageops::{self, FilterType};
use image::{Luma, Rgb};

use crate::normalize::Window;
use crate::types::{ChannelTriple, FOREGROUND, Mask, RgbImage, Role};

/// Boundary colour for senescent nuclei.
pub const SENESCENT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Boundary colour for quiescent nuclei.
pub const QUIESCENT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Resample `mask` to `width x height`.
///
/// Bilinear interpolation followed by a `> 0` re-threshold, so any
/// output pixel touched by foreground stays foreground.
#[must_use]
pub fn upscale_mask(mask: &Mask, width: u32, height: u32) -> Mask {
    if mask.dimensions() == (width, height) {
        return mask.clone();
    }
    let mut resized = imageops::resize(mask, width, height, FilterType::Triangle);
    for p in resized.pixels_mut() {
        if p.0[0] > 0 {
            p.0[0] = FOREGROUND;
        }
    }
    resized
}

fn to_byte(v: f32) -> u8 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let b = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    b
}

/// RGB composite of the three channels, each mapped through its
/// intensity window (indexed by [`Role::index`]).
///
/// Red is the senescent marker, green the quiescent marker, blue the
/// nuclear stain.
#[must_use]
pub fn composite(triple: &ChannelTriple, windows: &[Window; 3]) -> RgbImage {
    let dims = triple.dimensions();
    RgbImage::from_fn(dims.width, dims.height, |x, y| {
        Rgb(Role::ALL.map(|role| {
            let value = f32::from(triple.get(role).get_pixel(x, y).0[0]);
            to_byte(windows[role.index()].apply(value))
        }))
    })
}

/// Thick boundaries of `mask`.
///
/// A pixel is on the boundary when its 3x3 neighbourhood contains both
/// foreground and background. Neighbours outside the image are ignored.
#[must_use]
pub fn find_boundaries(mask: &Mask) -> Mask {
    let (w, h) = mask.dimensions();
    Mask::from_fn(w, h, |x, y| {
        let mut fg = false;
        let mut bg = false;
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                if mask.get_pixel(nx, ny).0[0] == 0 {
                    bg = true;
                } else {
                    fg = true;
                }
            }
        }
        if fg && bg { Luma([FOREGROUND]) } else { Luma([0]) }
    })
}

fn paint(image: &mut RgbImage, mask: &Mask, color: Rgb<u8>) {
    let boundaries = find_boundaries(mask);
    for (x, y, p) in boundaries.enumerate_pixels() {
        if p.0[0] != 0 {
            image.put_pixel(x, y, color);
        }
    }
}

/// Draw class boundaries over `composite`.
///
/// Senescent boundaries are drawn first, so quiescent wins where the
/// two touch.
#[must_use]
pub fn overlay(composite: &RgbImage, senescent: &Mask, quiescent: &Mask) -> RgbImage {
    let mut out = composite.clone();
    paint(&mut out, senescent, SENESCENT_COLOR);
    paint(&mut out, quiescent, QUIESCENT_COLOR);
    out
}
