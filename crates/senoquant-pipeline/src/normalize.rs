//! Per-channel percentile normalization.
//!
//! Each channel is rescaled independently so that its low percentile
//! maps to 0.0 and its high percentile maps to 1.0, clipping outside
//! that window. Normalization is per image, so absolute brightness is
//! not comparable across images.

use image::{ImageBuffer, Luma, Primitive};

use crate::types::FloatPlane;

/// The `p`-th percentile (0..=100) of an ascending-sorted slice.
///
/// Uses linear interpolation between the two nearest order statistics,
/// matching the common `numpy.percentile` default. Returns 0.0 for an
/// empty slice.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile(sorted: &[f32], p: f32) -> f32 {
    let Some(&last) = sorted.last() else {
        return 0.0;
    };
    if sorted.len() == 1 {
        return last;
    }
    let rank = f64::from(p.clamp(0.0, 100.0)) / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    let a = f64::from(sorted[lo]);
    let b = f64::from(sorted[hi]);
    frac.mul_add(b - a, a) as f32
}

/// Intensity window computed for one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    /// Value mapped to 0.0.
    pub low: f32,
    /// Value mapped to 1.0.
    pub high: f32,
}

impl Window {
    /// Compute the `[low_p, high_p]` percentile window of `image`.
    #[must_use]
    pub fn of<P>(image: &ImageBuffer<Luma<P>, Vec<P>>, low_p: f32, high_p: f32) -> Self
    where
        P: Primitive + Into<f32>,
    {
        let mut values: Vec<f32> = image.pixels().map(|p| p.0[0].into()).collect();
        values.sort_unstable_by(f32::total_cmp);
        Self {
            low: percentile(&values, low_p),
            high: percentile(&values, high_p),
        }
    }

    /// Map `value` into `[0, 1]`. A degenerate window maps everything to 0.
    #[must_use]
    pub fn apply(self, value: f32) -> f32 {
        let span = self.high - self.low;
        if span <= 0.0 {
            return 0.0;
        }
        ((value - self.low) / span).clamp(0.0, 1.0)
    }

    /// Map every pixel of `image` through [`Window::apply`].
    #[must_use = "returns the normalized plane"]
    pub fn normalize<P>(self, image: &ImageBuffer<Luma<P>, Vec<P>>) -> FloatPlane
    where
        P: Primitive + Into<f32>,
    {
        let (w, h) = image.dimensions();
        FloatPlane::from_fn(w, h, |x, y| {
            Luma([self.apply(image.get_pixel(x, y).0[0].into())])
        })
    }
}

/// Rescale `image` so its `low_p` percentile maps to 0.0 and its
/// `high_p` percentile maps to 1.0, clipping outside that range.
#[must_use = "returns the normalized plane"]
pub fn normalize_percentile<P>(
    image: &ImageBuffer<Luma<P>, Vec<P>>,
    low_p: f32,
    high_p: f32,
) -> FloatPlane
where
    P: Primitive + Into<f32>,
{
    Window::of(image, low_p, high_p).normalize(image)
}
