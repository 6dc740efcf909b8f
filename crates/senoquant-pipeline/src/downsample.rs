//! Integer block-mean downscaling to the working grid.
//!
//! Every channel is reduced by the same integer factor along both axes
//! before segmentation, so all expensive downstream stages (blur,
//! thresholding, labelling) operate on a much smaller pixel grid. Each
//! output pixel is the mean of one `factor x factor` block; trailing
//! rows and columns that do not fill a whole block are dropped, so the
//! output is `floor(w / factor) x floor(h / factor)`.
//!
//! Area thresholds are configured in native pixels and converted with
//! [`scale_area`].

use image::{ImageBuffer, Luma, Primitive};

use crate::types::{Dimensions, FloatPlane, PipelineError};

/// Block-average `image` by `factor` along both axes.
///
/// A factor of 1 returns the image converted to `f32` unchanged.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `factor` is zero and
/// [`PipelineError::ImageTooSmall`] if either dimension is smaller than
/// `factor`.
pub fn downscale_mean<P>(
    image: &ImageBuffer<Luma<P>, Vec<P>>,
    factor: u32,
) -> Result<FloatPlane, PipelineError>
where
    P: Primitive + Into<f32>,
{
    if factor == 0 {
        return Err(PipelineError::InvalidConfig(
            "downscale_factor must be at least 1".to_string(),
        ));
    }
    let dimensions = Dimensions::of(image);
    let out_w = dimensions.width / factor;
    let out_h = dimensions.height / factor;
    if out_w == 0 || out_h == 0 {
        return Err(PipelineError::ImageTooSmall { dimensions, factor });
    }

    let block = f64::from(factor) * f64::from(factor);
    Ok(FloatPlane::from_fn(out_w, out_h, |bx, by| {
        let mut sum = 0.0_f64;
        for y in by * factor..(by + 1) * factor {
            for x in bx * factor..(bx + 1) * factor {
                let value: f32 = image.get_pixel(x, y).0[0].into();
                sum += f64::from(value);
            }
        }
        #[allow(clippy::cast_possible_truncation)]
        let mean = (sum / block) as f32;
        Luma([mean])
    }))
}

/// Convert a native-resolution pixel area to working-grid pixels.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn scale_area(native_area: u64, factor: u32) -> f64 {
    let factor = f64::from(factor.max(1));
    native_area as f64 / (factor * factor)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Plane;

    #[test]
    fn factor_one_is_identity() {
        let img = Plane::from_fn(5, 3, |x, y| Luma([u16::try_from(x + 10 * y).unwrap()]));
        let out = downscale_mean(&img, 1).unwrap();
        assert_eq!(out.dimensions(), (5, 3));
        for (x, y, p) in img.enumerate_pixels() {
            assert!((out.get_pixel(x, y).0[0] - f32::from(p.0[0])).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn output_dimensions_are_floored() {
        let img = Plane::new(103, 98);
        let out = downscale_mean(&img, 4).unwrap();
        assert_eq!(out.dimensions(), (25, 24));
    }

    #[test]
    fn block_values_are_averaged() {
        // Left 2x2 block: 0, 2, 4, 6 -> 3. Right block: 100 everywhere.
        let img = Plane::from_fn(4, 2, |x, y| {
            if x < 2 {
                Luma([u16::try_from(2 * x + 4 * y).unwrap()])
            } else {
                Luma([100])
            }
        });
        let out = downscale_mean(&img, 2).unwrap();
        assert_eq!(out.dimensions(), (2, 1));
        assert!((out.get_pixel(0, 0).0[0] - 3.0).abs() < 1e-6);
        assert!((out.get_pixel(1, 0).0[0] - 100.0).abs() < 1e-6);
    }

    #[test]
    fn float_planes_are_supported() {
        let img = FloatPlane::from_pixel(8, 8, Luma([0.25]));
        let out = downscale_mean(&img, 4).unwrap();
        assert_eq!(out.dimensions(), (2, 2));
        assert!(out.pixels().all(|p| (p.0[0] - 0.25).abs() < 1e-6));
    }

    #[test]
    fn factor_larger_than_image_is_an_error() {
        let img = Plane::new(3, 10);
        let result = downscale_mean(&img, 4);
        assert!(matches!(
            result,
            Err(PipelineError::ImageTooSmall { factor: 4, .. })
        ));
    }

    #[test]
    fn zero_factor_is_an_error() {
        let img = Plane::new(3, 3);
        assert!(downscale_mean(&img, 0).is_err());
    }

    #[test]
    fn scale_area_divides_by_factor_squared() {
        assert!((scale_area(7000, 4) - 437.5).abs() < f64::EPSILON);
        assert!((scale_area(100, 1) - 100.0).abs() < f64::EPSILON);
    }
}
