//! Nucleus detection on the smoothed nuclear plane.
//!
//! Stage order is fixed: well-ring removal, binarization, opening, hole
//! filling, size filtering. Every area parameter arrives in native
//! pixels and is scaled to the working grid here.

use std::fmt;

use image::Luma;

use crate::components::{self, Connectivity};
use crate::downsample::scale_area;
use crate::morphology;
use crate::threshold::{self, OTSU_MAX_OBJECTS};
use crate::types::{FloatPlane, Mask, PipelineConfig, ThresholdMethod, WellRingConfig};

/// A recoverable condition encountered during detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionWarning {
    /// Otsu split background noise into too many objects; the
    /// thresholded mask was discarded.
    ThresholdCollapse {
        /// Objects found before the mask was discarded.
        objects: usize,
    },
}

impl fmt::Display for DetectionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThresholdCollapse { objects } => write!(
                f,
                "no nuclei detected: threshold produced {objects} objects (limit {OTSU_MAX_OBJECTS})"
            ),
        }
    }
}

/// Binary nucleus mask on the working grid.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Foreground pixels are nuclei.
    pub mask: Mask,
    /// Set when the threshold result was discarded.
    pub warning: Option<DetectionWarning>,
}

/// Zero out large bright structures such as the rim of a culture well.
///
/// The plane is binarized at its mean. Any 8-connected bright region
/// larger than `ring_min_area` is removed, then every 4-connected piece
/// of what remains that is smaller than `keep_min_area` is removed too,
/// which clears image corners cut off by the ring. Removed pixels are
/// set to 0 in the returned plane; all others keep their value. When no
/// region exceeds `ring_min_area` the plane is returned unchanged.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn remove_well_rings(plane: &FloatPlane, config: &WellRingConfig, factor: u32) -> FloatPlane {
    let ring_min = scale_area(config.ring_min_area, factor);
    let keep_min = scale_area(config.keep_min_area, factor);

    let bright = threshold::binarize(plane, threshold::mean_level(plane));
    let rings = components::retain_by_area(&bright, Connectivity::Eight, |a| a as f64 > ring_min);
    if components::foreground_area(&rings) == 0 {
        return plane.clone();
    }
    let keep = components::invert(&rings);
    let keep = components::retain_by_area(&keep, Connectivity::Four, |a| a as f64 >= keep_min);

    tracing::debug!(
        kept_pixels = components::foreground_area(&keep),
        total_pixels = keep.as_raw().len(),
        "well-ring removal"
    );

    let (w, h) = plane.dimensions();
    FloatPlane::from_fn(w, h, |x, y| {
        if keep.get_pixel(x, y).0[0] == 0 {
            Luma([0.0])
        } else {
            *plane.get_pixel(x, y)
        }
    })
}

/// Binarize `plane` with `method`.
///
/// For Otsu, a result with more than [`OTSU_MAX_OBJECTS`] components is
/// replaced by an empty mask and reported as a warning. Logging the
/// warning is left to the caller, which knows the image.
#[must_use]
pub fn binarize(plane: &FloatPlane, method: ThresholdMethod) -> Detection {
    match method {
        ThresholdMethod::Fixed { level } => Detection {
            mask: threshold::binarize(plane, level),
            warning: None,
        },
        ThresholdMethod::Otsu => {
            let mask = threshold::binarize_otsu(plane);
            let objects =
                components::component_count(&components::label(&mask, Connectivity::Eight));
            if objects > OTSU_MAX_OBJECTS {
                let warning = DetectionWarning::ThresholdCollapse { objects };
                let (w, h) = mask.dimensions();
                Detection {
                    mask: Mask::new(w, h),
                    warning: Some(warning),
                }
            } else {
                Detection {
                    mask,
                    warning: None,
                }
            }
        }
    }
}

/// Run the full detection sequence on the smoothed nuclear plane.
#[must_use]
pub fn detect_nuclei(smoothed: &FloatPlane, config: &PipelineConfig) -> Detection {
    let factor = config.downscale_factor;

    let cleaned;
    let input = if let Some(well_ring) = &config.well_ring {
        cleaned = remove_well_rings(smoothed, well_ring, factor);
        &cleaned
    } else {
        smoothed
    };

    let Detection { mask, warning } = binarize(input, config.threshold);
    let radius = morphology::working_radius(config.opening_radius, factor);
    let mask = morphology::open_disk(&mask, radius);
    let mask = components::fill_holes(&mask, scale_area(config.hole_area, factor));
    let mask = components::filter_by_size(
        &mask,
        scale_area(config.min_area, factor),
        scale_area(config.max_area, factor),
    );

    tracing::debug!(
        foreground = components::foreground_area(&mask),
        radius,
        "nucleus detection"
    );
    Detection { mask, warning }
}
