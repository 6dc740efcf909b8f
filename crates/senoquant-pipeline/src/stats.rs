//! Per-image nucleus counts and size statistics.
//!
//! Each class mask is relabelled independently (8-connectivity), so
//! statistics depend only on the masks and never on labels carried over
//! from classification. Masks are measured on the grid they were
//! classified on; `pixel_area` converts each pixel to native units.
//!
//! Numbers print the way the results table has always shown them:
//! floats keep a trailing `.0` (`2100.0`, `2.0`) and an empty class
//! reads `0 ± 0`.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::components::{self, Connectivity};
use crate::types::Mask;

/// Round `value` to `decimals` places, half away from zero.
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10_f64.powi(decimals);
    (value * scale).round() / scale
}

/// Count and area distribution of one class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassStats {
    /// Number of nuclei.
    pub count: usize,
    /// Mean area in pixels, rounded to 2 decimals.
    pub mean_area: f64,
    /// Population standard deviation of area, rounded to 2 decimals.
    pub std_area: f64,
}

impl ClassStats {
    /// Statistics of an explicit list of areas.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_areas(areas: &[u64]) -> Self {
        if areas.is_empty() {
            return Self {
                count: 0,
                mean_area: 0.0,
                std_area: 0.0,
            };
        }
        let n = areas.len() as f64;
        let mean = areas.iter().map(|&a| a as f64).sum::<f64>() / n;
        let variance = areas
            .iter()
            .map(|&a| {
                let d = a as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        Self {
            count: areas.len(),
            mean_area: round_to(mean, 2),
            std_area: round_to(variance.sqrt(), 2),
        }
    }

    /// Label `mask` and measure its components, one pixel per unit area.
    #[must_use]
    pub fn from_mask(mask: &Mask) -> Self {
        Self::from_mask_scaled(mask, 1)
    }

    /// Label `mask` and measure its components, each pixel covering
    /// `pixel_area` native pixels.
    #[must_use]
    pub fn from_mask_scaled(mask: &Mask, pixel_area: u64) -> Self {
        let labels = components::label(mask, Connectivity::Eight);
        let areas: Vec<u64> = components::areas(&labels)
            .into_iter()
            .skip(1)
            .map(|a| a * pixel_area)
            .collect();
        Self::from_areas(&areas)
    }

    /// `"mean ± std"` as written to the results table.
    #[must_use]
    pub fn area_summary(&self) -> String {
        if self.count == 0 {
            return "0 \u{b1} 0".to_string();
        }
        format!("{:?} \u{b1} {:?}", self.mean_area, self.std_area)
    }
}

/// Quiescent-to-senescent count ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ratio {
    /// Rounded to 3 decimals.
    Finite(f64),
    /// No senescent nuclei.
    Infinite,
}

impl Ratio {
    /// `quiescent / senescent`, or [`Ratio::Infinite`] when `senescent` is 0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn of(quiescent: usize, senescent: usize) -> Self {
        if senescent == 0 {
            Self::Infinite
        } else {
            Self::Finite(round_to(quiescent as f64 / senescent as f64, 3))
        }
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(v) => write!(f, "{v:?}"),
            Self::Infinite => f.write_str("inf"),
        }
    }
}

impl Serialize for Ratio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Finite(v) => serializer.serialize_f64(*v),
            Self::Infinite => serializer.serialize_str("inf"),
        }
    }
}

/// Counts, sizes, and ratio for one image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImageSummary {
    /// Quiescent class statistics.
    pub quiescent: ClassStats,
    /// Senescent class statistics.
    pub senescent: ClassStats,
    /// `quiescent.count / senescent.count`.
    pub ratio: Ratio,
}

impl ImageSummary {
    /// Measure both class masks, one pixel per unit area.
    #[must_use]
    pub fn from_masks(senescent: &Mask, quiescent: &Mask) -> Self {
        Self::measure(senescent, quiescent, 1)
    }

    /// Measure both class masks, each pixel covering `pixel_area`
    /// native pixels.
    #[must_use]
    pub fn measure(senescent: &Mask, quiescent: &Mask, pixel_area: u64) -> Self {
        let senescent = ClassStats::from_mask_scaled(senescent, pixel_area);
        let quiescent = ClassStats::from_mask_scaled(quiescent, pixel_area);
        Self {
            ratio: Ratio::of(quiescent.count, senescent.count),
            quiescent,
            senescent,
        }
    }
}

/// One row of the results table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRecord {
    /// Source file name including extension.
    pub image: String,
    /// Measurements.
    pub summary: ImageSummary,
}

impl ImageRecord {
    /// Measure `senescent` and `quiescent` for the image called `image`.
    #[must_use]
    pub fn from_masks(image: impl Into<String>, senescent: &Mask, quiescent: &Mask) -> Self {
        Self {
            image: image.into(),
            summary: ImageSummary::from_masks(senescent, quiescent),
        }
    }
}
