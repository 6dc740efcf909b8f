//! Shared types for the senoquant nucleus pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference binary
/// masks without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can encode overlays
/// without depending on `image` directly.
pub use image::RgbImage;

/// A single raw channel plane at native bit depth (typically 16-bit).
pub type Plane = image::ImageBuffer<image::Luma<u16>, Vec<u16>>;

/// A floating-point channel plane, used for normalized and
/// block-averaged intensities.
pub type FloatPlane = image::ImageBuffer<image::Luma<f32>, Vec<f32>>;

/// A binary mask stored as a `GrayImage`: `0` is background and
/// [`FOREGROUND`] is foreground.
pub type Mask = GrayImage;

/// Pixel value marking foreground in a [`Mask`].
pub const FOREGROUND: u8 = 255;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new dimensions value.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of any `image` buffer.
    #[must_use]
    pub fn of<I: image::GenericImageView>(image: &I) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height }
    }

    /// Total number of pixels.
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Semantic role of a channel plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Senescence marker (red in the default ordering).
    Senescent,
    /// Quiescence marker (green in the default ordering).
    Quiescent,
    /// Nuclear stain used for segmentation (blue in the default ordering).
    Nuclear,
}

impl Role {
    /// All roles in canonical order.
    pub const ALL: [Self; 3] = [Self::Senescent, Self::Quiescent, Self::Nuclear];

    /// Zero-based canonical position, also the default channel index.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Senescent => 0,
            Self::Quiescent => 1,
            Self::Nuclear => 2,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Senescent => f.write_str("senescent"),
            Self::Quiescent => f.write_str("quiescent"),
            Self::Nuclear => f.write_str("nuclear"),
        }
    }
}

/// Three raw planes bound to their semantic roles.
///
/// All three planes are guaranteed to share identical dimensions; the
/// check happens once in [`ChannelTriple::new`].
#[derive(Debug, Clone)]
pub struct ChannelTriple {
    senescent: Plane,
    quiescent: Plane,
    nuclear: Plane,
}

impl ChannelTriple {
    /// Bind three planes to roles.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] if the quiescent or
    /// nuclear plane differs in size from the senescent plane, and
    /// [`PipelineError::EmptyPlane`] if the planes have zero area.
    pub fn new(senescent: Plane, quiescent: Plane, nuclear: Plane) -> Result<Self, PipelineError> {
        let expected = Dimensions::of(&senescent);
        if expected.pixel_count() == 0 {
            return Err(PipelineError::EmptyPlane);
        }
        for (role, plane) in [(Role::Quiescent, &quiescent), (Role::Nuclear, &nuclear)] {
            let actual = Dimensions::of(plane);
            if actual != expected {
                return Err(PipelineError::DimensionMismatch {
                    role,
                    expected,
                    actual,
                });
            }
        }
        Ok(Self {
            senescent,
            quiescent,
            nuclear,
        })
    }

    /// The plane bound to `role`.
    #[must_use]
    pub const fn get(&self, role: Role) -> &Plane {
        match role {
            Role::Senescent => &self.senescent,
            Role::Quiescent => &self.quiescent,
            Role::Nuclear => &self.nuclear,
        }
    }

    /// Shared dimensions of all three planes.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.nuclear)
    }
}

/// How the smoothed nuclear stain is binarized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ThresholdMethod {
    /// Otsu's method: the cutoff maximizing between-class variance.
    #[default]
    Otsu,
    /// A fixed level on normalized `[0, 1]` intensities.
    Fixed {
        /// Pixels strictly above this level are foreground.
        level: f32,
    },
}

/// Well-ring removal parameters, in native-resolution pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WellRingConfig {
    /// Mean-thresholded components larger than this are treated as
    /// vessel-edge artifacts and zeroed.
    pub ring_min_area: u64,

    /// After ring removal, retained regions smaller than this are zeroed
    /// too. This catches image corners cut off by the ring.
    pub keep_min_area: u64,
}

impl WellRingConfig {
    /// Default ring area (10 000 pixels on the default 4x working grid).
    pub const DEFAULT_RING_MIN_AREA: u64 = 160_000;
    /// Default keep area (20 000 pixels on the default 4x working grid).
    pub const DEFAULT_KEEP_MIN_AREA: u64 = 320_000;
}

impl Default for WellRingConfig {
    fn default() -> Self {
        Self {
            ring_min_area: Self::DEFAULT_RING_MIN_AREA,
            keep_min_area: Self::DEFAULT_KEEP_MIN_AREA,
        }
    }
}

/// Per-nucleus decision rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ClassificationRule {
    /// Senescent when the senescent-marker mean exceeds a fixed value.
    Absolute {
        /// Threshold in the units of the configured [`IntensitySource`].
        threshold: f32,
    },
    /// Senescent when the senescent-marker mean exceeds the same
    /// nucleus's quiescent-marker mean.
    #[default]
    Comparative,
}

/// Which intensities the classifier averages over each nucleus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntensitySource {
    /// Percentile-normalized `[0, 1]` values.
    #[default]
    Normalized,
    /// Block-averaged raw sample values (native units, e.g. 0..65535).
    Raw,
}

/// Configuration for the per-image pipeline.
///
/// Area parameters are given in native-resolution pixels and are divided
/// by `downscale_factor²` before being applied to the working grid.
/// Construct with struct-update syntax over [`PipelineConfig::default`]
/// and call [`validate`](Self::validate) before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Integer block-averaging factor applied along both axes.
    pub downscale_factor: u32,

    /// Percentile mapped to 0.0 during normalization.
    pub low_percentile: f32,

    /// Percentile mapped to 1.0 during normalization.
    pub high_percentile: f32,

    /// Gaussian sigma applied to the nuclear stain before thresholding.
    pub blur_sigma: f32,

    /// Binarization method for the nuclear stain.
    pub threshold: ThresholdMethod,

    /// Well-ring removal, or `None` to skip it.
    pub well_ring: Option<WellRingConfig>,

    /// Disk radius for the binary opening after thresholding. Divided
    /// by the downscale factor (integer division); 0 disables opening.
    pub opening_radius: u32,

    /// Background holes smaller than this are filled.
    pub hole_area: u64,

    /// Nuclei smaller than this are removed.
    pub min_area: u64,

    /// Nuclei larger than this are removed.
    pub max_area: u64,

    /// Decision rule for senescent vs quiescent.
    pub classification: ClassificationRule,

    /// Intensities used by the classifier.
    pub intensity_source: IntensitySource,
}

impl PipelineConfig {
    /// Default downscale factor.
    pub const DEFAULT_DOWNSCALE_FACTOR: u32 = 4;
    /// Default low normalization percentile.
    pub const DEFAULT_LOW_PERCENTILE: f32 = 1.0;
    /// Default high normalization percentile.
    pub const DEFAULT_HIGH_PERCENTILE: f32 = 98.0;
    /// Default nuclear-stain blur sigma.
    pub const DEFAULT_BLUR_SIGMA: f32 = 1.0;
    /// Default opening disk radius at native resolution.
    pub const DEFAULT_OPENING_RADIUS: u32 = 5;
    /// Default hole-fill area (500 pixels on the default 4x working grid).
    pub const DEFAULT_HOLE_AREA: u64 = 8_000;
    /// Default minimum nucleus area.
    pub const DEFAULT_MIN_AREA: u64 = 100;
    /// Default maximum nucleus area.
    pub const DEFAULT_MAX_AREA: u64 = 10_000;

    /// Check the invariants that the pipeline stages rely on.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] describing the first
    /// violated constraint.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.downscale_factor == 0 {
            return Err(PipelineError::InvalidConfig(
                "downscale_factor must be at least 1".to_string(),
            ));
        }
        let percentiles_ok = self.low_percentile.is_finite()
            && self.high_percentile.is_finite()
            && self.low_percentile >= 0.0
            && self.high_percentile <= 100.0
            && self.low_percentile < self.high_percentile;
        if !percentiles_ok {
            return Err(PipelineError::InvalidConfig(format!(
                "percentiles must satisfy 0 <= low < high <= 100, got low={} high={}",
                self.low_percentile, self.high_percentile,
            )));
        }
        if !self.blur_sigma.is_finite() {
            return Err(PipelineError::InvalidConfig(
                "blur_sigma must be finite".to_string(),
            ));
        }
        if let ThresholdMethod::Fixed { level } = self.threshold
            && !level.is_finite()
        {
            return Err(PipelineError::InvalidConfig(
                "fixed threshold level must be finite".to_string(),
            ));
        }
        if let ClassificationRule::Absolute { threshold } = self.classification
            && !threshold.is_finite()
        {
            return Err(PipelineError::InvalidConfig(
                "classification threshold must be finite".to_string(),
            ));
        }
        if self.min_area == 0 {
            return Err(PipelineError::InvalidConfig(
                "min_area must be positive".to_string(),
            ));
        }
        if self.min_area > self.max_area {
            return Err(PipelineError::InvalidConfig(format!(
                "min_area ({}) exceeds max_area ({})",
                self.min_area, self.max_area,
            )));
        }
        if let Some(ring) = self.well_ring
            && ring.ring_min_area == 0
        {
            return Err(PipelineError::InvalidConfig(
                "well_ring.ring_min_area must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            downscale_factor: Self::DEFAULT_DOWNSCALE_FACTOR,
            low_percentile: Self::DEFAULT_LOW_PERCENTILE,
            high_percentile: Self::DEFAULT_HIGH_PERCENTILE,
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            threshold: ThresholdMethod::default(),
            well_ring: Some(WellRingConfig::default()),
            opening_radius: Self::DEFAULT_OPENING_RADIUS,
            hole_area: Self::DEFAULT_HOLE_AREA,
            min_area: Self::DEFAULT_MIN_AREA,
            max_area: Self::DEFAULT_MAX_AREA,
            classification: ClassificationRule::default(),
            intensity_source: IntensitySource::default(),
        }
    }
}

/// Errors that can occur during pipeline processing.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A channel plane does not match the others in size.
    #[error("{role} channel is {actual}, expected {expected}")]
    DimensionMismatch {
        /// Role of the offending plane.
        role: Role,
        /// Dimensions of the senescent plane.
        expected: Dimensions,
        /// Dimensions of the offending plane.
        actual: Dimensions,
    },

    /// The channel planes have zero area.
    #[error("channel planes are empty")]
    EmptyPlane,

    /// The image is smaller than one downscale block.
    #[error("image {dimensions} is smaller than downscale factor {factor}")]
    ImageTooSmall {
        /// Native image dimensions.
        dimensions: Dimensions,
        /// Requested downscale factor.
        factor: u32,
    },

    /// Channel roles could not be bound to planes.
    #[error("invalid channel assignment: {0}")]
    InvalidChannels(String),

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn plane(w: u32, h: u32) -> Plane {
        Plane::new(w, h)
    }

    // --- Dimensions tests ---

    #[test]
    fn dimensions_of_image() {
        let d = Dimensions::of(&plane(7, 3));
        assert_eq!(d, Dimensions::new(7, 3));
        assert_eq!(d.pixel_count(), 21);
        assert_eq!(d.to_string(), "7x3");
    }

    // --- ChannelTriple tests ---

    #[test]
    fn triple_accepts_matching_planes() {
        let triple = ChannelTriple::new(plane(4, 5), plane(4, 5), plane(4, 5)).unwrap();
        assert_eq!(triple.dimensions(), Dimensions::new(4, 5));
        for role in Role::ALL {
            assert_eq!(Dimensions::of(triple.get(role)), Dimensions::new(4, 5));
        }
    }

    #[test]
    fn triple_rejects_mismatched_nuclear_plane() {
        let result = ChannelTriple::new(plane(4, 5), plane(4, 5), plane(5, 4));
        assert!(matches!(
            result,
            Err(PipelineError::DimensionMismatch {
                role: Role::Nuclear,
                ..
            })
        ));
    }

    #[test]
    fn triple_rejects_empty_planes() {
        let result = ChannelTriple::new(plane(0, 0), plane(0, 0), plane(0, 0));
        assert!(matches!(result, Err(PipelineError::EmptyPlane)));
    }

    // --- PipelineConfig tests ---

    #[test]
    fn pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.downscale_factor, 4);
        assert!((config.low_percentile - 1.0).abs() < f32::EPSILON);
        assert!((config.high_percentile - 98.0).abs() < f32::EPSILON);
        assert_eq!(config.threshold, ThresholdMethod::Otsu);
        assert_eq!(config.well_ring, Some(WellRingConfig::default()));
        assert_eq!(config.classification, ClassificationRule::Comparative);
        assert_eq!(config.intensity_source, IntensitySource::Normalized);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_factor() {
        let config = PipelineConfig {
            downscale_factor: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_rejects_inverted_area_bounds() {
        let config = PipelineConfig {
            min_area: 500,
            max_area: 100,
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid pipeline configuration: min_area (500) exceeds max_area (100)",
        );
    }

    #[test]
    fn validate_rejects_inverted_percentiles() {
        let config = PipelineConfig {
            low_percentile: 99.0,
            high_percentile: 1.0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_nan_fixed_level() {
        let config = PipelineConfig {
            threshold: ThresholdMethod::Fixed { level: f32::NAN },
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_json_uses_tagged_enums() {
        let config = PipelineConfig {
            threshold: ThresholdMethod::Fixed { level: 0.4 },
            classification: ClassificationRule::Absolute { threshold: 300.0 },
            intensity_source: IntensitySource::Raw,
            well_ring: None,
            ..PipelineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""method":"fixed""#), "{json}");
        assert!(json.contains(r#""rule":"absolute""#), "{json}");
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn config_json_rejects_unknown_threshold_method() {
        let json = r#"{"threshold": {"method": "triangle"}}"#;
        assert!(serde_json::from_str::<PipelineConfig>(json).is_err());
    }

    #[test]
    fn partial_config_json_fills_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"min_area": 50}"#).unwrap();
        assert_eq!(config.min_area, 50);
        assert_eq!(config.max_area, PipelineConfig::DEFAULT_MAX_AREA);
    }

    // --- PipelineError tests ---

    #[test]
    fn error_dimension_mismatch_display() {
        let err = PipelineError::DimensionMismatch {
            role: Role::Quiescent,
            expected: Dimensions::new(10, 10),
            actual: Dimensions::new(8, 10),
        };
        assert_eq!(err.to_string(), "quiescent channel is 8x10, expected 10x10");
    }

    #[test]
    fn error_too_small_display() {
        let err = PipelineError::ImageTooSmall {
            dimensions: Dimensions::new(3, 3),
            factor: 4,
        };
        assert_eq!(
            err.to_string(),
            "image 3x3 is smaller than downscale factor 4"
        );
    }
}
