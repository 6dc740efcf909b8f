//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::process`] which runs every stage in one call,
//! [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use senoquant_pipeline::{ChannelTriple, Pipeline, PipelineConfig, PipelineError};
//! # fn run(triple: ChannelTriple) -> Result<(), PipelineError> {
//! let analysis = Pipeline::new(triple, PipelineConfig::default())
//!     .preprocess()?
//!     .detect()
//!     .classify()
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state,
//! carrying the raw channels and their intensity windows forward so the
//! final stage can render at native resolution with the same
//! normalization the analysis used.

use crate::blur::gaussian_blur;
use crate::classify::{self, Classification, MarkerPlanes, NucleusObject};
use crate::detect::{self, Detection, DetectionWarning};
use crate::downsample::downscale_mean;
use crate::normalize::Window;
use crate::render;
use crate::stats::ImageSummary;
use crate::types::{
    ChannelTriple, Dimensions, FloatPlane, IntensitySource, Mask, PipelineConfig, PipelineError,
    RgbImage, Role,
};

/// Working-grid planes indexed by [`Role::index`].
type RolePlanes = [FloatPlane; 3];

/// Native-resolution intensity windows indexed by [`Role::index`].
type RoleWindows = [Window; 3];

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
#[must_use = "pipeline stages are consumed by advancing; call .preprocess() to continue"]
pub struct Pending {
    config: PipelineConfig,
    triple: ChannelTriple,
}

impl Pending {
    /// The input channels.
    #[must_use]
    pub const fn triple(&self) -> &ChannelTriple {
        &self.triple
    }

    /// Normalize, downscale, and smooth, advancing to [`Preprocessed`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the configuration
    /// fails validation and [`PipelineError::ImageTooSmall`] if the
    /// image is smaller than the downscale factor.
    pub fn preprocess(self) -> Result<Preprocessed, PipelineError> {
        self.config.validate()?;
        let factor = self.config.downscale_factor;
        let (low, high) = (self.config.low_percentile, self.config.high_percentile);

        let windows: RoleWindows = Role::ALL.map(|role| Window::of(self.triple.get(role), low, high));
        let mut normalized = Vec::with_capacity(3);
        let mut raw = Vec::with_capacity(3);
        for role in Role::ALL {
            let plane = self.triple.get(role);
            normalized.push(downscale_mean(&windows[role.index()].normalize(plane), factor)?);
            raw.push(downscale_mean(plane, factor)?);
        }
        let normalized: RolePlanes = into_role_planes(normalized)?;
        let raw: RolePlanes = into_role_planes(raw)?;

        let smoothed = gaussian_blur(&normalized[Role::Nuclear.index()], self.config.blur_sigma);
        let working = Dimensions::of(&smoothed);
        tracing::debug!(native = %self.triple.dimensions(), %working, "preprocessed");

        Ok(Preprocessed {
            config: self.config,
            triple: self.triple,
            windows,
            normalized,
            raw,
            smoothed,
        })
    }
}

fn into_role_planes(planes: Vec<FloatPlane>) -> Result<RolePlanes, PipelineError> {
    <RolePlanes>::try_from(planes).map_err(|v| {
        PipelineError::InvalidChannels(format!("expected 3 planes, found {}", v.len()))
    })
}

// ───────────────────────── Stage 1: Preprocessed ─────────────────────

/// Pipeline state after normalization, downscaling, and smoothing.
#[must_use = "pipeline stages are consumed by advancing; call .detect() to continue"]
pub struct Preprocessed {
    config: PipelineConfig,
    triple: ChannelTriple,
    windows: RoleWindows,
    normalized: RolePlanes,
    raw: RolePlanes,
    smoothed: FloatPlane,
}

impl Preprocessed {
    /// Percentile window of `role`, computed at native resolution.
    #[must_use]
    pub const fn window(&self, role: Role) -> Window {
        self.windows[role.index()]
    }

    /// Normalized working-grid plane for `role`.
    #[must_use]
    pub const fn normalized(&self, role: Role) -> &FloatPlane {
        &self.normalized[role.index()]
    }

    /// Raw (block-averaged, unnormalized) working-grid plane for `role`.
    #[must_use]
    pub const fn raw(&self, role: Role) -> &FloatPlane {
        &self.raw[role.index()]
    }

    /// Smoothed nuclear plane that detection runs on.
    #[must_use]
    pub const fn smoothed(&self) -> &FloatPlane {
        &self.smoothed
    }

    /// Run nucleus detection, advancing to [`Detected`].
    pub fn detect(self) -> Detected {
        let Detection { mask, warning } = detect::detect_nuclei(&self.smoothed, &self.config);
        Detected {
            config: self.config,
            triple: self.triple,
            windows: self.windows,
            normalized: self.normalized,
            raw: self.raw,
            mask,
            warning,
        }
    }
}

// ───────────────────────── Stage 2: Detected ─────────────────────────

/// Pipeline state after nucleus detection.
#[must_use = "pipeline stages are consumed by advancing; call .classify() to continue"]
pub struct Detected {
    config: PipelineConfig,
    triple: ChannelTriple,
    windows: RoleWindows,
    normalized: RolePlanes,
    raw: RolePlanes,
    mask: Mask,
    warning: Option<DetectionWarning>,
}

impl Detected {
    /// Working-grid nucleus mask.
    #[must_use]
    pub const fn mask(&self) -> &Mask {
        &self.mask
    }

    /// Set when the threshold result was discarded.
    #[must_use]
    pub const fn warning(&self) -> Option<DetectionWarning> {
        self.warning
    }

    /// Classify every detected nucleus, advancing to [`Classified`].
    pub fn classify(self) -> Classified {
        let planes = match self.config.intensity_source {
            IntensitySource::Normalized => &self.normalized,
            IntensitySource::Raw => &self.raw,
        };
        let markers = MarkerPlanes {
            senescent: &planes[Role::Senescent.index()],
            quiescent: &planes[Role::Quiescent.index()],
            nuclear: &planes[Role::Nuclear.index()],
        };
        let classification = classify::classify(&self.mask, markers, self.config.classification);
        Classified {
            config: self.config,
            triple: self.triple,
            windows: self.windows,
            mask: self.mask,
            warning: self.warning,
            classification,
        }
    }
}

// ───────────────────────── Stage 3: Classified ───────────────────────

/// Pipeline state after classification.
#[must_use = "pipeline stages are consumed by advancing; call .into_result() to finish"]
pub struct Classified {
    config: PipelineConfig,
    triple: ChannelTriple,
    windows: RoleWindows,
    mask: Mask,
    warning: Option<DetectionWarning>,
    classification: Classification,
}

impl Classified {
    /// Working-grid classification.
    #[must_use]
    pub const fn classification(&self) -> &Classification {
        &self.classification
    }

    /// Measure, upscale, and render, consuming the pipeline.
    ///
    /// Statistics come from the working-grid class masks with areas in
    /// native pixels, so counts agree with [`ImageAnalysis::objects`].
    /// The upscaled masks are only drawn and exported.
    #[must_use]
    pub fn into_result(self) -> ImageAnalysis {
        let dimensions = self.triple.dimensions();
        let working_dimensions = Dimensions::of(&self.mask);
        let factor = u64::from(self.config.downscale_factor);
        let summary = ImageSummary::measure(
            &self.classification.senescent,
            &self.classification.quiescent,
            factor * factor,
        );
        let senescent =
            render::upscale_mask(&self.classification.senescent, dimensions.width, dimensions.height);
        let quiescent =
            render::upscale_mask(&self.classification.quiescent, dimensions.width, dimensions.height);
        let composite = render::composite(&self.triple, &self.windows);
        let overlay = render::overlay(&composite, &senescent, &quiescent);
        ImageAnalysis {
            dimensions,
            working_dimensions,
            senescent,
            quiescent,
            objects: self.classification.objects,
            summary,
            overlay,
            warning: self.warning,
        }
    }
}

// ───────────────────────── Result ────────────────────────────────────

/// Everything produced for one image.
#[derive(Debug, Clone)]
pub struct ImageAnalysis {
    /// Native dimensions of the source channels.
    pub dimensions: Dimensions,
    /// Dimensions of the downscaled working grid.
    pub working_dimensions: Dimensions,
    /// Senescent mask at native resolution.
    pub senescent: Mask,
    /// Quiescent mask at native resolution.
    pub quiescent: Mask,
    /// Per-nucleus measurements on the working grid.
    pub objects: Vec<NucleusObject>,
    /// Counts and sizes from the working-grid masks, areas in native pixels.
    pub summary: ImageSummary,
    /// Composite with class boundaries drawn.
    pub overlay: RgbImage,
    /// Recoverable detection problem, if any.
    pub warning: Option<DetectionWarning>,
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental nucleus analysis pipeline.
///
/// Each stage method consumes the current state and returns the next,
/// making it a compile-time error to skip stages or call them out of
/// order.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline. No processing is performed until
    /// [`.preprocess()`](Pending::preprocess) is called.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(triple: ChannelTriple, config: PipelineConfig) -> Pending {
        Pending { config, triple }
    }
}
