//! senoquant-pipeline: Pure nucleus segmentation and classification
//! pipeline (sans-IO).
//!
//! Turns three fluorescence channels into senescent and quiescent
//! nucleus masks through:
//! channel resolution -> percentile normalization -> downscaling ->
//! blur -> well-ring removal -> thresholding -> opening -> hole
//! filling -> size filtering -> classification -> statistics ->
//! overlay rendering.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! planes and returns structured data. Filesystem access, container
//! decoding, and result persistence live in `senoquant-io`.

pub mod blur;
pub mod channels;
pub mod classify;
pub mod components;
pub mod detect;
pub mod downsample;
pub mod morphology;
pub mod normalize;
pub mod pipeline;
pub mod render;
pub mod stats;
pub mod threshold;
pub mod types;

pub use channels::{ChannelAliases, ChannelIndices, ChannelMode, ResolutionWarning, Resolved};
pub use classify::{Classification, NucleusClass, NucleusObject};
pub use detect::DetectionWarning;
pub use pipeline::{ImageAnalysis, Pipeline};
pub use stats::{ClassStats, ImageRecord, ImageSummary, Ratio};
pub use types::{
    ChannelTriple, ClassificationRule, Dimensions, FloatPlane, IntensitySource, Mask,
    PipelineConfig, PipelineError, Plane, Role, ThresholdMethod, WellRingConfig,
};

/// Run the full analysis pipeline on one image.
///
/// # Pipeline steps
///
/// 1. Validate `config`
/// 2. Percentile-normalize each channel at native resolution
/// 3. Block-average every channel down by `downscale_factor`
/// 4. Gaussian blur of the nuclear stain
/// 5. Optional well-ring removal
/// 6. Otsu or fixed threshold
/// 7. Binary opening, hole filling, size filtering
/// 8. Per-nucleus classification
/// 9. Upscale class masks, measure, and render the overlay
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails
/// validation and [`PipelineError::ImageTooSmall`] if the image is
/// smaller than one downscale block.
pub fn process(triple: ChannelTriple, config: &PipelineConfig) -> Result<ImageAnalysis, PipelineError> {
    Ok(Pipeline::new(triple, config.clone())
        .preprocess()?
        .detect()
        .classify()
        .into_result())
}
