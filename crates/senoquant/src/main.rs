//! senoquant: batch classification of senescent and quiescent nuclei.
//!
//! Scans a directory of three-channel fluorescence images, segments the
//! nuclei in each, classifies every nucleus by its marker intensities,
//! and writes an annotated overlay per image plus one results table per
//! run into `<SOURCE_DIR>/Results_<timestamp>/`.
//!
//! # Usage
//!
//! ```text
//! senoquant [OPTIONS] <SOURCE_DIR>
//! senoquant --config run.json
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use senoquant_io::RunConfig;
use senoquant_pipeline::{
    ChannelAliases, ChannelIndices, ChannelMode, ClassificationRule, IntensitySource,
    PipelineConfig, ThresholdMethod, WellRingConfig,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Classify senescent and quiescent nuclei in fluorescence microscopy images.
#[derive(Parser)]
#[command(name = "senoquant", version)]
struct Cli {
    /// Directory scanned recursively for input images. Overrides
    /// `source_dir` from a JSON config.
    source_dir: Option<PathBuf>,

    /// Input file extension (`tif` also matches `tiff`).
    #[arg(long, default_value = RunConfig::DEFAULT_EXTENSION)]
    extension: String,

    /// Plane index of the senescence marker.
    #[arg(long, default_value_t = 0)]
    senescent_channel: usize,

    /// Plane index of the quiescence marker.
    #[arg(long, default_value_t = 1)]
    quiescent_channel: usize,

    /// Plane index of the nuclear stain.
    #[arg(long, default_value_t = 2)]
    nuclear_channel: usize,

    /// Resolve channels by their metadata names instead of by index.
    #[arg(long)]
    match_names: bool,

    /// Block-averaging factor for the working grid.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_DOWNSCALE_FACTOR, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    downscale_factor: u32,

    /// Lower normalization percentile.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_LOW_PERCENTILE)]
    low_percentile: f32,

    /// Upper normalization percentile.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_HIGH_PERCENTILE)]
    high_percentile: f32,

    /// Gaussian blur sigma on the working grid.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BLUR_SIGMA)]
    blur_sigma: f32,

    /// Fixed threshold on normalized intensity (default: Otsu).
    #[arg(long)]
    fixed_threshold: Option<f32>,

    /// Disable well-ring artifact removal.
    #[arg(long)]
    no_well_ring: bool,

    /// Components larger than this (native pixels) are well-ring artifacts.
    #[arg(long, default_value_t = WellRingConfig::DEFAULT_RING_MIN_AREA)]
    ring_min_area: u64,

    /// Regions left after ring removal smaller than this (native pixels)
    /// are cleared.
    #[arg(long, default_value_t = WellRingConfig::DEFAULT_KEEP_MIN_AREA)]
    keep_min_area: u64,

    /// Opening disk radius in native pixels.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_OPENING_RADIUS)]
    opening_radius: u32,

    /// Largest hole (native pixels) filled inside a nucleus.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_HOLE_AREA)]
    hole_area: u64,

    /// Smallest retained nucleus area in native pixels.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MIN_AREA)]
    min_area: u64,

    /// Largest retained nucleus area in native pixels.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MAX_AREA)]
    max_area: u64,

    /// Call a nucleus senescent when its senescence-marker mean exceeds
    /// this value (default: compare against the quiescence marker).
    #[arg(long)]
    senescence_threshold: Option<f32>,

    /// Classify on block-averaged raw intensities instead of normalized ones.
    #[arg(long)]
    raw_intensity: bool,

    /// Also write senescent and quiescent masks as PNG.
    #[arg(long)]
    export_masks: bool,

    /// Worker threads.
    #[arg(long, default_value_t = RunConfig::default_jobs(), value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    jobs: usize,

    /// Run configuration JSON file.
    ///
    /// When provided, all other parameter flags are ignored.
    #[arg(long, conflicts_with = "config_json")]
    config: Option<PathBuf>,

    /// Full run configuration as a JSON string.
    ///
    /// When provided, all other parameter flags are ignored.
    /// The JSON must be a valid `RunConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,
}

/// Build a [`RunConfig`] from CLI arguments.
///
/// A JSON config (`--config` or `--config-json`) replaces every
/// parameter flag; only the positional source directory still applies.
fn config_from_cli(cli: &Cli) -> Result<RunConfig, String> {
    let from_json = if let Some(ref path) = cli.config {
        Some(RunConfig::from_json_file(path).map_err(|e| format!("Error loading --config: {e}"))?)
    } else if let Some(ref json) = cli.config_json {
        Some(RunConfig::from_json(json).map_err(|e| format!("Error parsing --config-json: {e}"))?)
    } else {
        None
    };

    if let Some(mut config) = from_json {
        if let Some(ref dir) = cli.source_dir {
            config.source_dir.clone_from(dir);
        }
        return Ok(config);
    }

    let source_dir = cli
        .source_dir
        .clone()
        .ok_or("A source directory is required unless --config or --config-json is given")?;

    let channels = if cli.match_names {
        ChannelMode::Names(ChannelAliases::default())
    } else {
        ChannelMode::Indices(ChannelIndices {
            senescent: cli.senescent_channel,
            quiescent: cli.quiescent_channel,
            nuclear: cli.nuclear_channel,
        })
    };

    Ok(RunConfig {
        source_dir,
        extension: cli.extension.clone(),
        channels,
        pipeline: PipelineConfig {
            downscale_factor: cli.downscale_factor,
            low_percentile: cli.low_percentile,
            high_percentile: cli.high_percentile,
            blur_sigma: cli.blur_sigma,
            threshold: cli
                .fixed_threshold
                .map_or(ThresholdMethod::Otsu, |level| ThresholdMethod::Fixed { level }),
            well_ring: (!cli.no_well_ring).then_some(WellRingConfig {
                ring_min_area: cli.ring_min_area,
                keep_min_area: cli.keep_min_area,
            }),
            opening_radius: cli.opening_radius,
            hole_area: cli.hole_area,
            min_area: cli.min_area,
            max_area: cli.max_area,
            classification: cli
                .senescence_threshold
                .map_or(ClassificationRule::Comparative, |threshold| {
                    ClassificationRule::Absolute { threshold }
                }),
            intensity_source: if cli.raw_intensity {
                IntensitySource::Raw
            } else {
                IntensitySource::Normalized
            },
        },
        export_masks: cli.export_masks,
        jobs: cli.jobs,
    })
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(?config, "run configuration");

    let report = match senoquant_io::run(&config) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "Processed {}/{} images in {:.1} minutes; results in {}",
        report.records.len(),
        report.total,
        report.elapsed.as_secs_f64() / 60.0,
        report.output_dir.display(),
    );
    if !report.warnings.is_empty() {
        eprintln!("{} warning(s):", report.warnings.len());
        for warning in &report.warnings {
            eprintln!("  {warning}");
        }
    }

    if report.is_success() {
        return ExitCode::SUCCESS;
    }

    eprintln!("{} image(s) failed:", report.failures.len());
    for failure in &report.failures {
        eprintln!("  {failure}");
    }
    ExitCode::FAILURE
}
