//! Run configuration: what to process and how.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use senoquant_pipeline::{ChannelMode, PipelineConfig, PipelineError};
use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating a [`RunConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The configuration JSON is malformed or has unknown fields.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The source directory does not exist or is not a directory.
    #[error("source directory {} does not exist", .0.display())]
    MissingSourceDir(PathBuf),

    /// No file extension was configured.
    #[error("file extension must not be empty")]
    EmptyExtension,

    /// `jobs` is outside `1..=available`.
    #[error("jobs must be between 1 and {available}, got {jobs}")]
    InvalidJobs {
        /// Requested worker count.
        jobs: usize,
        /// Available hardware parallelism.
        available: usize,
    },

    /// The pipeline section failed validation.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Complete configuration for one batch run.
///
/// Serialized verbatim into `run_parameters.json` in the output
/// directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Directory scanned recursively for input images.
    #[serde(default)]
    pub source_dir: PathBuf,

    /// Input file extension, without the dot. `tif` also matches `tiff`.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// How planes are bound to channel roles.
    #[serde(default)]
    pub channels: ChannelMode,

    /// Per-image pipeline parameters.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Also write the senescent and quiescent masks as PNG.
    #[serde(default)]
    pub export_masks: bool,

    /// Worker threads in the batch pool.
    #[serde(default = "RunConfig::default_jobs")]
    pub jobs: usize,
}

fn default_extension() -> String {
    RunConfig::DEFAULT_EXTENSION.to_string()
}

impl RunConfig {
    /// Default input extension.
    pub const DEFAULT_EXTENSION: &str = "tif";

    /// A configuration for `source_dir` with every other field at its
    /// default.
    #[must_use]
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            extension: default_extension(),
            channels: ChannelMode::default(),
            pipeline: PipelineConfig::default(),
            export_masks: false,
            jobs: Self::default_jobs(),
        }
    }

    /// Hardware parallelism, or 1 when it cannot be determined.
    #[must_use]
    pub fn default_jobs() -> usize {
        std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
    }

    /// Parse a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed JSON or unknown
    /// fields.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not a valid configuration.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Check the whole configuration before any image is touched.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;

        if self.extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::EmptyExtension);
        }

        let available = Self::default_jobs();
        if !(1..=available).contains(&self.jobs) {
            return Err(ConfigError::InvalidJobs {
                jobs: self.jobs,
                available,
            });
        }

        if !self.source_dir.is_dir() {
            return Err(ConfigError::MissingSourceDir(self.source_dir.clone()));
        }

        Ok(())
    }
}
