//! senoquant-io: Filesystem I/O and batch execution.
//!
//! Everything that touches disk lives here: run configuration loading,
//! image discovery, channel-container decoding, output directory layout,
//! and the parallel batch runner that feeds the single results-table
//! writer. The pure pipeline and the serializers it drives live in
//! `senoquant-pipeline` and `senoquant-export`.

use std::path::PathBuf;

pub mod batch;
pub mod config;
pub mod discover;
pub mod output;
pub mod tiff_source;

pub use batch::{
    AnalyzedImage, BatchReport, ImageFailure, ImageWarning, analyze_file, run, run_with,
};
pub use config::{ConfigError, RunConfig};
pub use discover::discover_images;
pub use output::{RUN_PARAMETERS, RunOutput, run_dir_name};
pub use tiff_source::{ChannelSource, ChannelStack, TiffChannelSource};

/// Errors raised while reading inputs or writing results.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// The run configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A directory could not be scanned.
    #[error("failed to read directory {}: {source}", path.display())]
    ReadDir {
        /// Directory being scanned.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A channel container could not be opened.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        /// File being opened.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The TIFF decoder rejected the file.
    #[error("failed to decode TIFF {}: {source}", path.display())]
    Tiff {
        /// File being decoded.
        path: PathBuf,
        /// Underlying decoder error.
        source: tiff::TiffError,
    },

    /// The container uses a layout or sample type we do not read.
    #[error("unsupported image layout in {}: {detail}", path.display())]
    Unsupported {
        /// File being decoded.
        path: PathBuf,
        /// What was found.
        detail: String,
    },

    /// An output file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// File being written.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The pipeline rejected the image.
    #[error(transparent)]
    Pipeline(#[from] senoquant_pipeline::PipelineError),

    /// Result serialization failed.
    #[error(transparent)]
    Export(#[from] senoquant_export::ExportError),

    /// JSON serialization of run metadata failed.
    #[error("failed to serialize run parameters: {0}")]
    Json(#[from] serde_json::Error),

    /// The worker pool could not be built.
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// The results-table writer thread panicked.
    #[error("results writer thread panicked")]
    WriterPanicked,
}
