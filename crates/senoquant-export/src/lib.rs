//! senoquant-export: Pure result serializers (sans-IO)
//!
//! Converts per-image analysis results into their on-disk formats:
//! results-table rows (CSV) and PNG artifacts. Nothing here touches the
//! filesystem; callers supply an [`std::io::Write`] sink or receive
//! bytes.

pub mod raster;
pub mod table;

pub use raster::{ArtifactNames, encode_mask_png, encode_overlay_png};
pub use table::{RESULTS_TABLE, ResultsTable, TableRow, to_csv};

/// Errors that can occur while serializing results.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// PNG encoding failed.
    #[error("PNG encoding failed: {0}")]
    PngEncode(#[from] image::ImageError),

    /// CSV serialization failed.
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    /// Flushing the underlying sink failed.
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}
