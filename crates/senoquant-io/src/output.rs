//! Output directory layout.
//!
//! Every run writes into a fresh timestamped directory under the source
//! directory:
//!
//! ```text
//! <source>/Results_<YYYY-MM-DD HH-MM-SS>/
//!     run_parameters.json
//!     Senolysis_measures.csv
//!     <base>.png
//!     <base>_senescent.png     (optional)
//!     <base>_quiescent.png     (optional)
//! ```

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use senoquant_export::{
    ArtifactNames, RESULTS_TABLE, ResultsTable, encode_mask_png, encode_overlay_png,
};
use senoquant_pipeline::ImageAnalysis;

use crate::{IoError, RunConfig};

/// File name of the serialized run configuration.
pub const RUN_PARAMETERS: &str = "run_parameters.json";

/// Name of the run directory for a run started at `started`.
#[must_use]
pub fn run_dir_name(started: NaiveDateTime) -> String {
    started.format("Results_%Y-%m-%d %H-%M-%S").to_string()
}

/// A created run directory.
#[derive(Debug, Clone)]
pub struct RunOutput {
    dir: PathBuf,
}

impl RunOutput {
    /// Create the run directory under `source_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Write`] if the directory cannot be created.
    pub fn create(source_dir: &Path, started: NaiveDateTime) -> Result<Self, IoError> {
        let dir = source_dir.join(run_dir_name(started));
        std::fs::create_dir_all(&dir).map_err(|source| IoError::Write {
            path: dir.clone(),
            source,
        })?;
        tracing::info!(dir = %dir.display(), "created run directory");
        Ok(Self { dir })
    }

    /// The run directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `run_parameters.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Json`] or [`IoError::Write`] on failure.
    pub fn write_parameters(&self, config: &RunConfig) -> Result<PathBuf, IoError> {
        let json = serde_json::to_string_pretty(config)?;
        let path = self.dir.join(RUN_PARAMETERS);
        write_file(&path, json.as_bytes())?;
        Ok(path)
    }

    /// Create the results table with its header row.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Write`] if the file cannot be created and
    /// [`IoError::Export`] if the header cannot be written.
    pub fn open_table(&self) -> Result<ResultsTable<BufWriter<File>>, IoError> {
        let path = self.dir.join(RESULTS_TABLE);
        let file = File::create(&path).map_err(|source| IoError::Write { path, source })?;
        Ok(ResultsTable::new(BufWriter::new(file))?)
    }

    /// Write the overlay, and the class masks when `export_masks` is set,
    /// for the image whose file stem is `base`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Export`] if encoding fails and
    /// [`IoError::Write`] if a file cannot be written.
    pub fn write_artifacts(
        &self,
        base: &str,
        analysis: &ImageAnalysis,
        export_masks: bool,
    ) -> Result<(), IoError> {
        let names = ArtifactNames::for_image(base);
        write_file(
            &self.dir.join(&names.overlay),
            &encode_overlay_png(&analysis.overlay)?,
        )?;
        if export_masks {
            write_file(
                &self.dir.join(&names.senescent),
                &encode_mask_png(&analysis.senescent)?,
            )?;
            write_file(
                &self.dir.join(&names.quiescent),
                &encode_mask_png(&analysis.quiescent)?,
            )?;
        }
        Ok(())
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), IoError> {
    std::fs::write(path, bytes).map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })
}
