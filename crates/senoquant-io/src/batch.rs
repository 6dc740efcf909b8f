//! Parallel batch runner.
//!
//! Images are independent tasks on a rayon pool sized by
//! [`RunConfig::jobs`]. Each task reads, analyzes, and writes its own
//! PNG artifacts, then sends its outcome over a channel to one writer
//! thread, which is the only code that touches the results table. A
//! panic inside a task is caught and reported as that image's failure;
//! the remaining images still run.
//!
//! After each image the log shows how many are done and an estimate of
//! the time left, from the mean wall time per finished image so far.

use std::any::Any;
use std::fmt;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};
use rayon::prelude::*;
use senoquant_export::ResultsTable;
use senoquant_pipeline::{ImageRecord, process};

use crate::{ChannelSource, IoError, RunConfig, RunOutput, TiffChannelSource, discover_images};

/// An image that could not be analyzed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFailure {
    /// Source file.
    pub path: PathBuf,
    /// Human-readable cause.
    pub message: String,
}

impl fmt::Display for ImageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

/// A recoverable problem with an image that was still analyzed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageWarning {
    /// Source file.
    pub path: PathBuf,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for ImageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

/// Result of [`analyze_file`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedImage {
    /// The results-table row.
    pub record: ImageRecord,
    /// Channel-resolution and detection warnings, already logged once
    /// with the file path.
    pub warnings: Vec<String>,
}

/// Summary of a finished batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// The run directory results were written to.
    pub output_dir: PathBuf,
    /// Images discovered.
    pub total: usize,
    /// Rows written to the results table, in completion order.
    pub records: Vec<ImageRecord>,
    /// Images that failed, in completion order.
    pub failures: Vec<ImageFailure>,
    /// Warnings from images that were analyzed, in completion order.
    pub warnings: Vec<ImageWarning>,
    /// Wall time spent analyzing images.
    pub elapsed: Duration,
}

impl BatchReport {
    /// Whether every discovered image produced a row.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

enum Outcome {
    Done {
        path: PathBuf,
        analyzed: AnalyzedImage,
    },
    Failed(ImageFailure),
}

#[derive(Default)]
struct Collected {
    records: Vec<ImageRecord>,
    failures: Vec<ImageFailure>,
    warnings: Vec<ImageWarning>,
}

/// Time left if the unfinished images take as long, on average, as the
/// finished ones did.
#[allow(clippy::cast_precision_loss)]
fn estimate_remaining(elapsed: Duration, done: usize, total: usize) -> Duration {
    if done == 0 {
        return Duration::ZERO;
    }
    let left = total.saturating_sub(done);
    elapsed.mul_f64(left as f64 / done as f64)
}

/// Shared completion counter for the pool.
struct Progress {
    total: usize,
    done: AtomicUsize,
    started: Instant,
}

impl Progress {
    fn new(total: usize) -> Self {
        Self {
            total,
            done: AtomicUsize::new(0),
            started: Instant::now(),
        }
    }

    fn finished(&self, path: &Path, took: Duration) {
        let n = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let remaining = estimate_remaining(self.started.elapsed(), n, self.total);
        tracing::info!(
            "[{n}/{}] {} ({:.2}s), about {:.1} min remaining",
            self.total,
            path.display(),
            took.as_secs_f64(),
            remaining.as_secs_f64() / 60.0
        );
    }
}

/// Analyze one file and write its PNG artifacts.
///
/// The returned record is named after the file name; artifacts are
/// named after the file stem. Each warning is logged here, once, with
/// the path.
///
/// # Errors
///
/// Returns [`IoError`] if the file cannot be decoded, its channels
/// cannot be resolved, the pipeline rejects it, or an artifact cannot
/// be written.
pub fn analyze_file<S: ChannelSource + ?Sized>(
    source: &S,
    path: &Path,
    config: &RunConfig,
    output: &RunOutput,
) -> Result<AnalyzedImage, IoError> {
    let stack = source.read_channels(path)?;
    let resolved = config.channels.resolve(stack.planes, &stack.names)?;
    let resolution_warning = resolved.warning.map(|w| w.to_string());

    let analysis = process(resolved.triple, &config.pipeline)?;
    let warnings: Vec<String> = resolution_warning
        .into_iter()
        .chain(analysis.warning.map(|w| w.to_string()))
        .collect();
    for warning in &warnings {
        tracing::warn!(path = %path.display(), "{warning}");
    }

    let base = path
        .file_stem()
        .map_or_else(|| "image".into(), |s| s.to_string_lossy());
    output.write_artifacts(&base, &analysis, config.export_masks)?;

    let image = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned());
    Ok(AnalyzedImage {
        record: ImageRecord {
            image,
            summary: analysis.summary,
        },
        warnings,
    })
}

/// Run a batch over `config.source_dir` with TIFF input, timestamped
/// now.
///
/// # Errors
///
/// See [`run_with`].
pub fn run(config: &RunConfig) -> Result<BatchReport, IoError> {
    run_with(config, &TiffChannelSource, Local::now().naive_local())
}

/// Run a batch reading channels through `source`, with the run
/// directory named after `started`.
///
/// Per-image problems are collected into [`BatchReport::failures`] and
/// do not abort the run.
///
/// # Errors
///
/// Returns [`IoError::Config`] if `config` is invalid, and other
/// [`IoError`] variants if discovery fails, the run directory or table
/// cannot be created, or the pool cannot be built.
pub fn run_with<S: ChannelSource + Sync>(
    config: &RunConfig,
    source: &S,
    started: NaiveDateTime,
) -> Result<BatchReport, IoError> {
    config.validate()?;

    let files = discover_images(&config.source_dir, &config.extension)?;
    let output = RunOutput::create(&config.source_dir, started)?;
    output.write_parameters(config)?;
    let table = output.open_table()?;

    let total = files.len();
    tracing::info!(images = total, jobs = config.jobs, "starting batch");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.jobs)
        .build()?;
    let progress = Progress::new(total);
    let (tx, rx) = mpsc::channel();

    let collected = std::thread::scope(|scope| {
        let writer = scope.spawn(move || write_results(table, rx));

        pool.install(|| {
            files.par_iter().for_each_with(tx, |tx, path| {
                let start = Instant::now();
                let outcome = run_one(source, path, config, &output);
                progress.finished(path, start.elapsed());
                if tx.send(outcome).is_err() {
                    tracing::error!(path = %path.display(), "results writer is gone");
                }
            });
        });

        writer.join().map_err(|_| IoError::WriterPanicked)
    })?;

    let elapsed = progress.started.elapsed();
    tracing::info!(
        succeeded = collected.records.len(),
        failed = collected.failures.len(),
        warnings = collected.warnings.len(),
        dir = %output.dir().display(),
        "batch finished in {:.1} min",
        elapsed.as_secs_f64() / 60.0
    );

    Ok(BatchReport {
        output_dir: output.dir().to_path_buf(),
        total,
        records: collected.records,
        failures: collected.failures,
        warnings: collected.warnings,
        elapsed,
    })
}

fn run_one<S: ChannelSource + ?Sized>(
    source: &S,
    path: &Path,
    config: &RunConfig,
    output: &RunOutput,
) -> Outcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        analyze_file(source, path, config, output)
    }));
    let message = match result {
        Ok(Ok(analyzed)) => {
            return Outcome::Done {
                path: path.to_path_buf(),
                analyzed,
            };
        }
        Ok(Err(e)) => e.to_string(),
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
    };
    tracing::error!(path = %path.display(), "{message}");
    Outcome::Failed(ImageFailure {
        path: path.to_path_buf(),
        message,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}

fn write_results<W: Write>(mut table: ResultsTable<W>, rx: Receiver<Outcome>) -> Collected {
    let mut collected = Collected::default();
    for outcome in rx {
        match outcome {
            Outcome::Done { path, analyzed } => {
                collected
                    .warnings
                    .extend(analyzed.warnings.into_iter().map(|message| ImageWarning {
                        path: path.clone(),
                        message,
                    }));
                match table.append(&analyzed.record) {
                    Ok(()) => collected.records.push(analyzed.record),
                    Err(e) => {
                        let message = format!("failed to append results row: {e}");
                        tracing::error!(path = %path.display(), "{message}");
                        collected.failures.push(ImageFailure { path, message });
                    }
                }
            }
            Outcome::Failed(failure) => collected.failures.push(failure),
        }
    }
    collected
}
