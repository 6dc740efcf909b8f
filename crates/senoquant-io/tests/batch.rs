//! Integration test: synthetic multi-channel TIFFs on disk run through the
//! batch runner, checking the run directory, the results table, and
//! per-image failure isolation.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::cast_precision_loss
)]

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use senoquant_export::RESULTS_TABLE;
use senoquant_io::{
    ChannelSource, ChannelStack, IoError, RUN_PARAMETERS, RunConfig, TiffChannelSource, run_with,
};
use senoquant_pipeline::{ChannelAliases, ChannelMode};
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;

const SIZE: u32 = 100;
const BACKGROUND: u16 = 50;
const BRIGHT: u16 = 900;

fn started() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 31)
        .and_then(|d| d.and_hms_opt(14, 0, 5))
        .unwrap()
}

/// Row-major plane, `BRIGHT` inside a radius-10 disk at the centre when
/// `lit`.
fn disk(lit: bool) -> Vec<u16> {
    (0..SIZE * SIZE)
        .map(|i| {
            let (x, y) = ((i % SIZE) as f32, (i / SIZE) as f32);
            if lit && (x - 50.0).hypot(y - 50.0) <= 10.0 {
                BRIGHT
            } else {
                BACKGROUND
            }
        })
        .collect()
}

fn write_stack(path: &Path, pages: &[(&str, Vec<u16>)]) {
    let mut encoder = TiffEncoder::new(File::create(path).unwrap()).unwrap();
    for (name, data) in pages {
        let mut page = encoder.new_image::<colortype::Gray16>(SIZE, SIZE).unwrap();
        page.encoder()
            .write_tag(Tag::ImageDescription, *name)
            .unwrap();
        page.write_data(data).unwrap();
    }
}

/// Senescent, quiescent, nuclear order.
fn write_indexed(path: &Path, senescent: bool) {
    write_stack(
        path,
        &[
            ("Cy3", disk(senescent)),
            ("GFP", disk(!senescent)),
            ("DAPI", disk(true)),
        ],
    );
}

fn config(dir: &Path) -> RunConfig {
    RunConfig {
        jobs: RunConfig::default_jobs().min(2),
        ..RunConfig::new(dir)
    }
}

fn table_lines(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join(RESULTS_TABLE))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn batch_writes_table_and_artifacts() {
    let src = tempfile::tempdir().unwrap();
    std::fs::create_dir(src.path().join("well_b")).unwrap();
    write_indexed(&src.path().join("a.tif"), true);
    write_indexed(&src.path().join("well_b/b.TIFF"), false);
    std::fs::write(src.path().join("notes.txt"), "ignored").unwrap();

    let config = RunConfig {
        export_masks: true,
        ..config(src.path())
    };
    let report = run_with(&config, &TiffChannelSource, started()).unwrap();

    assert!(report.is_success(), "failures: {:?}", report.failures);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(report.total, 2);
    assert_eq!(report.records.len(), 2);
    assert_eq!(
        report.output_dir,
        src.path().join("Results_2025-01-31 14-00-05")
    );

    let out = &report.output_dir;
    assert!(out.join(RUN_PARAMETERS).is_file());
    for base in ["a", "b"] {
        assert!(out.join(format!("{base}.png")).is_file());
        assert!(out.join(format!("{base}_senescent.png")).is_file());
        assert!(out.join(format!("{base}_quiescent.png")).is_file());
    }

    let mut lines = table_lines(out);
    assert_eq!(lines.len(), 3);
    lines[1..].sort();
    assert!(lines[1].starts_with("a.tif,0,1,0.0,"), "{}", lines[1]);
    assert!(lines[2].starts_with("b.TIFF,1,0,inf,"), "{}", lines[2]);
}

#[test]
fn masks_are_skipped_unless_requested() {
    let src = tempfile::tempdir().unwrap();
    write_indexed(&src.path().join("a.tif"), true);

    let report = run_with(&config(src.path()), &TiffChannelSource, started()).unwrap();
    assert!(report.output_dir.join("a.png").is_file());
    assert!(!report.output_dir.join("a_senescent.png").exists());
}

#[test]
fn name_resolution_reorders_channels() {
    let src = tempfile::tempdir().unwrap();
    // Nuclear first, senescent marker last.
    write_stack(
        &src.path().join("shuffled.tif"),
        &[
            (" DAPI ", disk(true)),
            ("gfp", disk(false)),
            ("mCherry", disk(true)),
        ],
    );

    let config = RunConfig {
        channels: ChannelMode::Names(ChannelAliases::default()),
        ..config(src.path())
    };
    let report = run_with(&config, &TiffChannelSource, started()).unwrap();
    let summary = &report.records[0].summary;
    assert_eq!(summary.senescent.count, 1);
    assert_eq!(summary.quiescent.count, 0);
}

#[test]
fn unmatched_names_warn_once_per_image() {
    let src = tempfile::tempdir().unwrap();
    write_stack(
        &src.path().join("unnamed.tif"),
        &[("foo", disk(true)), ("bar", disk(false)), ("baz", disk(true))],
    );
    write_indexed(&src.path().join("named.tif"), true);

    let config = RunConfig {
        channels: ChannelMode::Names(ChannelAliases::default()),
        ..config(src.path())
    };
    let report = run_with(&config, &TiffChannelSource, started()).unwrap();
    assert!(report.is_success(), "failures: {:?}", report.failures);
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.warnings.len(), 1, "{:?}", report.warnings);
    assert_eq!(report.warnings[0].path, src.path().join("unnamed.tif"));
    assert!(report.warnings[0].message.contains("default order"));
}

#[test]
fn bad_image_does_not_stop_batch() {
    let src = tempfile::tempdir().unwrap();
    write_indexed(&src.path().join("good.tif"), true);
    std::fs::write(src.path().join("corrupt.tif"), b"not a tiff").unwrap();
    write_stack(&src.path().join("two_channels.tif"), &[("a", disk(true)), ("b", disk(true))]);

    let report = run_with(&config(src.path()), &TiffChannelSource, started()).unwrap();
    assert_eq!(report.total, 3);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].image, "good.tif");

    let mut failed: Vec<_> = report
        .failures
        .iter()
        .map(|f| f.path.file_name().unwrap().to_owned())
        .collect();
    failed.sort();
    assert_eq!(failed, vec!["corrupt.tif", "two_channels.tif"]);
    assert_eq!(table_lines(&report.output_dir).len(), 2);
}

/// Delegates to TIFF decoding but panics on one file.
struct Exploding {
    target: PathBuf,
}

impl ChannelSource for Exploding {
    fn read_channels(&self, path: &Path) -> Result<ChannelStack, IoError> {
        if path == self.target {
            panic!("decoder blew up");
        }
        TiffChannelSource.read_channels(path)
    }
}

#[test]
fn panicking_image_becomes_failure() {
    let src = tempfile::tempdir().unwrap();
    let boom = src.path().join("boom.tif");
    write_indexed(&boom, true);
    write_indexed(&src.path().join("fine.tif"), false);

    let source = Exploding { target: boom };
    let report = run_with(&config(src.path()), &source, started()).unwrap();
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].message.contains("decoder blew up"));
    assert!(!report.is_success());
}

#[test]
fn empty_source_yields_header_only_table() {
    let src = tempfile::tempdir().unwrap();
    let report = run_with(&config(src.path()), &TiffChannelSource, started()).unwrap();
    assert_eq!(report.total, 0);
    assert!(report.is_success());
    assert_eq!(table_lines(&report.output_dir).len(), 1);
}
