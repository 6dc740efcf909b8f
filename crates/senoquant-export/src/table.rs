//! Results-table serialization.
//!
//! One row per image. Column headers are fixed, byte for byte,
//! including the missing space before `(pixels^2)` in the last one;
//! downstream spreadsheets key on them.

use std::io::{self, Write};

use senoquant_pipeline::ImageRecord;
use serde::Serialize;

use crate::ExportError;

/// File name of the cumulative results table.
pub const RESULTS_TABLE: &str = "Senolysis_measures.csv";

/// Column headers, in order.
pub const HEADERS: [&str; 6] = [
    "Image",
    "quiescence count",
    "senescence count",
    "quiescence / senescence ratio",
    "quiescence mean area \u{b1} std (pixels^2)",
    "senescence mean area \u{b1} std(pixels^2)",
];

/// One results-table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRow {
    /// Source file name.
    pub image: String,
    /// Quiescent nucleus count.
    pub quiescent_count: usize,
    /// Senescent nucleus count.
    pub senescent_count: usize,
    /// Ratio, or `inf` when there are no senescent nuclei.
    pub ratio: String,
    /// `mean ± std` quiescent area.
    pub quiescent_area: String,
    /// `mean ± std` senescent area.
    pub senescent_area: String,
}

impl From<&ImageRecord> for TableRow {
    fn from(record: &ImageRecord) -> Self {
        let s = &record.summary;
        Self {
            image: record.image.clone(),
            quiescent_count: s.quiescent.count,
            senescent_count: s.senescent.count,
            ratio: s.ratio.to_string(),
            quiescent_area: s.quiescent.area_summary(),
            senescent_area: s.senescent.area_summary(),
        }
    }
}

/// Appends rows to a CSV sink, header first.
///
/// The header is written on construction, so an empty run still yields
/// a well-formed table. Every append is flushed.
pub struct ResultsTable<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl<W: Write> ResultsTable<W> {
    /// Start a table on `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Csv`] if the header cannot be written.
    pub fn new(sink: W) -> Result<Self, ExportError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(sink);
        writer.write_record(HEADERS)?;
        writer.flush()?;
        Ok(Self { writer, rows: 0 })
    }

    /// Append the row for `record`.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Csv`] or [`ExportError::Io`] if the row
    /// cannot be written or flushed.
    pub fn append(&mut self, record: &ImageRecord) -> Result<(), ExportError> {
        self.writer.serialize(TableRow::from(record))?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Rows appended so far.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Flush and return the sink.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Io`] if the final flush fails.
    pub fn into_inner(self) -> Result<W, ExportError> {
        self.writer
            .into_inner()
            .map_err(|e| ExportError::Io(e.into_error()))
    }
}

/// Render a complete table for `records` as a string.
///
/// # Errors
///
/// Returns [`ExportError`] if serialization fails.
pub fn to_csv(records: &[ImageRecord]) -> Result<String, ExportError> {
    let mut table = ResultsTable::new(Vec::new())?;
    for record in records {
        table.append(record)?;
    }
    let bytes = table.into_inner()?;
    String::from_utf8(bytes)
        .map_err(|e| ExportError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use senoquant_pipeline::{ClassStats, ImageSummary, Ratio};

    use super::*;

    fn record(image: &str, quiescent: usize, senescent: usize) -> ImageRecord {
        ImageRecord {
            image: image.to_string(),
            summary: ImageSummary {
                quiescent: ClassStats {
                    count: quiescent,
                    mean_area: 1500.5,
                    std_area: 12.25,
                },
                senescent: ClassStats {
                    count: senescent,
                    mean_area: if senescent == 0 { 0.0 } else { 2100.0 },
                    std_area: 0.0,
                },
                ratio: Ratio::of(quiescent, senescent),
            },
        }
    }

    #[test]
    fn empty_table_has_header_only() {
        let csv = to_csv(&[]).unwrap();
        assert_eq!(csv.lines().count(), 1);
        assert_eq!(
            csv.lines().next().unwrap(),
            "Image,quiescence count,senescence count,quiescence / senescence ratio,\
             quiescence mean area \u{b1} std (pixels^2),senescence mean area \u{b1} std(pixels^2)"
        );
    }

    #[test]
    fn rows_follow_header() {
        let csv = to_csv(&[
            record("a.tif", 3, 2),
            record("b.tif", 4, 0),
            record("c.tif", 2, 2),
        ])
        .unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "a.tif,3,2,1.5,1500.5 \u{b1} 12.25,2100.0 \u{b1} 0.0");
        assert_eq!(lines[2], "b.tif,4,0,inf,1500.5 \u{b1} 12.25,0 \u{b1} 0");
        assert_eq!(lines[3], "c.tif,2,2,1.0,1500.5 \u{b1} 12.25,2100.0 \u{b1} 0.0");
    }

    #[test]
    fn table_counts_rows() {
        let mut table = ResultsTable::new(Vec::new()).unwrap();
        table.append(&record("x.tif", 1, 1)).unwrap();
        table.append(&record("y.tif", 2, 1)).unwrap();
        assert_eq!(table.rows(), 2);
    }

    #[test]
    fn names_with_commas_are_quoted() {
        let csv = to_csv(&[record("well 1, field 2.tif", 1, 1)]).unwrap();
        assert!(csv.contains("\"well 1, field 2.tif\""));
    }
}
