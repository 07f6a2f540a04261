//! Export of finished capture sessions.
//!
//! A [`SessionRecord`] pairs the buffer snapshot with the metadata and clock
//! parameters needed to interpret it; an [`ExportSink`] serializes it.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::sample::{MotionSample, Ticks};
use crate::session::CaptureSession;

/// Column header written after the metadata rows.
pub const CSV_HEADER: &str = "xCount,yCount,Time (ms),buttonflags";

/// Default number of decimals for the time column.
pub const DEFAULT_TIME_DECIMALS: usize = 3;

/// User-supplied metadata attached to an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMetadata {
    /// Free-text capture name, also used for the file name.
    pub capture_name: String,
    /// Free-text sensor resolution of the device (counts per inch).
    pub cpi: String,
}

impl ExportMetadata {
    /// Create metadata, refusing a missing CPI value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingMetadata`] if `cpi` is blank.
    pub fn new(capture_name: impl Into<String>, cpi: impl Into<String>) -> Result<Self> {
        let cpi = cpi.into();
        if cpi.trim().is_empty() {
            return Err(Error::MissingMetadata { field: "cpi" });
        }
        Ok(Self {
            capture_name: capture_name.into(),
            cpi,
        })
    }
}

/// One exported sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    /// Horizontal counts.
    pub x_count: i32,
    /// Vertical counts, positive upwards.
    pub y_count: i32,
    /// Milliseconds since the recording started.
    pub time_ms: f64,
    /// Raw button transition bits.
    pub button_flags: u16,
}

impl ExportRow {
    /// Convert `sample` relative to the recording start.
    #[must_use]
    pub fn from_sample(sample: &MotionSample, start: Ticks, ticks_per_second: i64) -> Self {
        Self {
            x_count: sample.delta_x,
            y_count: sample.delta_y.saturating_neg(),
            time_ms: relative_ms(sample.timestamp, start, ticks_per_second),
            button_flags: sample.buttons.bits(),
        }
    }
}

/// Milliseconds between `start` and `timestamp` at the given tick rate.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn relative_ms(timestamp: Ticks, start: Ticks, ticks_per_second: i64) -> f64 {
    (timestamp - start) as f64 * 1000.0 / ticks_per_second.max(1) as f64
}

/// A finished session ready for serialization.
#[derive(Debug, Clone, Copy)]
pub struct SessionRecord<'a> {
    /// Export metadata.
    pub metadata: &'a ExportMetadata,
    /// Samples in acquisition order.
    pub samples: &'a [MotionSample],
    /// Tick of the start edge.
    pub start: Ticks,
    /// Tick counter frequency.
    pub ticks_per_second: i64,
}

impl<'a> SessionRecord<'a> {
    /// Build a record from an idle session.
    #[must_use]
    pub fn new(metadata: &'a ExportMetadata, session: &'a CaptureSession, ticks_per_second: i64) -> Self {
        Self {
            metadata,
            samples: session.samples(),
            start: session.start_timestamp().unwrap_or_default(),
            ticks_per_second,
        }
    }

    /// Rows in acquisition order.
    pub fn rows(&self) -> impl Iterator<Item = ExportRow> + '_ {
        self.samples
            .iter()
            .map(|s| ExportRow::from_sample(s, self.start, self.ticks_per_second))
    }
}

/// A serializer for session records.
pub trait ExportSink {
    /// Write one complete record.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    fn write_record(&mut self, record: &SessionRecord<'_>) -> Result<()>;
}

/// Writes the comma-separated layout: name row, CPI row, header, samples.
#[derive(Debug)]
pub struct CsvSink<W> {
    writer: W,
    decimals: usize,
}

impl<W: Write> CsvSink<W> {
    /// Create a sink with the default time precision.
    pub fn new(writer: W) -> Self {
        Self::with_decimals(writer, DEFAULT_TIME_DECIMALS)
    }

    /// Create a sink writing `decimals` digits of the time column.
    pub fn with_decimals(writer: W, decimals: usize) -> Self {
        Self { writer, decimals }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ExportSink for CsvSink<W> {
    fn write_record(&mut self, record: &SessionRecord<'_>) -> Result<()> {
        writeln!(self.writer, "{}", record.metadata.capture_name)?;
        writeln!(self.writer, "{}", record.metadata.cpi)?;
        writeln!(self.writer, "{CSV_HEADER}")?;
        for row in record.rows() {
            writeln!(
                self.writer,
                "{},{},{:.*},{}",
                row.x_count, row.y_count, self.decimals, row.time_ms, row.button_flags
            )?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    name: &'a str,
    cpi: &'a str,
    ticks_per_second: i64,
    start_ticks: Ticks,
    rows: Vec<ExportRow>,
}

/// Writes the record as a single JSON document.
#[derive(Debug)]
pub struct JsonSink<W> {
    writer: W,
    pretty: bool,
}

impl<W: Write> JsonSink<W> {
    /// Create a sink; `pretty` selects indented output.
    pub fn new(writer: W, pretty: bool) -> Self {
        Self { writer, pretty }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ExportSink for JsonSink<W> {
    fn write_record(&mut self, record: &SessionRecord<'_>) -> Result<()> {
        let json = JsonRecord {
            name: &record.metadata.capture_name,
            cpi: &record.metadata.cpi,
            ticks_per_second: record.ticks_per_second,
            start_ticks: record.start,
            rows: record.rows().collect(),
        };
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, &json)?;
        } else {
            serde_json::to_writer(&mut self.writer, &json)?;
        }
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Serialization format for file exports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Comma-separated values.
    #[default]
    Csv,
    /// JSON document.
    Json,
}

impl ExportFormat {
    /// File extension without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

/// Writes records to timestamped files in a directory.
#[derive(Debug, Clone)]
pub struct FileExporter {
    dir: PathBuf,
    format: ExportFormat,
    decimals: usize,
}

impl FileExporter {
    /// Create an exporter writing into `dir`.
    pub fn new(dir: impl Into<PathBuf>, format: ExportFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
            decimals: DEFAULT_TIME_DECIMALS,
        }
    }

    /// Set the time column precision for CSV output.
    #[must_use]
    pub fn with_decimals(mut self, decimals: usize) -> Self {
        self.decimals = decimals;
        self
    }

    /// The output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a capture called `name` exported at `at`.
    #[must_use]
    pub fn file_name(&self, name: &str, at: DateTime<Utc>) -> String {
        let name: String = name
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c => c,
            })
            .collect();
        format!(
            "{name}-{}.{}",
            at.format("%Y-%-m-%-d_%-H-%-M-%-S"),
            self.format.extension()
        )
    }

    /// Write `record` to a new file stamped with `at`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExportOpen`] if the directory or file cannot be
    /// created, or an I/O error if writing fails.
    pub fn export(&self, record: &SessionRecord<'_>, at: DateTime<Utc>) -> Result<PathBuf> {
        let path = self
            .dir
            .join(self.file_name(&record.metadata.capture_name, at));

        fs::create_dir_all(&self.dir).map_err(|source| Error::ExportOpen {
            path: path.clone(),
            source,
        })?;
        let file = File::create(&path).map_err(|source| Error::ExportOpen {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), format = ?self.format, "Export file opened");

        let writer = BufWriter::new(file);
        match self.format {
            ExportFormat::Csv => CsvSink::with_decimals(writer, self.decimals).write_record(record)?,
            ExportFormat::Json => JsonSink::new(writer, true).write_record(record)?,
        }

        info!(path = %path.display(), samples = record.samples.len(), "Capture exported");
        Ok(path)
    }
}
