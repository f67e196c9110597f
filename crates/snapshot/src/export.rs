//! Write the current snapshot to a file
//!
//! Output goes to `<path>.tmp` first and is renamed into place once the
//! writer has closed, so a failed export never leaves a partial file at the
//! requested path.

use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use arrow::csv::WriterBuilder;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::errors::ParquetError;
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use thiserror::Error;
use tracing::info;

use crate::store::Snapshot;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Csv,
    Parquet,
}

impl ExportFormat {
    /// Format implied by the file extension; CSV unless it says parquet
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("parquet") => ExportFormat::Parquet,
            _ => ExportFormat::Csv,
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "parquet" => Ok(ExportFormat::Parquet),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub format: ExportFormat,
    pub rows: usize,
    pub bytes: u64,
}

pub fn export_snapshot(
    snapshot: &Snapshot,
    path: &Path,
    format: ExportFormat,
) -> Result<ExportSummary, ExportError> {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    let tmp_path = PathBuf::from(tmp);

    let written = match format {
        ExportFormat::Csv => write_csv(snapshot.batch(), &tmp_path),
        ExportFormat::Parquet => write_parquet(snapshot.batch(), &tmp_path),
    };
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    fs::rename(&tmp_path, path)?;

    let bytes = fs::metadata(path)?.len();
    info!(
        path = %path.display(),
        format = ?format,
        rows = snapshot.num_rows(),
        bytes,
        "Exported snapshot"
    );
    Ok(ExportSummary {
        path: path.to_path_buf(),
        format,
        rows: snapshot.num_rows(),
        bytes,
    })
}

fn write_csv(batch: &RecordBatch, path: &Path) -> Result<(), ExportError> {
    let file = File::create(path)?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer.write(batch)?;
    writer.into_inner().sync_all()?;
    Ok(())
}

fn write_parquet(batch: &RecordBatch, path: &Path) -> Result<(), ExportError> {
    let file = File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_statistics_enabled(EnabledStatistics::Chunk)
        .set_created_by("qpeek".to_string())
        .build();

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}
