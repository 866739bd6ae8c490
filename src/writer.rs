//! Chunked CSV persistence
//!
//! Partitions the accumulated dataset into contiguous, size-bounded chunks
//! and writes each as a self-contained UTF-8 CSV file: one header row plus
//! one row per record. Every file is written to a temporary file in the
//! destination directory and atomically persisted into place, so an aborted
//! run never leaves a torn chunk and never corrupts chunks already written.

use chrono::{DateTime, Utc};
use csv::{QuoteStyle, WriterBuilder};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::config::{HeaderMode, OutputConfig};
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::types::{OutputFile, Record};

/// Writes the dataset as one or more bounded CSV files.
pub struct ChunkWriter {
    config: OutputConfig,
}

impl ChunkWriter {
    /// Create a writer from the output configuration.
    #[must_use]
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Partition `dataset` and persist every chunk.
    ///
    /// Produces `ceil(len / max_rows_per_chunk)` files whose row counts sum
    /// to the dataset size; chunk boundaries are independent of page
    /// boundaries and dataset order is preserved. An empty dataset produces
    /// no file — that is "nothing to persist", not an error. `captured_at`
    /// is embedded in every filename; when more than one chunk results, a
    /// `partN_ofM` suffix distinguishes them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] when the output directory or a chunk
    /// file cannot be written.
    pub fn write(&self, dataset: &Dataset, captured_at: DateTime<Utc>) -> Result<Vec<OutputFile>> {
        if dataset.is_empty() {
            tracing::info!("dataset is empty, nothing to persist");
            return Ok(Vec::new());
        }

        fs::create_dir_all(&self.config.output_dir).map_err(|e| Error::Persistence {
            path: self.config.output_dir.clone(),
            reason: format!("failed to create output directory: {e}"),
        })?;

        let header = self.header_fields(dataset);
        let chunk_size = self.config.max_rows_per_chunk;
        let total_chunks = dataset.len().div_ceil(chunk_size);
        let timestamp = captured_at.format("%Y-%m-%d_%H-%M-%S").to_string();

        let mut files = Vec::with_capacity(total_chunks);
        for (i, chunk) in dataset.records().chunks(chunk_size).enumerate() {
            let filename = if total_chunks == 1 {
                format!("{}_{timestamp}.csv", self.config.file_prefix)
            } else {
                format!(
                    "{}_{timestamp}_part{}_of{total_chunks}.csv",
                    self.config.file_prefix,
                    i + 1,
                )
            };
            let path = self.config.output_dir.join(filename);
            let file = self.write_chunk(&path, &header, chunk)?;
            tracing::info!(
                path = %file.path.display(),
                rows = file.rows,
                bytes = file.bytes,
                "chunk written"
            );
            files.push(file);
        }

        Ok(files)
    }

    /// Field names for the header row, per the configured mode.
    fn header_fields(&self, dataset: &Dataset) -> Vec<String> {
        match self.config.header_mode {
            HeaderMode::Union => dataset.fields().to_vec(),
            HeaderMode::FirstPage => dataset
                .records()
                .first()
                .map(|r| r.keys().cloned().collect())
                .unwrap_or_default(),
        }
    }

    fn write_chunk(&self, path: &Path, header: &[String], records: &[Record]) -> Result<OutputFile> {
        let persist_error = |reason: String| Error::Persistence {
            path: path.to_path_buf(),
            reason,
        };

        let parent = path
            .parent()
            .ok_or_else(|| persist_error("output path has no parent directory".to_string()))?;

        let temp = NamedTempFile::new_in(parent)
            .map_err(|e| persist_error(format!("failed to create temporary file: {e}")))?;

        let quote_style = if self.config.quote_all {
            QuoteStyle::Always
        } else {
            QuoteStyle::Necessary
        };
        let mut writer = WriterBuilder::new().quote_style(quote_style).from_writer(temp);

        writer
            .write_record(header)
            .map_err(|e| persist_error(format!("failed to write header row: {e}")))?;

        for record in records {
            writer
                .write_record(header.iter().map(|field| field_text(record.get(field))))
                .map_err(|e| persist_error(format!("failed to write record: {e}")))?;
        }

        let temp = writer
            .into_inner()
            .map_err(|e| persist_error(format!("failed to flush csv writer: {e}")))?;
        temp.persist(path)
            .map_err(|e| persist_error(format!("failed to persist file: {e}")))?;

        let bytes = fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| persist_error(format!("failed to stat persisted file: {e}")))?;

        Ok(OutputFile {
            path: path.to_path_buf(),
            rows: records.len() as u64,
            bytes,
        })
    }
}

/// Canonical text form of one CSV cell.
///
/// Missing fields and JSON null become empty cells; residual nested values
/// are serialized as compact JSON.
fn field_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}
