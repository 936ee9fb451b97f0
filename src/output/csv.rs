//! CSV record sink

use crate::Record;
use csv::{ByteRecord, ReaderBuilder, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{OutputError, OutputResult, RecordSink, WriteMode};

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// CSV sink: one header row, then one row per record
///
/// Overwrite derives the header from the field order of the batch. Append
/// aligns each record to the header already in the file, by field name.
pub struct CsvRecordSink {
    path: PathBuf,
    buffer_size: usize,
    rows_written: u64,
}

impl CsvRecordSink {
    /// Create a sink writing to `path`; nothing is touched until the first write
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self::new_with_buffer_size(path, DEFAULT_BUFFER_SIZE)
    }

    /// Create a sink with a custom write buffer size
    pub fn new_with_buffer_size<P: Into<PathBuf>>(path: P, buffer_size: usize) -> Self {
        Self {
            path: path.into(),
            buffer_size,
            rows_written: 0,
        }
    }

    /// Output file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written by this sink instance
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    fn ensure_parent_dir(&self) -> OutputResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    OutputError::IoError(format!("Failed to create directory: {e}"))
                })?;
            }
        }
        Ok(())
    }

    /// Header of the existing file, or `None` if the file is missing or empty
    fn existing_header(&self) -> OutputResult<Option<Vec<String>>> {
        match std::fs::metadata(&self.path) {
            Ok(m) if m.len() > 0 => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(OutputError::IoError(e.to_string())),
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .map_err(|e| OutputError::CsvError(format!("Failed to open for reading: {e}")))?;
        let headers = reader
            .headers()
            .map_err(|e| OutputError::CsvError(format!("Failed to read header: {e}")))?;
        Ok(Some(headers.iter().map(str::to_string).collect()))
    }

    fn write_rows(
        &mut self,
        file: File,
        header: Option<&[String]>,
        columns: &[String],
        records: &[Record],
    ) -> OutputResult<u64> {
        let buf_writer = BufWriter::with_capacity(self.buffer_size, file);
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(buf_writer);

        if let Some(header) = header {
            writer
                .write_record(header)
                .map_err(|e| OutputError::CsvError(format!("Failed to write header: {e}")))?;
        }

        let mut unknown_fields = 0usize;
        for record in records {
            unknown_fields += record
                .field_names()
                .filter(|name| !columns.iter().any(|c| c == name))
                .count();
            let row = columns.iter().map(|c| record.get(c).unwrap_or(""));
            writer
                .write_record(row)
                .map_err(|e| OutputError::CsvError(format!("Failed to write record: {e}")))?;
        }
        if unknown_fields > 0 {
            warn!(
                unknown_fields,
                path = %self.path.display(),
                "Dropped fields not present in the CSV header"
            );
        }

        writer
            .flush()
            .map_err(|e| OutputError::IoError(format!("Failed to flush: {e}")))?;
        let buf_writer = writer
            .into_inner()
            .map_err(|e| OutputError::IoError(format!("Failed to get inner writer: {e}")))?;
        let file = buf_writer
            .into_inner()
            .map_err(|e| OutputError::IoError(format!("Failed to get file handle: {e}")))?;
        file.sync_all()
            .map_err(|e| OutputError::IoError(format!("Failed to sync file: {e}")))?;

        let written = records.len() as u64;
        self.rows_written += written;
        Ok(written)
    }
}

/// Field names across a batch, in order of first appearance
fn columns_of(records: &[Record]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for name in record.field_names() {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.to_string());
            }
        }
    }
    columns
}

impl RecordSink for CsvRecordSink {
    fn write(&mut self, records: &[Record], mode: WriteMode) -> OutputResult<u64> {
        self.ensure_parent_dir()?;

        match mode {
            WriteMode::Overwrite => {
                info!(path = %self.path.display(), records = records.len(), "Truncating CSV sink");
                let file = File::create(&self.path)
                    .map_err(|e| OutputError::IoError(format!("Failed to create file: {e}")))?;
                if records.is_empty() {
                    file.sync_all()
                        .map_err(|e| OutputError::IoError(format!("Failed to sync file: {e}")))?;
                    return Ok(0);
                }
                let columns = columns_of(records);
                self.write_rows(file, Some(&columns), &columns, records)
            }
            WriteMode::Append => {
                if records.is_empty() {
                    return Ok(0);
                }
                let existing = self.existing_header()?;
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .map_err(|e| OutputError::IoError(format!("Failed to open file: {e}")))?;

                debug!(
                    path = %self.path.display(),
                    records = records.len(),
                    has_header = existing.is_some(),
                    "Appending to CSV sink"
                );
                match existing {
                    Some(columns) => self.write_rows(file, None, &columns, records),
                    None => {
                        let columns = columns_of(records);
                        self.write_rows(file, Some(&columns), &columns, records)
                    }
                }
            }
        }
    }

    fn reconcile(&mut self, committed: u64) -> OutputResult<u64> {
        if !self.path.exists() {
            return if committed == 0 {
                Ok(0)
            } else {
                Err(OutputError::SinkBehind {
                    committed,
                    found: 0,
                })
            };
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| OutputError::CsvError(format!("Failed to open for reading: {e}")))?;
        reader
            .headers()
            .map_err(|e| OutputError::CsvError(format!("Failed to read header: {e}")))?;

        let mut record = ByteRecord::new();
        let mut found = 0u64;
        while found < committed {
            let more = reader
                .read_byte_record(&mut record)
                .map_err(|e| OutputError::CsvError(format!("Failed to read record: {e}")))?;
            if !more {
                return Err(OutputError::SinkBehind { committed, found });
            }
            found += 1;
        }

        // The first surplus record starts where the file must end.
        let more = reader
            .read_byte_record(&mut record)
            .map_err(|e| OutputError::CsvError(format!("Failed to read record: {e}")))?;
        if !more {
            return Ok(0);
        }
        let cut_at = record
            .position()
            .map(|p| p.byte())
            .ok_or_else(|| OutputError::CsvError("record position unavailable".to_string()))?;

        let mut surplus = 1u64;
        while reader
            .read_byte_record(&mut record)
            .map_err(|e| OutputError::CsvError(format!("Failed to read record: {e}")))?
        {
            surplus += 1;
        }
        drop(reader);

        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| OutputError::IoError(format!("Failed to open file: {e}")))?;
        file.set_len(cut_at)
            .map_err(|e| OutputError::IoError(format!("Failed to truncate file: {e}")))?;
        file.sync_all()
            .map_err(|e| OutputError::IoError(format!("Failed to sync file: {e}")))?;

        warn!(
            surplus,
            committed,
            path = %self.path.display(),
            "Dropped uncommitted rows left by an interrupted flush"
        );
        Ok(surplus)
    }
}

/// Count data rows in a CSV file (header excluded)
pub fn count_rows<P: AsRef<Path>>(path: P) -> OutputResult<u64> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path.as_ref())
        .map_err(|e| OutputError::CsvError(format!("Failed to open for reading: {e}")))?;
    let mut record = ByteRecord::new();
    let mut rows = 0u64;
    while reader
        .read_byte_record(&mut record)
        .map_err(|e| OutputError::CsvError(format!("Failed to read record: {e}")))?
    {
        rows += 1;
    }
    Ok(rows)
}
