//! Record sinks

use crate::Record;

pub mod csv;

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// The sink holds fewer records than the checkpoint claims
    #[error("sink holds {found} records but checkpoint committed {committed}")]
    SinkBehind {
        /// Records the checkpoint says were committed
        committed: u64,
        /// Records actually found in the sink
        found: u64,
    },
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// How a flush lands in the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Truncate the sink and start over (header included)
    Overwrite,
    /// Add rows after the existing content
    Append,
}

/// Durable append-only store for extracted records
///
/// `write` must not return until the records are durable; the caller
/// checkpoints them as committed as soon as it returns.
pub trait RecordSink: Send {
    /// Write records in the given mode, returning how many rows were written
    fn write(&mut self, records: &[Record], mode: WriteMode) -> OutputResult<u64>;

    /// Bring the sink in line with `committed` records before a resumed run
    ///
    /// Returns the number of surplus records dropped. The default does nothing.
    fn reconcile(&mut self, _committed: u64) -> OutputResult<u64> {
        Ok(0)
    }
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn write(&mut self, records: &[Record], mode: WriteMode) -> OutputResult<u64> {
        (**self).write(records, mode)
    }

    fn reconcile(&mut self, committed: u64) -> OutputResult<u64> {
        (**self).reconcile(committed)
    }
}
