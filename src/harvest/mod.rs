//! Pagination traversal and checkpoint/resume control
//!
//! This module holds the engine that turns a paginated source into a durable
//! CSV file across any number of interrupted runs.
//!
//! # Overview
//!
//! A run proceeds through the states of [`traverser::TraversalState`]:
//!
//! 1. **Discovering**: read the page total from the source, or fall back to
//!    an unbounded scan
//! 2. **Resuming**: load the checkpoint and move the source to
//!    `last_page + 1`
//! 3. **FetchingPage** / **Advancing**: walk pages sequentially with a jittered
//!    delay between them ([`rate_limit::JitterDelay`])
//! 4. **Flushing**: every `batch_interval` pages, write the buffered records
//!    ([`batch::BatchAccumulator`]) to the sink, *then* save the checkpoint
//! 5. **Done**: flush the remainder and delete the checkpoint
//!
//! A fatal error flushes whatever is buffered on a best-effort basis before it
//! propagates as a [`RunFailure`], which names the page the next run will start
//! from.
//!
//! # Quick Start
//!
//! ```no_run
//! use page_harvester::harvest::{PaginationTraverser, RunConfig};
//! use page_harvester::output::csv::CsvRecordSink;
//! use page_harvester::resume::StateStore;
//! use page_harvester::source::datatables::DataTablesHttpSource;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunConfig::default().with_batch_interval(5);
//! let source = DataTablesHttpSource::new("https://example.org/ajax", config.page_size)?;
//! let mut traverser = PaginationTraverser::new(
//!     config,
//!     source,
//!     CsvRecordSink::new("output/records.csv"),
//!     StateStore::new("output/.harvest_state.json"),
//! );
//! match traverser.run().await {
//!     Ok(summary) => println!("{} records", summary.total_records),
//!     Err(failure) => eprintln!("{failure}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod discovery;
pub mod progress;
pub mod rate_limit;
pub mod traverser;

pub use batch::BatchAccumulator;
pub use config::{ConfigError, RepositionStrategy, RunConfig};
pub use discovery::DiscoveryError;
pub use rate_limit::JitterDelay;
pub use traverser::{PaginationTraverser, TraversalState};

use crate::output::OutputError;
use crate::resume::{CheckpointState, ResumeError};
use crate::source::SourceError;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Harvest errors
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Invalid run configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Page did not arrive in time
    #[error("timed out fetching page {page}: {message}")]
    FetchTimeout {
        /// Page being fetched
        page: u64,
        /// Underlying error text
        message: String,
    },

    /// Source could not be moved to the resume page
    #[error("could not reposition source to page {target}: {reason}")]
    ResumeNavigation {
        /// Resume page
        target: u64,
        /// What went wrong
        reason: String,
    },

    /// Any other source failure
    #[error("source error: {0}")]
    Source(String),

    /// Checkpoint exists but cannot be trusted
    #[error("corrupt checkpoint: {0}")]
    CorruptCheckpoint(String),

    /// Sink or checkpoint write failed
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Shutdown was requested
    #[error("interrupted before page {page}")]
    Interrupted {
        /// Page that was about to be fetched or advanced to
        page: u64,
    },
}

impl HarvestError {
    /// Short label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            HarvestError::Config(_) => "config",
            HarvestError::FetchTimeout { .. } => "fetch_timeout",
            HarvestError::ResumeNavigation { .. } => "resume_navigation",
            HarvestError::Source(_) => "source",
            HarvestError::CorruptCheckpoint(_) => "corrupt_checkpoint",
            HarvestError::Persistence(_) => "persistence",
            HarvestError::Interrupted { .. } => "interrupted",
        }
    }
}

impl From<SourceError> for HarvestError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::FetchTimeout { page, message } => {
                HarvestError::FetchTimeout { page, message }
            }
            other => HarvestError::Source(other.to_string()),
        }
    }
}

impl From<ResumeError> for HarvestError {
    fn from(e: ResumeError) -> Self {
        match e {
            ResumeError::Corrupt(msg) => HarvestError::CorruptCheckpoint(msg),
            other => HarvestError::Persistence(other.to_string()),
        }
    }
}

impl From<OutputError> for HarvestError {
    fn from(e: OutputError) -> Self {
        HarvestError::Persistence(e.to_string())
    }
}

/// A run that ended in the `Failed` state
#[derive(Debug, thiserror::Error)]
#[error("{error}{}", resume_hint(.checkpoint))]
pub struct RunFailure {
    /// What went wrong
    #[source]
    pub error: HarvestError,
    /// Checkpoint on disk when the run stopped, if it could be read
    pub checkpoint: Option<CheckpointState>,
}

fn resume_hint(checkpoint: &Option<CheckpointState>) -> String {
    match checkpoint {
        Some(cp) => format!(
            " (progress saved: {} records; run again to resume from page {})",
            cp.total_records,
            cp.resume_page()
        ),
        None => String::new(),
    }
}

impl RunFailure {
    /// Failure with a known checkpoint
    pub fn new(error: HarvestError, checkpoint: CheckpointState) -> Self {
        Self {
            error,
            checkpoint: Some(checkpoint),
        }
    }

    /// Failure before the checkpoint could be read
    pub fn without_checkpoint(error: HarvestError) -> Self {
        Self {
            error,
            checkpoint: None,
        }
    }

    /// Page the next run starts from, if known
    pub fn resume_page(&self) -> Option<u64> {
        self.checkpoint.map(|cp| cp.resume_page())
    }
}

/// Outcome of a run that reached `Done`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Page this run started at
    pub first_page: u64,
    /// Last page fetched in this run
    pub last_page: Option<u64>,
    /// Discovered (or capped) page total; `None` for an unbounded scan
    pub total_pages: Option<u64>,
    /// Pages fetched in this run
    pub pages_fetched: u64,
    /// Records written by this run
    pub records_this_run: u64,
    /// Records in the sink, across all runs
    pub total_records: u64,
    /// Flushes performed by this run
    pub flushes: u64,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub finished_at: DateTime<Utc>,
}
