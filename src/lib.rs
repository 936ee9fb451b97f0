//! # Page Harvester Library
//!
//! Resumable, crash-safe extraction of records from a paginated data source
//! into a durable CSV sink.
//!
//! ## Features
//!
//! - **Checkpointed Progress**: Progress is saved after every successful flush,
//!   so an interrupted run resumes exactly where the sink left off
//! - **Batch Flushing**: Records are buffered for a configurable number of pages
//!   and flushed together
//! - **Graceful Degradation**: Unparsable page-count metadata falls back to an
//!   unbounded scan instead of failing the run
//! - **Jittered Rate Limiting**: Randomized delays between page fetches
//! - **Pluggable Collaborators**: Any [`source::ExtractionSource`] and
//!   [`output::RecordSink`] can drive the traversal
//!
//! ## Quick Start
//!
//! ```no_run
//! use page_harvester::harvest::{PaginationTraverser, RunConfig};
//! use page_harvester::output::csv::CsvRecordSink;
//! use page_harvester::resume::StateStore;
//! use page_harvester::source::datatables::DataTablesHttpSource;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = DataTablesHttpSource::new("https://example.org/table/ajax", 100)?;
//! let sink = CsvRecordSink::new("output/records.csv");
//! let store = StateStore::new("output/.harvest_state.json");
//!
//! let mut traverser = PaginationTraverser::new(RunConfig::default(), source, sink, store);
//! let summary = traverser.run().await?;
//! println!("committed {} records", summary.total_records);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`source`] - Extraction source contract and the DataTables HTTP source
//! - [`output`] - Record sink contract and the CSV sink
//! - [`resume`] - Checkpoint persistence and run locking
//! - [`harvest`] - Pagination traversal state machine, batching and rate limiting
//! - [`cli`] - Command-line interface

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};

/// CLI command implementations
pub mod cli;

/// Pagination traversal and checkpoint/resume control
pub mod harvest;

/// Prometheus metrics
pub mod metrics;

/// Record sinks
pub mod output;

/// Checkpoint persistence
pub mod resume;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Extraction sources
pub mod source;

/// A single extracted record.
///
/// Records are opaque to the traversal: an ordered list of field name and
/// string value pairs. Field order is kept so a sink can derive column order
/// from the first record it sees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing the value in place if the name already exists
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builder form of [`Record::insert`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Look up a field value by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Field names in insertion order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Field name/value pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Records extracted from one page of the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult {
    /// 1-based page number
    pub page_number: u64,
    /// Records in source order
    pub records: Vec<Record>,
}

impl PageResult {
    /// Create a page result
    pub fn new(page_number: u64, records: Vec<Record>) -> Self {
        Self {
            page_number,
            records,
        }
    }
}
