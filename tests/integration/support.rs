//! Scripted source and sink wrappers shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use page_harvester::harvest::{DiscoveryError, PaginationTraverser, RunConfig};
use page_harvester::output::csv::CsvRecordSink;
use page_harvester::output::{OutputError, OutputResult, RecordSink, WriteMode};
use page_harvester::resume::{CheckpointState, StateStore};
use page_harvester::source::{ExtractionSource, SourceError, SourceResult};
use page_harvester::{PageResult, Record};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tempfile::TempDir;

/// Deterministic paginated source
///
/// Page `n` holds `per_page` records `{page, row, label}`. The fetch log is
/// shared so tests can inspect it after the traverser is consumed.
pub struct ScriptedSource {
    pub pages: u64,
    pub per_page: u64,
    pub discoverable: bool,
    pub jumpable: bool,
    pub timeout_at: Option<u64>,
    pub fetches: Arc<Mutex<Vec<(u64, Instant)>>>,
    pub sessions_closed: Arc<Mutex<u32>>,
}

impl ScriptedSource {
    pub fn new(pages: u64, per_page: u64) -> Self {
        Self {
            pages,
            per_page,
            discoverable: true,
            jumpable: true,
            timeout_at: None,
            fetches: Arc::new(Mutex::new(Vec::new())),
            sessions_closed: Arc::new(Mutex::new(0)),
        }
    }

    pub fn timing_out_at(mut self, page: u64) -> Self {
        self.timeout_at = Some(page);
        self
    }

    pub fn undiscoverable(mut self) -> Self {
        self.discoverable = false;
        self
    }

    pub fn step_only(mut self) -> Self {
        self.jumpable = false;
        self
    }

    pub fn fetched_pages(&self) -> Vec<u64> {
        self.fetches.lock().unwrap().iter().map(|(p, _)| *p).collect()
    }
}

pub fn record(page: u64, row: u64) -> Record {
    Record::new()
        .with("page", page.to_string())
        .with("row", row.to_string())
        .with("label", format!("Sighting {page}.{row}, \"bright\""))
}

#[async_trait]
impl ExtractionSource for ScriptedSource {
    type Session = u64;

    async fn connect(&self) -> SourceResult<u64> {
        Ok(1)
    }

    async fn discover_total_pages(&self, _session: &mut u64) -> Result<u64, DiscoveryError> {
        if !self.discoverable {
            return Err(DiscoveryError::Unparsable("Showing entries".to_string()));
        }
        Ok(self.pages)
    }

    async fn fetch_page(&self, session: &mut u64, page: u64) -> SourceResult<PageResult> {
        if *session != page {
            return Err(SourceError::NavigationError(format!(
                "session is on page {session}, asked for {page}"
            )));
        }
        if self.timeout_at == Some(page) {
            return Err(SourceError::FetchTimeout {
                page,
                message: "table did not render".to_string(),
            });
        }
        self.fetches.lock().unwrap().push((page, Instant::now()));
        Ok(PageResult::new(
            page,
            (1..=self.per_page).map(|row| record(page, row)).collect(),
        ))
    }

    async fn advance(&self, session: &mut u64) -> SourceResult<bool> {
        if *session >= self.pages {
            return Ok(false);
        }
        *session += 1;
        Ok(true)
    }

    async fn reposition(&self, session: &mut u64, page: u64) -> SourceResult<bool> {
        if !self.jumpable || page > self.pages {
            return Ok(false);
        }
        *session = page;
        Ok(true)
    }

    async fn disconnect(&self, _session: u64) {
        *self.sessions_closed.lock().unwrap() += 1;
    }
}

/// CSV sink that starts failing after a number of successful writes
pub struct FailingSink {
    pub inner: CsvRecordSink,
    pub writes_left: usize,
}

impl RecordSink for FailingSink {
    fn write(&mut self, records: &[Record], mode: WriteMode) -> OutputResult<u64> {
        if self.writes_left == 0 {
            return Err(OutputError::IoError("No space left on device".to_string()));
        }
        self.writes_left -= 1;
        self.inner.write(records, mode)
    }

    fn reconcile(&mut self, committed: u64) -> OutputResult<u64> {
        self.inner.reconcile(committed)
    }
}

/// CSV sink that records the checkpoint on disk at every write
pub struct CheckpointSpySink {
    pub inner: CsvRecordSink,
    pub store: StateStore,
    pub seen: Arc<Mutex<Vec<CheckpointState>>>,
}

impl RecordSink for CheckpointSpySink {
    fn write(&mut self, records: &[Record], mode: WriteMode) -> OutputResult<u64> {
        let checkpoint = self
            .store
            .load()
            .map_err(|e| OutputError::IoError(e.to_string()))?;
        self.seen.lock().unwrap().push(checkpoint);
        self.inner.write(records, mode)
    }

    fn reconcile(&mut self, committed: u64) -> OutputResult<u64> {
        self.inner.reconcile(committed)
    }
}

/// Output directory layout used by the binary
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.path().join("records.csv")
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.path().join(".harvest_state.json")
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(self.state_path())
    }

    pub fn sink(&self) -> CsvRecordSink {
        CsvRecordSink::new(self.output_path())
    }

    pub fn output(&self) -> String {
        std::fs::read_to_string(self.output_path()).unwrap()
    }

    pub fn traverser<S: ExtractionSource>(
        &self,
        source: S,
        batch_interval: u64,
    ) -> PaginationTraverser<S, CsvRecordSink> {
        PaginationTraverser::new(
            fast_config(batch_interval),
            source,
            self.sink(),
            self.store(),
        )
    }
}

pub fn fast_config(batch_interval: u64) -> RunConfig {
    RunConfig::default()
        .without_delay()
        .with_batch_interval(batch_interval)
}

/// Data rows in a CSV file, header excluded
pub fn data_rows(csv: &str) -> Vec<&str> {
    csv.lines().skip(1).collect()
}
