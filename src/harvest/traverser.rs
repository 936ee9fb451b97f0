//! Pagination state machine
//!
//! Drives an [`ExtractionSource`] page by page, buffers records in a
//! [`BatchAccumulator`] and commits them to a [`RecordSink`] every
//! `batch_interval` pages. A commit is always sink write first, checkpoint
//! second: a crash between the two leaves surplus rows that the next run's
//! `reconcile` removes, never a checkpoint ahead of the data.

use crate::harvest::batch::BatchAccumulator;
use crate::harvest::config::{RepositionStrategy, RunConfig};
use crate::harvest::progress::ProgressState;
use crate::harvest::rate_limit::JitterDelay;
use crate::harvest::{HarvestError, RunFailure, RunSummary};
use crate::metrics;
use crate::output::{RecordSink, WriteMode};
use crate::resume::{CheckpointState, StateStore};
use crate::shutdown::SharedShutdown;
use crate::source::ExtractionSource;
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Traversal states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalState {
    /// Reading the page total
    Discovering,
    /// Moving the source to the resume page
    Resuming,
    /// Requesting the current page
    FetchingPage,
    /// Committing the buffer
    Flushing,
    /// Moving to the next page
    Advancing,
    /// Finished; checkpoint removed
    Done,
    /// Fatal error; checkpoint retained
    Failed,
}

/// Positions of the traversal loop. A run reaches [`TraversalState::Failed`]
/// only when the loop returns an error, so it has no phase here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Discovering,
    Resuming,
    FetchingPage,
    Flushing,
    Advancing,
    Done,
}

impl From<Phase> for TraversalState {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Discovering => TraversalState::Discovering,
            Phase::Resuming => TraversalState::Resuming,
            Phase::FetchingPage => TraversalState::FetchingPage,
            Phase::Flushing => TraversalState::Flushing,
            Phase::Advancing => TraversalState::Advancing,
            Phase::Done => TraversalState::Done,
        }
    }
}

/// Mutable state of one run
struct RunContext {
    phase: Phase,
    state: TraversalState,
    checkpoint: CheckpointState,
    /// First flush must truncate the sink
    fresh: bool,
    resume_page: u64,
    current_page: u64,
    last_page: Option<u64>,
    last_fetched: Option<u64>,
    batch: BatchAccumulator,
    progress: ProgressState,
    pages_fetched: u64,
    records_this_run: u64,
    flushes: u64,
}

impl RunContext {
    fn new(checkpoint: CheckpointState) -> Self {
        let resume_page = checkpoint.resume_page();
        Self {
            phase: Phase::Discovering,
            state: TraversalState::Discovering,
            checkpoint,
            fresh: checkpoint.is_fresh(),
            resume_page,
            current_page: resume_page,
            last_page: None,
            last_fetched: None,
            batch: BatchAccumulator::new(),
            progress: ProgressState::new(resume_page, None),
            pages_fetched: 0,
            records_this_run: 0,
            flushes: 0,
        }
    }

    fn transition(&mut self, next: Phase) {
        self.enter(next.into());
        self.phase = next;
    }

    fn enter(&mut self, next: TraversalState) {
        debug!(from = ?self.state, to = ?next, page = self.current_page, "State transition");
        self.state = next;
    }

    fn is_last_page(&self) -> bool {
        self.last_page.is_some_and(|last| self.current_page >= last)
    }

    fn flush_due(&self, batch_interval: u64) -> bool {
        let fetched_this_run = self.current_page + 1 - self.resume_page;
        fetched_this_run % batch_interval == 0 || self.is_last_page()
    }
}

/// Resumable traversal of a paginated source
pub struct PaginationTraverser<S: ExtractionSource, K: RecordSink> {
    config: RunConfig,
    source: S,
    sink: K,
    store: StateStore,
    delay: JitterDelay,
    shutdown: Option<SharedShutdown>,
}

impl<S: ExtractionSource, K: RecordSink> PaginationTraverser<S, K> {
    /// Create a traverser
    pub fn new(config: RunConfig, source: S, sink: K, store: StateStore) -> Self {
        let delay = JitterDelay::from_config(&config);
        Self {
            config,
            source,
            sink,
            store,
            delay,
            shutdown: None,
        }
    }

    /// Stop at the next page boundary once shutdown is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.delay = self.delay.with_shutdown(shutdown.clone());
        self.shutdown = Some(shutdown);
        self
    }

    /// Run configuration
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The sink
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Checkpoint store
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Take the traverser apart
    pub fn into_parts(self) -> (S, K, StateStore) {
        (self.source, self.sink, self.store)
    }

    /// Traverse from the checkpoint to the last page
    ///
    /// On success the checkpoint is removed. On failure it holds the last
    /// successful flush and the returned [`RunFailure`] names the page the
    /// next run starts from.
    pub async fn run(&mut self) -> Result<RunSummary, RunFailure> {
        let started_at = Utc::now();

        if let Err(e) = self.config.validate() {
            return Err(self.fail(RunFailure::without_checkpoint(e.into())));
        }

        let checkpoint = match self.store.load() {
            Ok(cp) => cp,
            Err(e) => return Err(self.fail(RunFailure::without_checkpoint(e.into()))),
        };

        if checkpoint.is_fresh() {
            info!("No checkpoint found, starting fresh from page 1");
        } else {
            info!(
                last_page = checkpoint.last_page,
                total_records = checkpoint.total_records,
                resume_page = checkpoint.resume_page(),
                "Resuming from checkpoint"
            );
        }

        let mut session = match self.source.connect().await {
            Ok(session) => session,
            Err(e) => return Err(self.fail(RunFailure::new(e.into(), checkpoint))),
        };

        let mut ctx = RunContext::new(checkpoint);
        let outcome = self.traverse(&mut session, &mut ctx).await;
        self.source.disconnect(session).await;

        match outcome {
            Ok(()) => {
                let summary = RunSummary {
                    first_page: ctx.resume_page,
                    last_page: ctx.last_fetched,
                    total_pages: ctx.last_page,
                    pages_fetched: ctx.pages_fetched,
                    records_this_run: ctx.records_this_run,
                    total_records: ctx.checkpoint.total_records,
                    flushes: ctx.flushes,
                    started_at,
                    finished_at: Utc::now(),
                };
                metrics::record_run_completed(summary.total_records);
                info!(
                    total_records = summary.total_records,
                    records_this_run = summary.records_this_run,
                    pages_fetched = summary.pages_fetched,
                    "Harvest complete"
                );
                Ok(summary)
            }
            Err(e) => {
                ctx.enter(TraversalState::Failed);
                Err(self.fail(RunFailure::new(e, ctx.checkpoint)))
            }
        }
    }

    fn fail(&self, failure: RunFailure) -> RunFailure {
        metrics::record_run_failed(failure.error.kind());
        error!(
            error = %failure.error,
            resume_page = ?failure.resume_page(),
            "Harvest failed"
        );
        failure
    }

    async fn traverse(
        &mut self,
        session: &mut S::Session,
        ctx: &mut RunContext,
    ) -> Result<(), HarvestError> {
        loop {
            match ctx.phase {
                Phase::Discovering => {
                    self.discover(session, ctx).await;
                    ctx.transition(Phase::Resuming);
                }
                Phase::Resuming => {
                    if !ctx.fresh {
                        let removed = self.sink.reconcile(ctx.checkpoint.total_records)?;
                        if removed > 0 {
                            warn!(
                                removed,
                                committed = ctx.checkpoint.total_records,
                                "Dropped uncommitted rows left by an earlier run"
                            );
                        }
                    }

                    if ctx.last_page.is_some_and(|last| ctx.resume_page > last) {
                        info!(
                            resume_page = ctx.resume_page,
                            last_page = ?ctx.last_page,
                            "Nothing left to fetch"
                        );
                        ctx.transition(Phase::Done);
                        continue;
                    }

                    if ctx.resume_page > 1 {
                        self.reposition(session, ctx.resume_page).await?;
                    }
                    ctx.transition(Phase::FetchingPage);
                }
                Phase::FetchingPage => {
                    if self.shutdown_requested() {
                        return Err(self.interrupt(ctx));
                    }
                    self.fetch(session, ctx).await?;
                    if ctx.flush_due(self.config.batch_interval) {
                        ctx.transition(Phase::Flushing);
                    } else {
                        ctx.transition(Phase::Advancing);
                    }
                }
                Phase::Flushing => {
                    self.flush(ctx, false)?;
                    ctx.transition(Phase::Advancing);
                }
                Phase::Advancing => {
                    if ctx.is_last_page() {
                        ctx.transition(Phase::Done);
                        continue;
                    }
                    let has_next = match self.source.advance(session).await {
                        Ok(has_next) => has_next,
                        Err(e) => {
                            self.best_effort_flush(ctx);
                            return Err(e.into());
                        }
                    };
                    if !has_next {
                        info!(page = ctx.current_page, "Source reports no further page");
                        ctx.transition(Phase::Done);
                        continue;
                    }
                    if self.delay.wait().await.is_err() {
                        ctx.current_page += 1;
                        return Err(self.interrupt(ctx));
                    }
                    ctx.current_page += 1;
                    ctx.transition(Phase::FetchingPage);
                }
                Phase::Done => {
                    if ctx.batch.pages() > 0 || ctx.fresh {
                        self.flush(ctx, false)?;
                    }
                    self.store.clear()?;
                    return Ok(());
                }
            }
        }
    }

    async fn discover(&self, session: &mut S::Session, ctx: &mut RunContext) {
        let discovered = match self.source.discover_total_pages(session).await {
            Ok(total) => {
                info!(total_pages = total, "Discovered page count");
                Some(total)
            }
            Err(e) => {
                warn!(error = %e, "Could not determine page count, scanning until the source runs out");
                None
            }
        };

        ctx.last_page = match (discovered, self.config.page_limit) {
            (Some(total), Some(limit)) => Some(total.min(limit)),
            (None, Some(limit)) => Some(limit),
            (total, None) => total,
        };
        if let (Some(limit), Some(last)) = (self.config.page_limit, ctx.last_page) {
            if last == limit {
                debug!(page_limit = limit, "Page limit caps the traversal");
            }
        }
        ctx.progress = ProgressState::new(ctx.resume_page, ctx.last_page);
    }

    async fn reposition(&self, session: &mut S::Session, target: u64) -> Result<(), HarvestError> {
        let navigation = |reason: String| HarvestError::ResumeNavigation { target, reason };

        let jumped = match self.config.reposition {
            RepositionStrategy::Step => false,
            RepositionStrategy::Jump | RepositionStrategy::JumpThenStep => self
                .source
                .reposition(session, target)
                .await
                .map_err(|e| navigation(e.to_string()))?,
        };
        if jumped {
            info!(page = target, "Jumped to resume page");
            return Ok(());
        }

        if self.config.reposition == RepositionStrategy::Jump {
            return Err(navigation("page is not directly addressable".to_string()));
        }

        debug!(page = target, "Stepping to resume page");
        for page in 1..target {
            let moved = self
                .source
                .advance(session)
                .await
                .map_err(|e| navigation(e.to_string()))?;
            if !moved {
                return Err(navigation(format!("source ran out of pages at page {page}")));
            }
        }
        info!(page = target, "Stepped to resume page");
        Ok(())
    }

    async fn fetch(&mut self, session: &mut S::Session, ctx: &mut RunContext) -> Result<(), HarvestError> {
        let page = ctx.current_page;
        let started = Instant::now();
        let result = match self.source.fetch_page(session, page).await {
            Ok(result) => result,
            Err(e) => {
                warn!(page, error = %e, "Page fetch failed");
                self.best_effort_flush(ctx);
                return Err(e.into());
            }
        };

        let records = result.records.len();
        metrics::record_page_fetched(started.elapsed(), records);
        debug!(page, records, "Fetched page");

        if let Err(e) = ctx.batch.add(result) {
            self.best_effort_flush(ctx);
            return Err(HarvestError::Source(e.to_string()));
        }
        ctx.pages_fetched += 1;
        ctx.last_fetched = Some(page);

        ctx.progress.record_page(records as u64);
        if ctx.progress.should_emit_update() {
            info!("{}", ctx.progress.format_progress(page));
            ctx.progress.mark_emitted();
        }
        Ok(())
    }

    /// Commit the buffer: sink write, then checkpoint, then clear
    fn flush(&mut self, ctx: &mut RunContext, best_effort: bool) -> Result<(), HarvestError> {
        let mode = if ctx.fresh {
            WriteMode::Overwrite
        } else {
            WriteMode::Append
        };

        let written = if ctx.batch.is_empty() && mode == WriteMode::Append {
            0
        } else {
            self.sink.write(ctx.batch.records(), mode)?
        };
        ctx.fresh = false;

        let covered = if ctx.batch.pages() > 0 {
            ctx.batch.last_page()
        } else {
            None
        };
        let next = CheckpointState::new(
            covered.unwrap_or(ctx.checkpoint.last_page),
            ctx.checkpoint.total_records + written,
        );
        self.store.save(&next)?;
        ctx.checkpoint = next;
        let batch = ctx.batch.drain();

        ctx.records_this_run += written;
        ctx.flushes += 1;
        metrics::record_flush(written, best_effort);
        info!(
            records = written,
            pages = batch.pages,
            last_page = next.last_page,
            total_records = next.total_records,
            ?mode,
            "Flushed batch"
        );
        Ok(())
    }

    fn best_effort_flush(&mut self, ctx: &mut RunContext) {
        if ctx.batch.pages() == 0 {
            return;
        }
        ctx.transition(Phase::Flushing);
        if let Err(e) = self.flush(ctx, true) {
            warn!(error = %e, "Best-effort flush failed, buffered pages will be fetched again");
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|s| s.is_shutdown_requested())
    }

    fn interrupt(&mut self, ctx: &mut RunContext) -> HarvestError {
        warn!(page = ctx.current_page, "Shutdown requested, saving progress");
        self.best_effort_flush(ctx);
        HarvestError::Interrupted {
            page: ctx.current_page,
        }
    }
}
