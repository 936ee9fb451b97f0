//! Progress tracking for long-running harvests.
//!
//! Computes percentage complete, throughput and time remaining against the
//! discovered page total, and decides when a `[PROGRESS]` log line is due.

use std::time::{Duration, Instant};

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_PERCENTAGE_STEP: f64 = 10.0;

/// Progress state for one run.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Pages fetched in this run.
    pub pages_fetched: u64,
    /// Records fetched in this run.
    pub records_fetched: u64,
    /// First page of this run.
    pub first_page: u64,
    /// Last page, if discovery succeeded.
    pub last_page: Option<u64>,
    /// When the run started.
    pub start_time: Instant,
    /// When progress was last reported.
    pub last_update: Instant,
    /// Minimum time between reports.
    pub update_interval: Duration,
    /// Percentage reported last time.
    pub last_reported_percentage: f64,
    /// Percentage delta that forces a report regardless of time.
    pub min_percentage_step: f64,
}

impl ProgressState {
    /// Start tracking a run that begins at `first_page`.
    pub fn new(first_page: u64, last_page: Option<u64>) -> Self {
        let now = Instant::now();
        Self {
            pages_fetched: 0,
            records_fetched: 0,
            first_page,
            last_page,
            start_time: now,
            last_update: now,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            last_reported_percentage: 0.0,
            min_percentage_step: DEFAULT_PERCENTAGE_STEP,
        }
    }

    /// Override the reporting cadence.
    pub fn with_cadence(mut self, update_interval: Duration, min_percentage_step: f64) -> Self {
        self.update_interval = update_interval;
        self.min_percentage_step = min_percentage_step;
        self
    }

    /// Record a fetched page.
    pub fn record_page(&mut self, records: u64) {
        self.pages_fetched += 1;
        self.records_fetched = self.records_fetched.saturating_add(records);
    }

    /// Pages this run is expected to fetch, if known.
    pub fn pages_expected(&self) -> Option<u64> {
        self.last_page
            .map(|last| (last + 1).saturating_sub(self.first_page))
    }

    /// Completion percentage of this run (0-100), if the total is known.
    pub fn percentage(&self) -> Option<f64> {
        let expected = self.pages_expected()?;
        if expected == 0 {
            return Some(100.0);
        }
        Some((self.pages_fetched as f64 / expected as f64 * 100.0).min(100.0))
    }

    /// Pages per second so far.
    pub fn page_rate(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.pages_fetched as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Estimated time to the last page.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        let expected = self.pages_expected()?;
        let rate = self.page_rate();
        if rate <= 0.0 {
            return None;
        }
        let remaining = expected.saturating_sub(self.pages_fetched);
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    /// Whether a report is due by time or percentage step.
    pub fn should_emit_update(&self) -> bool {
        if self.pages_fetched == 0 {
            return false;
        }
        let jumped = self
            .percentage()
            .map(|pct| pct - self.last_reported_percentage >= self.min_percentage_step)
            .unwrap_or(false);
        jumped || self.last_update.elapsed() >= self.update_interval
    }

    /// Reset timers after a report.
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        if let Some(pct) = self.percentage() {
            self.last_reported_percentage = pct;
        }
    }

    /// Human-readable progress line.
    pub fn format_progress(&self, current_page: u64) -> String {
        let mut parts = vec![match self.last_page {
            Some(last) => format!("[PROGRESS] Page {current_page}/{last}"),
            None => format!("[PROGRESS] Page {current_page}"),
        }];
        parts.push(format!("- {} records this run", self.records_fetched));
        if let Some(pct) = self.percentage() {
            parts.push(format!("- {pct:.1}% complete"));
        }
        let rate = self.page_rate();
        if rate > 0.0 {
            parts.push(format!("at {:.1} pages/min", rate * 60.0));
        }
        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }
        parts.join(" ")
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
