//! Harvest metrics
//!
//! Counters and histograms for page fetches, flushes and run outcomes.
//!
//! ## Architecture
//!
//! - Uses the `metrics` crate facade; without an installed recorder every
//!   macro is a no-op
//! - `init_metrics` installs a Prometheus exporter with a scrape listener
//! - Recording helpers are plain functions called from the traverser

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: later calls are ignored once an exporter is installed.
///
/// # Arguments
/// * `addr` - Socket address for the scrape endpoint (e.g. "127.0.0.1:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "pages_fetched_total",
        Unit::Count,
        "Total number of pages fetched from the source"
    );

    describe_histogram!(
        "page_fetch_duration_seconds",
        Unit::Seconds,
        "Time spent fetching a single page"
    );

    describe_counter!(
        "records_flushed_total",
        Unit::Count,
        "Total number of records committed to the sink"
    );

    describe_counter!("flushes_total", Unit::Count, "Total number of batch flushes");

    describe_counter!(
        "checkpoint_saves_total",
        Unit::Count,
        "Total number of checkpoints persisted"
    );

    describe_counter!(
        "runs_completed_total",
        Unit::Count,
        "Total number of runs that reached completion"
    );

    describe_counter!(
        "runs_failed_total",
        Unit::Count,
        "Total number of runs that ended in failure"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Record a fetched page
pub fn record_page_fetched(duration: Duration, records: usize) {
    counter!("pages_fetched_total").increment(1);
    histogram!("page_fetch_duration_seconds").record(duration.as_secs_f64());

    debug!(
        records = records,
        duration_ms = duration.as_millis() as u64,
        "Page fetch recorded"
    );
}

/// Record a flush and the checkpoint save that followed it
pub fn record_flush(records: u64, best_effort: bool) {
    counter!(
        "flushes_total",
        "best_effort" => best_effort.to_string(),
    )
    .increment(1);
    counter!("records_flushed_total").increment(records);
    counter!("checkpoint_saves_total").increment(1);
}

/// Record a completed run
pub fn record_run_completed(total_records: u64) {
    counter!("runs_completed_total").increment(1);
    debug!(total_records = total_records, "Run completion recorded");
}

/// Record a failed run
pub fn record_run_failed(kind: &'static str) {
    counter!(
        "runs_failed_total",
        "error" => kind,
    )
    .increment(1);
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}
