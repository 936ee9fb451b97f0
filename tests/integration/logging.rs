//! Integration tests for logging and tracing

use super::support::{ScriptedSource, Workspace};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Shared buffer a subscriber writes into
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_env_filter_drops_events_below_level() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("info"))
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        debug!(page = 3, "Requesting page");
        warn!(error = "missing counts", "Could not determine page count");
    });

    let text = captured.text();
    assert!(!text.contains("Requesting page"));
    assert!(text.contains("WARN"));
    assert!(text.contains("Could not determine page count"));
    assert!(text.contains("error=\"missing counts\""));
}

#[test]
fn test_json_format_carries_structured_fields() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new("info"))
        .with_writer(move || writer.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        info!(page = 12, records = 100, "Fetched page");
    });

    let text = captured.text();
    let line: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
    assert_eq!(line["level"], "INFO");
    assert_eq!(line["fields"]["message"], "Fetched page");
    assert_eq!(line["fields"]["page"], 12);
    assert_eq!(line["fields"]["records"], 100);
}

#[tokio::test]
async fn test_traversal_with_debug_logging() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("page_harvester=debug"))
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let ws = Workspace::new();
    let summary = ws
        .traverser(ScriptedSource::new(4, 2), 2)
        .run()
        .await
        .unwrap();
    assert_eq!(summary.total_records, 8);

    let text = captured.text();
    assert!(text.contains("No checkpoint found, starting fresh from page 1"));
    assert!(text.contains("State transition"));
    assert!(text.contains("Harvest complete"));
    assert!(text.contains("total_records=8"));
}
