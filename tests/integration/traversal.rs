//! End-to-end traversal into a real CSV file

use super::support::{data_rows, fast_config, ScriptedSource, Workspace};
use page_harvester::harvest::{HarvestError, PaginationTraverser, RepositionStrategy};
use page_harvester::output::csv::count_rows;
use page_harvester::resume::CheckpointState;

#[tokio::test]
async fn test_fresh_run_writes_one_header_and_every_record() {
    let ws = Workspace::new();
    let source = ScriptedSource::new(12, 4);
    let closed = source.sessions_closed.clone();

    let mut traverser = ws.traverser(source, 5);
    let summary = traverser.run().await.unwrap();

    assert_eq!(summary.total_records, 48);
    assert_eq!(summary.records_this_run, 48);
    assert_eq!(summary.pages_fetched, 12);
    assert_eq!(summary.total_pages, Some(12));
    // pages 5 and 10 on schedule, 12 as the last page
    assert_eq!(summary.flushes, 3);

    let csv = ws.output();
    assert_eq!(csv.lines().next(), Some("page,row,label"));
    assert_eq!(csv.matches("page,row,label").count(), 1);
    assert_eq!(data_rows(&csv).len(), 48);
    assert_eq!(data_rows(&csv)[0], "1,1,\"Sighting 1.1, \"\"bright\"\"\"");
    assert_eq!(count_rows(ws.output_path()).unwrap(), 48);

    assert!(!ws.state_path().exists());
    assert_eq!(*closed.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_records_keep_page_order() {
    let ws = Workspace::new();
    let mut traverser = ws.traverser(ScriptedSource::new(6, 2), 4);
    traverser.run().await.unwrap();

    let pages: Vec<u64> = data_rows(&ws.output())
        .iter()
        .map(|row| row.split(',').next().unwrap().parse().unwrap())
        .collect();
    assert_eq!(pages, vec![1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6]);
}

#[tokio::test]
async fn test_unparsable_page_count_scans_until_source_ends() {
    let ws = Workspace::new();
    let source = ScriptedSource::new(7, 1).undiscoverable();
    let fetches = source.fetches.clone();

    let mut traverser = ws.traverser(source, 3);
    let summary = traverser.run().await.unwrap();

    assert_eq!(summary.total_pages, None);
    assert_eq!(summary.total_records, 7);
    assert_eq!(fetches.lock().unwrap().len(), 7);
    assert!(!ws.state_path().exists());
}

#[tokio::test]
async fn test_page_limit_stops_early() {
    let ws = Workspace::new();
    let mut traverser = PaginationTraverser::new(
        fast_config(10).with_page_limit(Some(3)),
        ScriptedSource::new(50, 2),
        ws.sink(),
        ws.store(),
    );

    let summary = traverser.run().await.unwrap();
    assert_eq!(summary.total_pages, Some(3));
    assert_eq!(summary.total_records, 6);
}

#[tokio::test]
async fn test_empty_source_leaves_empty_output() {
    let ws = Workspace::new();
    std::fs::write(ws.output_path(), "stale,header\nold,row\n").unwrap();

    let mut traverser = ws.traverser(ScriptedSource::new(0, 5), 10);
    let summary = traverser.run().await.unwrap();

    assert_eq!(summary.total_records, 0);
    assert_eq!(ws.output(), "");
    assert!(!ws.state_path().exists());
}

#[tokio::test]
async fn test_pages_without_records_still_advance_checkpoint() {
    let ws = Workspace::new();
    let source = ScriptedSource::new(4, 0).timing_out_at(4);

    let mut traverser = ws.traverser(source, 2);
    let failure = traverser.run().await.unwrap_err();

    assert!(matches!(failure.error, HarvestError::FetchTimeout { page: 4, .. }));
    let checkpoint = ws.store().load().unwrap();
    assert_eq!(checkpoint.last_page, 3);
    assert_eq!(checkpoint.total_records, 0);
}

#[tokio::test]
async fn test_step_strategy_walks_to_resume_page() {
    let ws = Workspace::new();
    // a completed three-page run, then a checkpoint as if it had been cut short
    ws.traverser(ScriptedSource::new(3, 2), 10).run().await.unwrap();
    ws.store().save(&CheckpointState::new(3, 6)).unwrap();

    let source = ScriptedSource::new(5, 2).step_only();
    let fetches = source.fetches.clone();
    let mut traverser = PaginationTraverser::new(
        fast_config(10).with_reposition(RepositionStrategy::Step),
        source,
        ws.sink(),
        ws.store(),
    );
    let summary = traverser.run().await.unwrap();

    let fetched: Vec<u64> = fetches.lock().unwrap().iter().map(|(p, _)| *p).collect();
    assert_eq!(fetched, vec![4, 5]);
    assert_eq!(summary.total_records, 10);
    assert_eq!(data_rows(&ws.output()).len(), 10);
}
