//! Integration tests for checkpoint/resume behavior across interrupted runs

use super::support::{
    data_rows, fast_config, CheckpointSpySink, FailingSink, ScriptedSource, Workspace,
};
use page_harvester::harvest::{HarvestError, PaginationTraverser};
use page_harvester::resume::CheckpointState;
use page_harvester::shutdown::ShutdownCoordinator;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Output of an uninterrupted run
async fn baseline(pages: u64, per_page: u64, batch_interval: u64) -> String {
    let ws = Workspace::new();
    ws.traverser(ScriptedSource::new(pages, per_page), batch_interval)
        .run()
        .await
        .unwrap();
    ws.output()
}

#[tokio::test]
async fn test_resume_after_timeout_matches_uninterrupted_run() {
    let expected = baseline(10, 3, 3).await;
    let ws = Workspace::new();

    let failure = ws
        .traverser(ScriptedSource::new(10, 3).timing_out_at(8), 3)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(failure.error, HarvestError::FetchTimeout { page: 8, .. }));
    // page 7 was buffered and saved by the flush before the error surfaced
    assert_eq!(failure.resume_page(), Some(8));
    assert_eq!(ws.store().load().unwrap(), CheckpointState::new(7, 21));
    assert!(failure.to_string().contains("resume from page 8"));

    let source = ScriptedSource::new(10, 3);
    let fetches = source.fetches.clone();
    let summary = ws.traverser(source, 3).run().await.unwrap();

    let refetched: Vec<u64> = fetches.lock().unwrap().iter().map(|(p, _)| *p).collect();
    assert_eq!(refetched, vec![8, 9, 10]);
    assert_eq!(summary.first_page, 8);
    assert_eq!(summary.records_this_run, 9);
    assert_eq!(summary.total_records, 30);
    assert_eq!(ws.output(), expected);
    assert!(!ws.state_path().exists());
}

#[tokio::test]
async fn test_loss_after_sink_failure_is_bounded_to_one_batch() {
    let expected = baseline(10, 2, 3).await;
    let ws = Workspace::new();

    let mut failing = PaginationTraverser::new(
        fast_config(3),
        ScriptedSource::new(10, 2),
        FailingSink {
            inner: ws.sink(),
            writes_left: 2,
        },
        ws.store(),
    );
    let failure = failing.run().await.unwrap_err();
    assert!(matches!(failure.error, HarvestError::Persistence(_)));

    // pages 7-9 were buffered when the third write failed
    assert_eq!(ws.store().load().unwrap(), CheckpointState::new(6, 12));
    assert_eq!(data_rows(&ws.output()).len(), 12);

    let source = ScriptedSource::new(10, 2);
    let fetches = source.fetches.clone();
    ws.traverser(source, 3).run().await.unwrap();

    let refetched: Vec<u64> = fetches.lock().unwrap().iter().map(|(p, _)| *p).collect();
    assert_eq!(refetched, vec![7, 8, 9, 10]);
    assert_eq!(ws.output(), expected);
}

#[tokio::test]
async fn test_rows_written_without_checkpoint_are_dropped_on_resume() {
    let expected = baseline(6, 2, 2).await;
    let ws = Workspace::new();

    ws.traverser(ScriptedSource::new(6, 2).timing_out_at(5), 2)
        .run()
        .await
        .unwrap_err();
    assert_eq!(ws.store().load().unwrap(), CheckpointState::new(4, 8));

    // a flush that reached the file but died before the checkpoint save
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(ws.output_path())
        .unwrap();
    file.write_all(b"5,1,\"Sighting 5.1, \"\"bright\"\"\"\n5,2,partial\n")
        .unwrap();
    drop(file);
    assert_eq!(data_rows(&ws.output()).len(), 10);

    ws.traverser(ScriptedSource::new(6, 2), 2).run().await.unwrap();
    assert_eq!(ws.output(), expected);
}

#[tokio::test]
async fn test_sink_behind_checkpoint_fails_before_fetching() {
    let ws = Workspace::new();
    std::fs::write(ws.output_path(), "page,row,label\n1,1,x\n").unwrap();
    ws.store().save(&CheckpointState::new(4, 8)).unwrap();

    let source = ScriptedSource::new(6, 2);
    let fetches = source.fetches.clone();
    let failure = ws.traverser(source, 2).run().await.unwrap_err();

    assert!(matches!(failure.error, HarvestError::Persistence(_)));
    assert!(fetches.lock().unwrap().is_empty());
    assert_eq!(ws.store().load().unwrap(), CheckpointState::new(4, 8));
}

#[tokio::test]
async fn test_checkpoint_never_moves_backwards() {
    let ws = Workspace::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut traverser = PaginationTraverser::new(
        fast_config(3),
        ScriptedSource::new(20, 2),
        CheckpointSpySink {
            inner: ws.sink(),
            store: ws.store(),
            seen: seen.clone(),
        },
        ws.store(),
    );
    let summary = traverser.run().await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len() as u64, summary.flushes);
    assert_eq!(seen[0], CheckpointState::default());
    for pair in seen.windows(2) {
        assert!(pair[1].last_page > pair[0].last_page);
        assert!(pair[1].total_records >= pair[0].total_records);
    }
    // each write sees the state left by the previous flush
    assert_eq!(seen[1], CheckpointState::new(3, 6));
}

#[tokio::test]
async fn test_completed_run_leaves_no_checkpoint_and_next_run_starts_over() {
    let ws = Workspace::new();
    ws.traverser(ScriptedSource::new(5, 2), 2).run().await.unwrap();
    assert!(!ws.state_path().exists());
    assert_eq!(data_rows(&ws.output()).len(), 10);

    let source = ScriptedSource::new(3, 1);
    let fetches = source.fetches.clone();
    ws.traverser(source, 2).run().await.unwrap();

    let fetched: Vec<u64> = fetches.lock().unwrap().iter().map(|(p, _)| *p).collect();
    assert_eq!(fetched, vec![1, 2, 3]);
    let csv = ws.output();
    assert_eq!(csv.matches("page,row,label").count(), 1);
    assert_eq!(data_rows(&csv).len(), 3);
}

#[tokio::test]
async fn test_corrupt_checkpoint_is_kept_and_fails_the_run() {
    let ws = Workspace::new();
    std::fs::write(ws.state_path(), "{\"last_page\": \"twelve\"}").unwrap();

    let source = ScriptedSource::new(3, 1);
    let fetches = source.fetches.clone();
    let failure = ws.traverser(source, 2).run().await.unwrap_err();

    assert!(matches!(failure.error, HarvestError::CorruptCheckpoint(_)));
    assert_eq!(failure.resume_page(), None);
    assert!(fetches.lock().unwrap().is_empty());
    assert_eq!(
        std::fs::read_to_string(ws.state_path()).unwrap(),
        "{\"last_page\": \"twelve\"}"
    );
}

#[tokio::test]
async fn test_interrupted_run_saves_buffer_and_resumes() {
    let expected = baseline(30, 1, 50).await;
    let ws = Workspace::new();
    let shutdown = ShutdownCoordinator::shared();

    let mut traverser = PaginationTraverser::new(
        fast_config(50).with_delay(Duration::from_millis(20), Duration::from_millis(20)),
        ScriptedSource::new(30, 1),
        ws.sink(),
        ws.store(),
    )
    .with_shutdown(shutdown.clone());

    let trigger = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(90)).await;
            shutdown.request_shutdown();
        }
    });
    let failure = traverser.run().await.unwrap_err();
    trigger.await.unwrap();

    assert!(matches!(failure.error, HarvestError::Interrupted { .. }));
    // nothing reached a scheduled flush, so everything on disk came from the
    // flush performed on the way out
    let checkpoint = ws.store().load().unwrap();
    assert!(checkpoint.last_page >= 1);
    assert!(checkpoint.last_page < 30);
    assert_eq!(checkpoint.total_records, checkpoint.last_page);
    assert_eq!(
        data_rows(&ws.output()).len() as u64,
        checkpoint.total_records
    );

    ws.traverser(ScriptedSource::new(30, 1), 50).run().await.unwrap();
    assert_eq!(ws.output(), expected);
}
