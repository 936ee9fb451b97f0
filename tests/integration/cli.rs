//! Integration tests for the page-harvester binary

use assert_cmd::Command;
use page_harvester::resume::{CheckpointState, StateStore};
use tempfile::TempDir;

fn harvester(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("page-harvester").unwrap();
    cmd.env("RUST_LOG", "off")
        .env_remove("HARVEST_SOURCE_URL")
        .env_remove("HARVEST_OUTPUT_FORMAT")
        .arg("--output-dir")
        .arg(dir.path());
    cmd
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_help_lists_subcommands() {
    let output = Command::cargo_bin("page-harvester")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .clone();
    let text = stdout(&output);
    assert!(text.contains("run"));
    assert!(text.contains("status"));
    assert!(text.contains("reset"));
}

#[test]
fn test_status_without_checkpoint() {
    let dir = TempDir::new().unwrap();
    let output = harvester(&dir)
        .arg("status")
        .assert()
        .success()
        .get_output()
        .clone();
    let text = stdout(&output);
    assert!(text.contains("No checkpoint"));
    assert!(text.contains("Next run starts at page 1"));
}

#[test]
fn test_status_reports_resume_page() {
    let dir = TempDir::new().unwrap();
    StateStore::new(dir.path().join(".harvest_state.json"))
        .save(&CheckpointState::new(40, 4000))
        .unwrap();

    let output = harvester(&dir)
        .args(["--output-format", "json", "status"])
        .assert()
        .success()
        .get_output()
        .clone();
    let value: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(value["resume_page"], 41);
    assert_eq!(value["checkpoint"]["total_records"], 4000);
}

#[test]
fn test_status_with_corrupt_checkpoint_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(".harvest_state.json"), "not json").unwrap();

    harvester(&dir).arg("status").assert().failure();
    assert!(dir.path().join(".harvest_state.json").exists());
}

#[test]
fn test_reset_removes_checkpoint() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join(".harvest_state.json");
    StateStore::new(&state)
        .save(&CheckpointState::new(3, 30))
        .unwrap();

    harvester(&dir).arg("reset").assert().success();
    assert!(!state.exists());

    // idempotent
    harvester(&dir).arg("reset").assert().success();
}

#[test]
fn test_run_without_source_url_fails() {
    let dir = TempDir::new().unwrap();
    let output = harvester(&dir).arg("run").assert().failure().get_output().clone();
    assert!(String::from_utf8_lossy(&output.stderr).contains("source URL"));
}

#[test]
fn test_run_rejects_zero_batch_interval() {
    let dir = TempDir::new().unwrap();
    harvester(&dir)
        .args([
            "run",
            "--source-url",
            "http://127.0.0.1:9/ajax",
            "--batch-interval",
            "0",
        ])
        .assert()
        .failure();
}

#[test]
fn test_run_against_unreachable_source_keeps_no_checkpoint() {
    let dir = TempDir::new().unwrap();
    harvester(&dir)
        .args([
            "run",
            "--source-url",
            "http://127.0.0.1:9/ajax",
            "--timeout-secs",
            "2",
            "--min-delay-ms",
            "0",
            "--max-delay-ms",
            "0",
        ])
        .assert()
        .failure();
    assert!(!dir.path().join(".harvest_state.json").exists());
}
