//! Status and reset subcommands

use super::run::{Cli, OutputFormat};
use super::CliError;
use crate::output::csv::count_rows;
use crate::resume::{ResumeError, RunLock, StateStore};
use clap::Parser;
use serde_json::json;
use tracing::info;

/// Show checkpoint progress
#[derive(Parser, Debug)]
pub struct StatusCommand {}

impl StatusCommand {
    /// Execute the status command
    ///
    /// A corrupt checkpoint is reported as an error, never as "no checkpoint".
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let store = StateStore::new(cli.state_path());
        let exists = store.exists();
        let checkpoint = store.load()?;

        let output = cli.output_path();
        let rows = if output.exists() {
            Some(count_rows(&output)?)
        } else {
            None
        };

        match cli.output_format {
            OutputFormat::Json => {
                let value = json!({
                    "checkpoint": exists.then_some(checkpoint),
                    "resume_page": checkpoint.resume_page(),
                    "output": output.display().to_string(),
                    "output_rows": rows,
                });
                println!("{value}");
            }
            OutputFormat::Human => {
                if exists {
                    println!("Checkpoint: {}", store.path().display());
                    println!("Last completed page: {}", checkpoint.last_page);
                    println!("Records committed: {}", checkpoint.total_records);
                } else {
                    println!("No checkpoint");
                }
                println!("Next run starts at page {}", checkpoint.resume_page());
                if let Some(rows) = rows {
                    println!("Rows in {}: {}", output.display(), rows);
                    if exists && rows > checkpoint.total_records {
                        println!(
                            "Note: {} rows beyond the checkpoint will be dropped on the next run",
                            rows - checkpoint.total_records
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

/// Discard checkpoint progress
#[derive(Parser, Debug)]
pub struct ResetCommand {}

impl ResetCommand {
    /// Execute the reset command
    ///
    /// The output file is left in place; the next run truncates it on its
    /// first flush.
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let _lock = RunLock::try_acquire(&cli.output_dir).map_err(|e| match e {
            ResumeError::LockError(_) => CliError::Locked(cli.output_dir.clone()),
            other => other.into(),
        })?;

        let store = StateStore::new(cli.state_path());
        if store.exists() {
            store.clear()?;
            info!(path = %store.path().display(), "Checkpoint removed");
            println!("Checkpoint removed; the next run starts at page 1");
        } else {
            println!("No checkpoint to remove");
        }
        Ok(())
    }
}
