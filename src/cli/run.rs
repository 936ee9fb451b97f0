//! Run command implementation

use crate::harvest::config::{
    RepositionStrategy, RunConfig, DEFAULT_BATCH_INTERVAL, DEFAULT_MAX_DELAY_MS,
    DEFAULT_MIN_DELAY_MS, DEFAULT_OUTPUT_DIR, DEFAULT_PAGE_SIZE, DEFAULT_REQUEST_TIMEOUT_SECS,
    MAX_PAGE_SIZE, OUTPUT_FILE_NAME, STATE_FILE_NAME,
};
use crate::harvest::{PaginationTraverser, RunSummary};
use crate::output::csv::CsvRecordSink;
use crate::resume::{RunLock, StateStore};
use crate::shutdown::SharedShutdown;
use crate::source::datatables::DataTablesHttpSource;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use super::status::{ResetCommand, StatusCommand};
use super::CliError;

/// Page Harvester CLI
#[derive(Parser, Debug)]
#[command(name = "page-harvester")]
#[command(about = "Resumable extraction of paginated table data into CSV", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human", env = "HARVEST_OUTPUT_FORMAT")]
    pub output_format: OutputFormat,

    /// Directory holding the CSV output, checkpoint and run lock
    #[arg(long, global = true, default_value = DEFAULT_OUTPUT_DIR, env = "HARVEST_OUTPUT_DIR")]
    pub output_dir: PathBuf,
}

impl Cli {
    /// Path of the CSV output file
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(OUTPUT_FILE_NAME)
    }

    /// Path of the checkpoint file
    pub fn state_path(&self) -> PathBuf {
        self.output_dir.join(STATE_FILE_NAME)
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Harvest all pages, resuming from the checkpoint if one exists
    Run(RunArgs),

    /// Show the checkpoint and the page the next run starts from
    Status(StatusCommand),

    /// Delete the checkpoint so the next run starts fresh
    Reset(ResetCommand),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// DataTables server-side-processing endpoint
    #[arg(long, env = "HARVEST_SOURCE_URL")]
    pub source_url: Option<String>,

    /// Pages fetched between flushes
    #[arg(long, default_value_t = DEFAULT_BATCH_INTERVAL, env = "HARVEST_BATCH_INTERVAL",
          value_parser = clap::value_parser!(u64).range(1..))]
    pub batch_interval: u64,

    /// Lower bound of the delay between pages, in milliseconds
    #[arg(long, default_value_t = DEFAULT_MIN_DELAY_MS, env = "HARVEST_MIN_DELAY_MS")]
    pub min_delay_ms: u64,

    /// Upper bound of the delay between pages, in milliseconds
    #[arg(long, default_value_t = DEFAULT_MAX_DELAY_MS, env = "HARVEST_MAX_DELAY_MS")]
    pub max_delay_ms: u64,

    /// Entries per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, env = "HARVEST_PAGE_SIZE",
          value_parser = clap::value_parser!(u64).range(1..=MAX_PAGE_SIZE))]
    pub page_size: u64,

    /// Stop after this page even if the source has more
    #[arg(long, env = "HARVEST_PAGE_LIMIT", value_parser = clap::value_parser!(u64).range(1..))]
    pub page_limit: Option<u64>,

    /// How to reach the resume page: jump, step or jump-then-step
    #[arg(long, default_value = "jump-then-step", env = "HARVEST_REPOSITION")]
    pub reposition: RepositionStrategy,

    /// Comma-separated column names for positional rows
    #[arg(long, env = "HARVEST_COLUMNS", value_delimiter = ',')]
    pub columns: Option<Vec<String>>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS, env = "HARVEST_TIMEOUT_SECS")]
    pub timeout_secs: u64,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, env = "HARVEST_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

impl RunArgs {
    /// Build the run configuration from the flags
    pub fn run_config(&self) -> Result<RunConfig, CliError> {
        let config = RunConfig::default()
            .with_batch_interval(self.batch_interval)
            .with_delay(
                Duration::from_millis(self.min_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            )
            .with_page_size(self.page_size)
            .with_reposition(self.reposition)
            .with_page_limit(self.page_limit);
        config.validate()?;
        Ok(config)
    }

    fn source(&self) -> Result<DataTablesHttpSource, CliError> {
        let url = self.source_url.as_deref().ok_or_else(|| {
            CliError::InvalidArgument(
                "no source URL; pass --source-url or set HARVEST_SOURCE_URL".to_string(),
            )
        })?;

        let mut source = DataTablesHttpSource::new(url, self.page_size)?
            .with_timeout(Duration::from_secs(self.timeout_secs));
        if let Some(columns) = &self.columns {
            let columns: Vec<String> = columns
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            source = source.with_columns(columns);
        }
        Ok(source)
    }

    /// Execute the run command
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = self.run_config()?;
        let source = self.source()?;

        if let Some(addr) = self.metrics_addr {
            if let Err(e) = crate::metrics::init_metrics(addr).await {
                warn!(error = %e, "Metrics exporter unavailable, continuing without metrics");
            }
        }

        let _lock = acquire_lock(&cli.output_dir)?;
        info!(
            output = %cli.output_path().display(),
            batch_interval = config.batch_interval,
            page_size = config.page_size,
            "Starting harvest"
        );

        let mut traverser = PaginationTraverser::new(
            config,
            source,
            CsvRecordSink::new(cli.output_path()),
            StateStore::new(cli.state_path()),
        )
        .with_shutdown(shutdown);

        let summary = traverser.run().await?;
        match cli.output_format {
            OutputFormat::Json => output_json(&summary, &cli.output_path())?,
            OutputFormat::Human => output_human(&summary, &cli.output_path()),
        }
        Ok(())
    }
}

fn acquire_lock(output_dir: &Path) -> Result<RunLock, CliError> {
    RunLock::try_acquire(output_dir).map_err(|e| match e {
        crate::resume::ResumeError::LockError(_) => CliError::Locked(output_dir.to_path_buf()),
        other => other.into(),
    })
}

fn output_json(summary: &RunSummary, output: &Path) -> Result<(), CliError> {
    let mut value = serde_json::to_value(summary)
        .map_err(|e| CliError::InvalidArgument(format!("Failed to serialize summary: {e}")))?;
    value["status"] = serde_json::Value::String("success".to_string());
    value["output"] = serde_json::Value::String(output.display().to_string());
    println!("{value}");
    Ok(())
}

fn output_human(summary: &RunSummary, output: &Path) {
    println!("\nHarvest completed successfully!");
    println!("Output: {}", output.display());
    match summary.last_page {
        Some(last) => println!("Pages this run: {} ({}-{})", summary.pages_fetched, summary.first_page, last),
        None => println!("Pages this run: 0"),
    }
    println!("Records this run: {}", summary.records_this_run);
    println!("Total records: {}", summary.total_records);
}
