//! CLI error types and conversions

use crate::harvest::{ConfigError, RunFailure};
use crate::output::OutputError;
use crate::resume::ResumeError;
use crate::source::SourceError;
use std::path::PathBuf;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Harvest run failed
    #[error("harvest failed: {0}")]
    RunFailed(#[from] RunFailure),

    /// Run configuration error
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// Source error
    #[error("source error: {0}")]
    SourceError(#[from] SourceError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Resume error
    #[error("resume error: {0}")]
    ResumeError(#[from] ResumeError),

    /// Another run holds the output directory
    #[error("another harvest is already running in {0}")]
    Locked(PathBuf),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
