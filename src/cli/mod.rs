//! CLI command implementations

pub mod error;
pub mod run;
pub mod status;

pub use error::CliError;
pub use run::{Cli, Commands, OutputFormat, RunArgs};
pub use status::{ResetCommand, StatusCommand};
