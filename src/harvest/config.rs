//! Harvest configuration constants and run configuration

use std::str::FromStr;
use std::time::Duration;

/// Default output directory for the sink and checkpoint.
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Sink file name inside the output directory.
pub const OUTPUT_FILE_NAME: &str = "records.csv";

/// Checkpoint file name inside the output directory.
pub const STATE_FILE_NAME: &str = ".harvest_state.json";

/// Pages accumulated between flushes.
/// 10 pages bounds crash loss to ten re-fetches while keeping sink and
/// checkpoint writes infrequent.
pub const DEFAULT_BATCH_INTERVAL: u64 = 10;

/// Minimum delay between page advances in milliseconds.
pub const DEFAULT_MIN_DELAY_MS: u64 = 1000;

/// Maximum delay between page advances in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 2000;

/// Entries per source page.
pub const DEFAULT_PAGE_SIZE: u64 = 100;

/// Largest accepted page size.
pub const MAX_PAGE_SIZE: u64 = 10_000;

/// Per-request timeout for HTTP sources in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// How the traverser moves the source to the resume page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepositionStrategy {
    /// Jump straight to the page; fail if it is not addressable
    Jump,
    /// Advance one page at a time from page 1
    Step,
    /// Jump, falling back to stepping when the page is not addressable
    #[default]
    JumpThenStep,
}

impl FromStr for RepositionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jump" => Ok(RepositionStrategy::Jump),
            "step" => Ok(RepositionStrategy::Step),
            "jump-then-step" | "auto" => Ok(RepositionStrategy::JumpThenStep),
            _ => Err(format!(
                "Invalid reposition strategy: {s}. Valid options: jump, step, jump-then-step"
            )),
        }
    }
}

/// Invalid run configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Batch interval of zero would never flush
    #[error("batch interval must be at least 1")]
    ZeroBatchInterval,

    /// Page size of zero makes page arithmetic meaningless
    #[error("page size must be at least 1")]
    ZeroPageSize,

    /// Page size above [`MAX_PAGE_SIZE`]
    #[error("page size {0} exceeds the maximum of {max}", max = MAX_PAGE_SIZE)]
    PageSizeTooLarge(u64),

    /// Delay bounds are inverted
    #[error("min delay ({min:?}) exceeds max delay ({max:?})")]
    InvertedDelay {
        /// Configured minimum
        min: Duration,
        /// Configured maximum
        max: Duration,
    },

    /// A page limit of zero would stop before the first page
    #[error("page limit must be at least 1")]
    ZeroPageLimit,
}

/// Parameters of a single harvest run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Pages per flush
    pub batch_interval: u64,
    /// Lower bound of the inter-page delay
    pub min_delay: Duration,
    /// Upper bound of the inter-page delay
    pub max_delay: Duration,
    /// Entries per source page, used for discovery arithmetic
    pub page_size: u64,
    /// Resume repositioning strategy
    pub reposition: RepositionStrategy,
    /// Optional hard cap on the last page
    pub page_limit: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_interval: DEFAULT_BATCH_INTERVAL,
            min_delay: Duration::from_millis(DEFAULT_MIN_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            page_size: DEFAULT_PAGE_SIZE,
            reposition: RepositionStrategy::default(),
            page_limit: None,
        }
    }
}

impl RunConfig {
    /// Set pages per flush
    pub fn with_batch_interval(mut self, batch_interval: u64) -> Self {
        self.batch_interval = batch_interval;
        self
    }

    /// Set delay bounds
    pub fn with_delay(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay;
        self
    }

    /// Disable inter-page delays
    pub fn without_delay(self) -> Self {
        self.with_delay(Duration::ZERO, Duration::ZERO)
    }

    /// Set entries per page
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set reposition strategy
    pub fn with_reposition(mut self, reposition: RepositionStrategy) -> Self {
        self.reposition = reposition;
        self
    }

    /// Cap the last page
    pub fn with_page_limit(mut self, page_limit: Option<u64>) -> Self {
        self.page_limit = page_limit;
        self
    }

    /// Check the invariants the traverser relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_interval == 0 {
            return Err(ConfigError::ZeroBatchInterval);
        }
        if self.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::PageSizeTooLarge(self.page_size));
        }
        if self.min_delay > self.max_delay {
            return Err(ConfigError::InvertedDelay {
                min: self.min_delay,
                max: self.max_delay,
            });
        }
        if self.page_limit == Some(0) {
            return Err(ConfigError::ZeroPageLimit);
        }
        Ok(())
    }
}
