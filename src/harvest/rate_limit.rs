//! Jittered delay between page advances
//!
//! Not a correctness mechanism: it only spaces requests out so the source is
//! not hammered at a fixed cadence.

use crate::harvest::config::RunConfig;
use crate::shutdown::SharedShutdown;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Shutdown was requested while waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("shutdown requested during rate-limit delay")]
pub struct ShutdownRequested;

/// Sleeps for a uniformly random duration in `[min_delay, max_delay]`
#[derive(Clone)]
pub struct JitterDelay {
    min_delay: Duration,
    max_delay: Duration,
    shutdown: Option<SharedShutdown>,
}

impl JitterDelay {
    /// Create a delay with the given bounds; inverted bounds are swapped
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        let (min_delay, max_delay) = if min_delay <= max_delay {
            (min_delay, max_delay)
        } else {
            (max_delay, min_delay)
        };
        Self {
            min_delay,
            max_delay,
            shutdown: None,
        }
    }

    /// Create a delay from a run configuration
    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.min_delay, config.max_delay)
    }

    /// Cut the sleep short when shutdown is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Lower bound
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Upper bound
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Draw the next delay
    pub fn next_delay(&self) -> Duration {
        if self.min_delay == self.max_delay {
            return self.min_delay;
        }
        let nanos = rand::rng().random_range(self.min_delay.as_nanos()..=self.max_delay.as_nanos());
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Sleep for the next delay, returning how long was slept
    pub async fn wait(&self) -> Result<Duration, ShutdownRequested> {
        let delay = self.next_delay();
        if delay.is_zero() {
            return Ok(delay);
        }
        debug!(delay_ms = delay.as_millis() as u64, "Rate-limit delay");

        match &self.shutdown {
            Some(shutdown) => {
                if shutdown.is_shutdown_requested() {
                    return Err(ShutdownRequested);
                }
                tokio::select! {
                    _ = sleep(delay) => Ok(delay),
                    _ = shutdown.wait_for_shutdown() => Err(ShutdownRequested),
                }
            }
            None => {
                sleep(delay).await;
                Ok(delay)
            }
        }
    }
}
