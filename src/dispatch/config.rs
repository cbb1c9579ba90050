//! Dispatch configuration constants

use std::time::Duration;

use super::DispatchError;

/// Default number of concurrent workers.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Upper bound on workers accepted from the command line.
pub const MAX_CONCURRENCY: usize = 64;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Backoff step. The wait before attempt `n + 1` is `n * BACKOFF_UNIT`.
pub const BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Minimum time between redraws of the interactive bar.
pub const PROGRESS_REDRAW_INTERVAL: Duration = Duration::from_millis(100);

/// Periodic mode logs a status line every this many completions...
pub const PROGRESS_LOG_EVERY: u64 = 10;

/// ...or after this much time, whichever comes first.
pub const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// File name prefix for persisted failure files.
pub const FAILURE_FILE_PREFIX: &str = "failed-";

/// Linear backoff: `attempt * unit`.
pub fn calculate_backoff(attempt: u32, unit: Duration) -> Duration {
    unit.saturating_mul(attempt)
}

/// Validated tunables for one dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Number of workers, at least 1
    pub concurrency: usize,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff step
    pub backoff_unit: Duration,
}

impl DispatchConfig {
    /// Build a config, rejecting zero workers.
    pub fn new(concurrency: usize, max_retries: u32) -> Result<Self, DispatchError> {
        if concurrency == 0 {
            return Err(DispatchError::InvalidConcurrency(concurrency));
        }
        Ok(Self {
            concurrency,
            max_retries,
            backoff_unit: BACKOFF_UNIT,
        })
    }

    /// Override the backoff step.
    pub fn with_backoff_unit(mut self, backoff_unit: Duration) -> Self {
        self.backoff_unit = backoff_unit;
        self
    }

    /// Total attempts a job may consume.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit: BACKOFF_UNIT,
        }
    }
}
