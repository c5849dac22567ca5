//! Download configuration constants and retry policy

use crate::config::Retries;
use std::time::Duration;

/// Default number of retries after the first attempt.
pub const MAX_RETRIES: u32 = 5;

/// Default backoff factor in seconds.
pub const BACKOFF_FACTOR_SECS: f64 = 1.2;

/// Maximum backoff delay in milliseconds.
/// Caps exponential growth so a long retry budget does not stall a run for minutes.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Upper bound on pages walked for a single query.
/// Guards against a server that keeps returning a `next` cursor forever.
pub const MAX_PAGES: usize = 10_000;

/// Statuses retried when the configuration does not list any.
pub const DEFAULT_RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Retry policy applied by the HTTP transport
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff factor in seconds
    pub backoff_factor: f64,
    /// Cap on a single backoff delay
    pub max_backoff: Duration,
    /// HTTP statuses that are retried
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            backoff_factor: BACKOFF_FACTOR_SECS,
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
        }
    }
}

impl From<&Retries> for RetryPolicy {
    fn from(retries: &Retries) -> Self {
        Self {
            max_retries: retries.total,
            backoff_factor: retries.backoff_factor,
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
            retry_statuses: retries.status_forcelist.clone(),
        }
    }
}

impl RetryPolicy {
    /// Policy without any waiting, for tests
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_factor: 0.0,
            ..Self::default()
        }
    }

    /// Whether a response status should be retried
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Delay before retry number `retry_count` (zero based)
    pub fn backoff(&self, retry_count: u32) -> Duration {
        calculate_backoff(self.backoff_factor, retry_count).min(self.max_backoff)
    }
}

/// Calculate exponential backoff delay: `factor * 2^retry_count` seconds
pub fn calculate_backoff(backoff_factor: f64, retry_count: u32) -> Duration {
    let exp = 2f64.powi(retry_count.min(30) as i32);
    let secs = backoff_factor * exp;
    if !secs.is_finite() || secs <= 0.0 {
        return Duration::ZERO;
    }
    let delay_ms = (secs * 1000.0).min(MAX_BACKOFF_MS as f64) as u64;
    Duration::from_millis(delay_ms)
}
