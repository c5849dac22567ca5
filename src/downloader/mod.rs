//! Download orchestration
//!
//! [`DownloadService`] pulls localities from the search repository, enriches
//! them, appends them to the configured sink and checkpoints periodically.
//!
//! # Components
//!
//! - [`service`] - The orchestration loop
//! - [`job`] - Job description, run counters and outcome
//! - [`progress`] - Progress observer and periodic progress lines
//! - [`rate_limit`] - Optional client-side request throttle
//! - [`config`] - Retry policy and limits
//!
//! # Error Handling
//!
//! Failures of the base search stream and of the sink end the run with a
//! [`DownloadError`] naming the failing stage. Enrichment failures never do;
//! they are counted and the record is persisted with `null` in place of the
//! missing data.

use crate::config::ConfigError;
use crate::fetcher::FetcherError;
use crate::output::OutputError;
use crate::resume::ResumeError;

pub mod config;
pub mod job;
pub mod progress;
pub mod rate_limit;
pub mod service;

pub use job::{DownloadJob, DownloadOutcome, RunState, RunSummary};
pub use progress::{NoopProgress, ProgressObserver, ProgressUpdate};
pub use rate_limit::{RateLimitError, RateLimiter};
pub use service::DownloadService;

/// Fatal download errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The base locality search failed
    #[error("search failed: {0}")]
    Search(#[from] FetcherError),

    /// Writing the output failed
    #[error("persistence failed: {0}")]
    Persistence(#[from] OutputError),

    /// Reading the previous output failed
    #[error("resume failed: {0}")]
    Resume(#[from] ResumeError),

    /// Invalid input or configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl DownloadError {
    /// Stage label shown to the user: `auth`, `search`, `persistence` or `config`
    pub fn stage(&self) -> &'static str {
        match self {
            DownloadError::Search(e) if e.is_auth_failure() => "auth",
            DownloadError::Search(FetcherError::Config(_)) => "config",
            DownloadError::Search(_) => "search",
            DownloadError::Persistence(_) | DownloadError::Resume(_) => "persistence",
            DownloadError::Config(_) => "config",
        }
    }
}
