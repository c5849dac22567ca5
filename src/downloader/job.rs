//! Download job, run state and outcome

use crate::repository::SearchStrategy;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// What to download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    /// Country passed to the search endpoint
    pub country: String,
    /// Fetch detail and mineral list for every locality
    pub enrich: bool,
}

impl DownloadJob {
    /// Create a job
    pub fn new(country: impl Into<String>, enrich: bool) -> Self {
        Self {
            country: country.into(),
            enrich,
        }
    }
}

/// Counters owned by the service for the duration of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    /// Index of the committed strategy
    pub strategy_index: Option<usize>,
    /// Localities handled, persisted or skipped
    pub processed: u64,
    /// Localities appended to the sink
    pub written: u64,
    /// Localities skipped because they were already persisted
    pub skipped: u64,
    /// Localities with at least one failed enrichment call
    pub enrichment_failures: u64,
    /// Records appended since the last flush
    pub since_checkpoint: usize,
}

/// Successful end of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// Every locality was persisted with complete enrichment
    Completed {
        /// Localities written
        count: u64,
    },
    /// Some localities were persisted without complete enrichment
    CompletedWithPartialEnrichment {
        /// Localities written
        count: u64,
        /// Localities with a failed enrichment call
        failures: u64,
    },
}

impl DownloadOutcome {
    /// Derive the outcome from final counters
    pub fn from_counts(count: u64, failures: u64) -> Self {
        if failures == 0 {
            DownloadOutcome::Completed { count }
        } else {
            DownloadOutcome::CompletedWithPartialEnrichment { count, failures }
        }
    }
}

impl fmt::Display for DownloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadOutcome::Completed { count } => write!(f, "Completed({count})"),
            DownloadOutcome::CompletedWithPartialEnrichment { count, failures } => {
                write!(f, "CompletedWithPartialEnrichment({count}, {failures})")
            }
        }
    }
}

/// Report of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Output file
    pub output_path: PathBuf,
    /// Localities handled
    pub processed: u64,
    /// Localities appended during this run
    pub written: u64,
    /// Localities skipped as already persisted
    pub skipped: u64,
    /// Localities with a failed enrichment call
    pub enrichment_failures: u64,
    /// Strategy that produced the results
    pub strategy: Option<SearchStrategy>,
    /// Outcome
    pub outcome: DownloadOutcome,
}
