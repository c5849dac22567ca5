//! Progress reporting for locality downloads.
//!
//! [`ProgressObserver`] is the per-locality callback handed to the service;
//! [`ProgressState`] drives the periodic `[PROGRESS]` log lines.

use crate::repository::SearchStrategy;
use std::time::{Duration, Instant};

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);
const MIN_DOWNLOAD_DURATION: Duration = Duration::from_secs(30);

/// One progress notification
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate<'a> {
    /// Localities handled so far, including skipped ones
    pub processed: u64,
    /// Total reported by the server, when known
    pub total: Option<u64>,
    /// Strategy the search committed to
    pub strategy: Option<&'a SearchStrategy>,
}

/// Receives one notification per processed locality
pub trait ProgressObserver: Send + Sync {
    /// Called after each locality is persisted or skipped
    fn on_progress(&self, update: ProgressUpdate<'_>);

    /// Called once when the run ends successfully
    fn on_finish(&self, _processed: u64) {}
}

/// Observer that ignores every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {
    fn on_progress(&self, _update: ProgressUpdate<'_>) {}
}

impl<F> ProgressObserver for F
where
    F: Fn(ProgressUpdate<'_>) + Send + Sync,
{
    fn on_progress(&self, update: ProgressUpdate<'_>) {
        self(update)
    }
}

/// Progress tracking state for periodic log lines.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Localities handled so far.
    pub items_processed: u64,
    /// Total expected localities (if known).
    pub total_expected: Option<u64>,
    /// When the download started.
    pub start_time: Instant,
    /// Last time progress was reported.
    pub last_update: Instant,
    /// Minimum interval between progress updates.
    pub update_interval: Duration,
    /// Localities per second.
    pub current_rate: f64,
    /// Strategy label shown in progress lines.
    pub current_phase: Option<String>,
    /// Last reported completion percentage.
    pub last_reported_percentage: f64,
    /// Minimum percentage delta required to emit a new update.
    pub min_percentage_step: f64,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ProgressState {
    /// Create state with default cadence: every 10% or every minute.
    pub fn new(total_expected: Option<u64>) -> Self {
        let now = Instant::now();
        Self {
            items_processed: 0,
            total_expected,
            start_time: now,
            last_update: now,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            current_rate: 0.0,
            current_phase: None,
            last_reported_percentage: 0.0,
            min_percentage_step: 10.0,
        }
    }

    /// Count newly processed localities.
    pub fn update(&mut self, new_items: u64) {
        self.items_processed = self.items_processed.saturating_add(new_items);
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.current_rate = self.items_processed as f64 / elapsed;
        }
    }

    /// Whether a progress line is due, by percentage step or by time.
    pub fn should_emit_update(&self) -> bool {
        if self.items_processed == 0 {
            return false;
        }

        let percentage_jump = self
            .percentage()
            .map(|pct| pct - self.last_reported_percentage >= self.min_percentage_step)
            .unwrap_or(false);
        if percentage_jump {
            return true;
        }

        self.start_time.elapsed() >= MIN_DOWNLOAD_DURATION
            && self.last_update.elapsed() >= self.update_interval
    }

    /// Reset timers after a line was emitted.
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        if let Some(pct) = self.percentage() {
            self.last_reported_percentage = pct;
        }
    }

    /// Set the label shown in parentheses.
    pub fn set_phase<S: Into<String>>(&mut self, phase: Option<S>) {
        self.current_phase = phase.map(Into::into);
    }

    /// Completion percentage, when a total is known.
    pub fn percentage(&self) -> Option<f64> {
        let total = self.total_expected?;
        if total == 0 {
            return Some(100.0);
        }
        Some(((self.items_processed as f64 / total as f64) * 100.0).min(100.0))
    }

    /// Remaining time at the current rate.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        if self.current_rate <= 0.0 {
            return None;
        }
        let remaining = self.total_expected?.saturating_sub(self.items_processed);
        (remaining > 0).then(|| Duration::from_secs_f64(remaining as f64 / self.current_rate))
    }

    /// Human-readable progress line.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!("[PROGRESS] Processed {} localities", self.items_processed)];

        if let Some(pct) = self.percentage() {
            parts.push(format!("- {pct:.1}% complete"));
        }
        if let Some(phase) = &self.current_phase {
            parts.push(format!("({phase})"));
        }
        if self.current_rate > 0.0 {
            parts.push(format!("at {:.1} localities/sec", self.current_rate));
        }
        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
