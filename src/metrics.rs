//! Observability metrics for the Mindat downloader
//!
//! Counters and histograms are emitted through the `metrics` facade and are
//! no-ops until a recorder is installed. [`init_metrics`] installs the
//! Prometheus exporter when the CLI is given `--metrics-addr`.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Metrics exporter errors
#[derive(Debug, thiserror::Error)]
#[error("failed to install Prometheus exporter on {addr}: {message}")]
pub struct MetricsError {
    /// Requested listen address
    pub addr: SocketAddr,
    /// Exporter message
    pub message: String,
}

/// Install the Prometheus exporter and register metric descriptions
///
/// Idempotent; must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        METRICS_INITIALIZED.store(false, Ordering::SeqCst);
        return Err(MetricsError {
            addr,
            message: e.to_string(),
        });
    }

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the Mindat API"
    );
    describe_counter!("http_retries_total", Unit::Count, "Total number of retry attempts");
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );
    describe_counter!(
        "localities_downloaded_total",
        Unit::Count,
        "Localities appended to the output sink"
    );
    describe_counter!(
        "enrichment_failures_total",
        Unit::Count,
        "Localities persisted with at least one failed enrichment call"
    );
    describe_counter!(
        "downloads_completed_total",
        Unit::Count,
        "Total number of country downloads completed"
    );
    describe_counter!(
        "downloads_failed_total",
        Unit::Count,
        "Total number of country downloads that failed"
    );

    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Timing and outcome of one HTTP attempt
pub struct HttpRequestMetrics {
    endpoint: String,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start recording an attempt against `endpoint` (a path, not a full URL with query)
    pub fn start(endpoint: impl Into<String>, attempt: u32) -> Self {
        let endpoint = endpoint.into();
        let correlation_id = generate_correlation_id();

        debug!(
            correlation_id = %correlation_id,
            endpoint = %endpoint,
            attempt = attempt,
            "Starting HTTP request"
        );

        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record a response with a status code
    pub fn record_complete(&self, status_code: u16) {
        let elapsed = self.observe(status_code.to_string());
        debug!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            status = status_code,
            attempt = self.attempt,
            duration_ms = elapsed.as_millis() as u64,
            "HTTP request completed"
        );
    }

    /// Record a failure without a status code
    pub fn record_network_error(&self) {
        let elapsed = self.observe("network_error".to_string());
        warn!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            attempt = self.attempt,
            duration_ms = elapsed.as_millis() as u64,
            "HTTP attempt failed before a response"
        );
    }

    fn observe(&self, status: String) -> Duration {
        let elapsed = self.start_time.elapsed();
        counter!("http_requests_total", "endpoint" => self.endpoint.clone(), "status" => status)
            .increment(1);
        histogram!("http_request_duration_seconds", "endpoint" => self.endpoint.clone())
            .record(elapsed.as_secs_f64());
        elapsed
    }

    /// Correlation ID of this attempt
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record a retry and its backoff
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!("http_retries_total").increment(1);
    histogram!("retry_backoff_duration_seconds").record(duration.as_secs_f64());

    debug!(
        attempt = attempt,
        backoff_ms = duration.as_millis() as u64,
        "Retry backoff recorded"
    );
}

/// Per-country download metrics
pub struct DownloadMetrics {
    country: String,
    start_time: Instant,
}

impl DownloadMetrics {
    /// Start tracking a country download
    pub fn start(country: impl Into<String>) -> Self {
        let country = country.into();
        info!(country = %country, "Download started");
        Self {
            country,
            start_time: Instant::now(),
        }
    }

    /// One locality appended to the sink
    pub fn record_locality(&self) {
        counter!("localities_downloaded_total", "country" => self.country.clone()).increment(1);
    }

    /// One locality persisted with failed enrichment
    pub fn record_enrichment_failure(&self) {
        counter!("enrichment_failures_total", "country" => self.country.clone()).increment(1);
    }

    /// Record successful completion
    pub fn record_success(&self, processed: u64, enrichment_failures: u64) {
        counter!("downloads_completed_total", "country" => self.country.clone()).increment(1);
        info!(
            country = %self.country,
            processed = processed,
            enrichment_failures = enrichment_failures,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Download completed"
        );
    }

    /// Record a fatal failure at `stage`
    pub fn record_failure(&self, stage: &str, error: &str) {
        counter!(
            "downloads_failed_total",
            "country" => self.country.clone(),
            "stage" => stage.to_string(),
        )
        .increment(1);
        error!(
            country = %self.country,
            stage = %stage,
            error = %error,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Download failed"
        );
    }
}
