//! Retry message formatting for the Mindat transport.
//!
//! Classifies transport failures and renders consistent log lines for retries,
//! recoveries and final failures.

use reqwest::{Error as ReqwestError, StatusCode};
use std::time::Duration;

/// Classification of retry errors for user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Request or connection timed out
    NetworkTimeout,
    /// Connection refused, DNS failure, or other offline scenarios
    NetworkOffline,
    /// HTTP 429 rate limit exceeded
    RateLimit,
    /// HTTP 5xx server error
    ServerError(u16),
    /// Authentication failures (401/403)
    AuthFailed(u16),
    /// Other client errors (4xx, except 429)
    ClientError(u16),
    /// Body could not be decoded as JSON
    InvalidJson,
    /// Generic fallback when no better classification fits
    NetworkGeneric,
}

impl RetryErrorType {
    /// Short description used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::AuthFailed(code) => match code {
                401 => "authentication failed (401)",
                403 => "access forbidden (403)",
                _ => "authentication failed",
            },
            Self::ClientError(code) => match code {
                404 => "resource not found",
                _ => "client error",
            },
            Self::InvalidJson => "invalid JSON response",
            Self::NetworkGeneric => "network error",
        }
    }

    /// Suggested remediation shown after a final failure.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Check your connection or raise timeouts.read in config.yaml",
            Self::NetworkOffline => "Verify internet connectivity and DNS resolution",
            Self::RateLimit => "Lower page_size or configure rate_limit.max_requests",
            Self::ServerError(_) => "Mindat may be experiencing issues, try again later",
            Self::AuthFailed(_) => "Check the token in your API key file or MINDAT_API_KEY",
            Self::ClientError(_) => "Review search_strategies and endpoint templates",
            Self::InvalidJson => "Check base_url points at the Mindat API and not a web page",
            Self::NetworkGeneric => "Check network connectivity and try again",
        }
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current retry number (1-based)
    pub attempt: u32,
    /// Maximum number of retries configured
    pub max_retries: u32,
    /// Type of error that triggered retry
    pub error_type: RetryErrorType,
    /// Backoff duration until next attempt
    pub backoff_duration: Duration,
    /// Original error message for details
    pub error_message: String,
    /// URL that failed
    pub endpoint: String,
}

impl RetryContext {
    /// Build a context for one retry decision.
    pub fn new(
        attempt: u32,
        max_retries: u32,
        error_type: RetryErrorType,
        backoff_duration: Duration,
        error_message: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_retries,
            error_type,
            backoff_duration,
            error_message: error_message.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Format standardized retry message with attempt counters.
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds... ({})",
            self.attempt,
            self.max_retries,
            self.error_type.description(),
            self.backoff_duration.as_secs_f64(),
            self.endpoint
        )
    }

    /// Format retry success message when a retried request eventually works.
    pub fn format_success(&self) -> String {
        format!(
            "Retry attempt {}/{} succeeded ({})",
            self.attempt, self.max_retries, self.endpoint
        )
    }

    /// Format final failure summary with suggestions.
    pub fn format_failure(&self) -> String {
        let mut lines = vec![
            format!("[FAILED] Request failed after {} retries", self.max_retries),
            format!("  Last error: {}", self.error_message),
            format!("  Endpoint: {}", self.endpoint),
            "  Suggestions:".to_string(),
        ];
        lines.push(format!("    - {}", self.error_type.suggestion()));
        lines.push(format!(
            "    - Try increasing retries.total in config.yaml (current: {})",
            self.max_retries
        ));
        lines.join("\n")
    }
}

/// Extract a [`RetryErrorType`] from an HTTP status or reqwest error.
pub fn extract_error_type(
    status: Option<StatusCode>,
    err: Option<&ReqwestError>,
) -> RetryErrorType {
    if let Some(status) = status {
        let code = status.as_u16();
        match code {
            401 | 403 => return RetryErrorType::AuthFailed(code),
            429 => return RetryErrorType::RateLimit,
            _ => {}
        }
        if status.is_server_error() {
            return RetryErrorType::ServerError(code);
        }
        if status.is_client_error() {
            return RetryErrorType::ClientError(code);
        }
    }

    if let Some(err) = err {
        if err.is_timeout() {
            return RetryErrorType::NetworkTimeout;
        }
        if err.is_connect() {
            return RetryErrorType::NetworkOffline;
        }
        if err.is_decode() {
            return RetryErrorType::InvalidJson;
        }
    }

    RetryErrorType::NetworkGeneric
}
