//! HTTP transport and Mindat API client

use crate::config::ConfigError;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

pub mod endpoints;
pub mod mindat_client;
pub mod mindat_http;
pub mod pagination;
pub mod retry_formatter;

/// Cause of a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection failed after the retry budget was exhausted
    Network,
    /// Connect or read timeout exceeded
    Timeout,
    /// Non-2xx response status
    HttpStatus(u16),
    /// Response body is not JSON
    InvalidJson,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Network => f.write_str("network"),
            TransportErrorKind::Timeout => f.write_str("timeout"),
            TransportErrorKind::HttpStatus(code) => write!(f, "http_status({code})"),
            TransportErrorKind::InvalidJson => f.write_str("invalid_json"),
        }
    }
}

/// Final, post-retry failure of a single GET
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} error for {url}: {message}")]
pub struct TransportError {
    /// Failure cause
    pub kind: TransportErrorKind,
    /// Requested URL; cursor URLs keep their query string
    pub url: String,
    /// Human readable detail
    pub message: String,
}

impl TransportError {
    /// Create a transport error
    pub fn new(kind: TransportErrorKind, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            message: message.into(),
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            TransportErrorKind::HttpStatus(code) => Some(code),
            _ => None,
        }
    }

    /// Whether the server rejected the credentials
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }
}

/// API client errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// Transport failed after retries
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The requested record does not exist (HTTP 404)
    #[error("not found: {url}")]
    NotFound {
        /// Requested URL
        url: String,
    },

    /// Response JSON has an unexpected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Endpoint could not be resolved
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A pagination walk did not terminate
    #[error("pagination exceeded {limit} pages at {url}")]
    TooManyPages {
        /// Page limit that was hit
        limit: usize,
        /// Last cursor followed
        url: String,
    },
}

impl FetcherError {
    /// Whether the server rejected the credentials
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, FetcherError::Transport(e) if e.is_auth_failure())
    }

    /// Map a 404 transport failure to [`FetcherError::NotFound`]
    pub fn from_transport(err: TransportError) -> Self {
        if err.status() == Some(404) {
            FetcherError::NotFound { url: err.url }
        } else {
            FetcherError::Transport(err)
        }
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Query parameters as owned key/value pairs
pub type QueryParams = Vec<(String, String)>;

/// JSON-over-HTTP GET transport
///
/// Implementations retry transient failures internally; only the final
/// failure reaches the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET and decode the body as JSON
    async fn get_json(&self, url: &str, params: &[(String, String)]) -> Result<Value, TransportError>;
}
