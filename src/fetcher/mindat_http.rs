//! Mindat HTTP transport
//!
//! One `reqwest` client carries the auth and content headers and the
//! connect/overall timeouts. Every GET goes through the retry loop:
//!
//! - retried: connection errors, timeouts, and statuses in the retry list
//!   (429 and 5xx by default)
//! - not retried: 401/403, other 4xx, and bodies that are not JSON
//!
//! Only the final failure is returned to the caller.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Response, Url};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, ConfigError, ConfigResult, Timeouts};
use crate::downloader::config::RetryPolicy;
use crate::downloader::rate_limit::RateLimiter;
use crate::fetcher::retry_formatter::{extract_error_type, RetryContext, RetryErrorType};
use crate::fetcher::{Transport, TransportError, TransportErrorKind};
use crate::metrics::{record_retry_backoff, HttpRequestMetrics};

/// User agent sent with every request
pub const USER_AGENT_VALUE: &str = concat!("mindat-dl/", env!("CARGO_PKG_VERSION"));

const ERROR_BODY_PREVIEW: usize = 200;

/// Retrying JSON transport for the Mindat API
#[derive(Debug, Clone)]
pub struct MindatHttpClient {
    client: Client,
    retry: RetryPolicy,
    rate_limiter: Option<Arc<RateLimiter>>,
}

/// One failed attempt, before the retry decision
struct AttemptFailure {
    kind: TransportErrorKind,
    error_type: RetryErrorType,
    message: String,
    retryable: bool,
}

impl MindatHttpClient {
    /// Wrap a prepared client
    pub fn new(client: Client, retry: RetryPolicy, rate_limiter: Option<Arc<RateLimiter>>) -> Self {
        Self {
            client,
            retry,
            rate_limiter,
        }
    }

    /// Build the transport from configuration and a resolved API key
    pub fn from_config(config: &AppConfig, api_key: &str) -> ConfigResult<Self> {
        let client = build_client(&config.timeouts, api_key)?;
        let rate_limiter = config
            .rate_limit
            .as_ref()
            .map(|limit| Arc::new(RateLimiter::from_config(limit)));
        Ok(Self::new(client, RetryPolicy::from(&config.retries), rate_limiter))
    }

    /// Retry policy in effect
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    async fn attempt(
        &self,
        url: &str,
        params: &[(String, String)],
        attempt: u32,
    ) -> Result<Value, AttemptFailure> {
        let metrics = HttpRequestMetrics::start(endpoint_label(url), attempt);

        let response = match self.client.get(url).query(params).send().await {
            Ok(resp) => resp,
            Err(e) => {
                metrics.record_network_error();
                return Err(request_failure(&e));
            }
        };

        let status = response.status();
        metrics.record_complete(status.as_u16());

        if !status.is_success() {
            let code = status.as_u16();
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
            let auth = matches!(code, 401 | 403);
            return Err(AttemptFailure {
                kind: TransportErrorKind::HttpStatus(code),
                error_type: extract_error_type(Some(status), None),
                message: format!("HTTP {code}: {}", preview.trim()),
                retryable: !auth && self.retry.is_retryable_status(code),
            });
        }

        decode_json(response).await
    }
}

#[async_trait]
impl Transport for MindatHttpClient {
    async fn get_json(&self, url: &str, params: &[(String, String)]) -> Result<Value, TransportError> {
        let max_retries = self.retry.max_retries;
        let mut retries: u32 = 0;

        loop {
            if let Some(limiter) = &self.rate_limiter {
                limiter
                    .acquire()
                    .await
                    .map_err(|e| TransportError::new(TransportErrorKind::Network, url, e.to_string()))?;
            }

            debug!("Making GET request to: {} with {} params", url, params.len());

            let failure = match self.attempt(url, params, retries).await {
                Ok(value) => {
                    if retries > 0 {
                        let ctx = RetryContext::new(
                            retries,
                            max_retries,
                            RetryErrorType::NetworkGeneric,
                            Default::default(),
                            "",
                            url,
                        );
                        info!("{}", ctx.format_success());
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            if !failure.retryable || retries >= max_retries {
                if failure.retryable {
                    let ctx = RetryContext::new(
                        retries,
                        max_retries,
                        failure.error_type,
                        Default::default(),
                        failure.message.clone(),
                        url,
                    );
                    warn!("{}", ctx.format_failure());
                }
                return Err(TransportError::new(failure.kind, url, failure.message));
            }

            let backoff = self.retry.backoff(retries);
            retries += 1;
            let ctx = RetryContext::new(
                retries,
                max_retries,
                failure.error_type,
                backoff,
                failure.message.clone(),
                url,
            );
            warn!("{}", ctx.format_retry());
            record_retry_backoff(backoff, retries);
            tokio::time::sleep(backoff).await;
        }
    }
}

/// Build a `reqwest` client with the Mindat headers and timeouts
///
/// The read timeout is applied on top of the connect timeout as an overall
/// request deadline.
pub fn build_client(timeouts: &Timeouts, api_key: &str) -> ConfigResult<Client> {
    let mut auth = HeaderValue::from_str(&format!("Token {}", api_key.trim())).map_err(|_| {
        ConfigError::Invalid("API key contains characters not allowed in a header".to_string())
    })?;
    auth.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
    headers.insert(AUTHORIZATION, auth);

    Client::builder()
        .default_headers(headers)
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.connect + timeouts.read)
        .build()
        .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {e}")))
}

fn request_failure(err: &reqwest::Error) -> AttemptFailure {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else {
        TransportErrorKind::Network
    };
    AttemptFailure {
        kind,
        error_type: extract_error_type(None, Some(err)),
        message: err.to_string(),
        retryable: true,
    }
}

async fn decode_json(response: Response) -> Result<Value, AttemptFailure> {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !content_type.to_ascii_lowercase().contains("json") {
        return Err(AttemptFailure {
            kind: TransportErrorKind::InvalidJson,
            error_type: RetryErrorType::InvalidJson,
            message: format!("unexpected content type {content_type:?}"),
            retryable: false,
        });
    }

    let body = response.bytes().await.map_err(|e| request_failure(&e))?;
    serde_json::from_slice(&body).map_err(|e| AttemptFailure {
        kind: TransportErrorKind::InvalidJson,
        error_type: RetryErrorType::InvalidJson,
        message: format!("failed to parse response body: {e}"),
        retryable: false,
    })
}

/// Path component used as the metrics label, so cursors do not explode label cardinality
fn endpoint_label(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string())
}
