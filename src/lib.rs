//! # Mindat Downloader Library
//!
//! Harvests locality records from the paginated, rate-limited Mindat API,
//! optionally enriches every locality with its detail record and mineral list,
//! and persists the results incrementally so an interrupted run never leaves a
//! corrupt output file behind.
//!
//! ## Features
//!
//! - **Resilient transport**: retries with exponential backoff on connection
//!   errors, timeouts, 429 and 5xx responses
//! - **Search strategies**: an ordered list of query fallbacks (e.g. `ltype=Mine`
//!   then free-text `txt=Mine`); the first strategy that yields results wins
//! - **Partial-failure tolerance**: a failed enrichment degrades one record, never the run
//! - **Crash-safe output**: atomic whole-document JSON checkpoints or streaming JSON lines
//! - **Resume**: localities already present in the output file are not fetched twice
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use mindat_downloader::config::AppConfig;
//! use mindat_downloader::downloader::{DownloadJob, DownloadService, NoopProgress};
//! use mindat_downloader::fetcher::mindat_http::MindatHttpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load("config.yaml", &Default::default())?;
//! let api_key = config.resolve_api_key()?;
//! let transport = Arc::new(MindatHttpClient::from_config(&config, &api_key)?);
//!
//! let service = DownloadService::from_config(&config, transport)?;
//! let summary = service
//!     .download_country_mines(&DownloadJob::new("Iran", true), &NoopProgress)
//!     .await?;
//! println!("saved {} localities to {}", summary.written, summary.output_path.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`fetcher`] - Transport, endpoint resolution, paging and typed API calls
//! - [`repository`] - Multi-strategy locality search
//! - [`downloader`] - Orchestration: search, enrichment, persistence, progress
//! - [`output`] - JSON accumulator and JSON-lines sinks
//! - [`resume`] - Index of localities already persisted by a previous run
//! - [`config`] - YAML configuration merged over defaults
//! - [`cli`] - Command line interface and interactive prompts

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// CLI command implementation
pub mod cli;

/// Application configuration
pub mod config;

/// Download orchestration
pub mod downloader;

/// HTTP transport and Mindat API client
pub mod fetcher;

/// Observability metrics
pub mod metrics;

/// Output sinks
pub mod output;

/// Locality search strategies
pub mod repository;

/// Resume support for interrupted runs
pub mod resume;

pub use config::{AppConfig, SaveFormat};
pub use repository::SearchStrategy;

/// Field carrying the stable unique identifier of a locality
pub const LOCALITY_ID_FIELD: &str = "id";

/// Key under which the detail record is merged into an enriched locality
pub const DETAIL_FIELD: &str = "detail";

/// Key under which the mineral list is merged into an enriched locality
pub const MINERALS_FIELD: &str = "locality_minerals";

/// Stable identifier of a locality
///
/// The API returns numeric ids, but string ids are accepted so that an
/// unexpected payload does not make a record unaddressable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocalityId {
    /// Numeric identifier
    Number(i64),
    /// Textual identifier
    Text(String),
}

impl LocalityId {
    /// Parse an identifier from a JSON value
    ///
    /// Integers and non-empty strings are accepted; everything else is `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(LocalityId::Number),
            Value::String(s) if !s.trim().is_empty() => Some(LocalityId::Text(s.trim().to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for LocalityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalityId::Number(n) => write!(f, "{n}"),
            LocalityId::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A locality record as returned by the list endpoint
///
/// The record is opaque: every field the API sends is preserved in arrival
/// order. Enrichment adds the [`DETAIL_FIELD`] and [`MINERALS_FIELD`] keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locality(Map<String, Value>);

impl Locality {
    /// Wrap a JSON value, returning `None` unless it is an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// The locality identifier, if present and well-formed
    pub fn id(&self) -> Option<LocalityId> {
        self.0.get(LOCALITY_ID_FIELD).and_then(LocalityId::from_value)
    }

    /// Look up a field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Merge a field into the record, replacing any previous value
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Borrow the underlying field map
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a JSON value
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Locality {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
