//! Application configuration
//!
//! Configuration is an immutable [`AppConfig`] built once at startup: the YAML
//! file (if present) is shallow-merged over the built-in defaults, command line
//! overrides are applied, and the result is validated eagerly so a bad value
//! fails before the first request instead of halfway through a run.
//!
//! ```yaml
//! base_url: https://api.mindat.org/v1
//! api_key_file: api_key.txt
//! page_size: 100
//! timeouts: { connect: 10, read: 40 }
//! retries: { total: 5, backoff_factor: 1.2, status_forcelist: [429, 500, 502, 503, 504] }
//! search_strategies:
//!   - { param: ltype, value: 60 }
//!   - { param: txt, value: Mine }
//! save: { dir: mindat_data, format: json, checkpoint_every: 1 }
//! ```

use crate::repository::SearchStrategy;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable overriding the API key file path
pub const API_KEY_FILE_ENV: &str = "MINDAT_API_KEY_FILE";

/// Environment variable supplying the API key directly
pub const API_KEY_ENV: &str = "MINDAT_API_KEY";

/// Configuration errors. Always fatal at startup, never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        /// Path of the configuration file
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Configuration file is not valid YAML for this schema
    #[error("failed to parse configuration file {path}: {message}")]
    Parse {
        /// Path of the configuration file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// A configuration value failed validation
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// API key file missing, unreadable or empty
    #[error("API key unavailable from {path}: {reason}")]
    ApiKey {
        /// Key file path that was tried
        path: PathBuf,
        /// Why the key could not be used
        reason: String,
    },

    /// Endpoint name not present in the endpoint table
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// Endpoint template references a parameter that was not supplied
    #[error("endpoint {endpoint} requires path parameter {parameter}")]
    MissingPathParameter {
        /// Endpoint name
        endpoint: String,
        /// Missing parameter name
        parameter: String,
    },

    /// Endpoint template is malformed
    #[error("endpoint {endpoint} has malformed template {template:?}")]
    InvalidTemplate {
        /// Endpoint name
        endpoint: String,
        /// Offending template
        template: String,
    },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SaveFormat {
    /// Single `{"results": [...]}` document rewritten atomically on every checkpoint
    #[default]
    Json,
    /// One JSON object per line, appended and flushed immediately
    Jsonl,
}

impl SaveFormat {
    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Json => "json",
            SaveFormat::Jsonl => "jsonl",
        }
    }
}

impl fmt::Display for SaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for SaveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(SaveFormat::Json),
            "jsonl" => Ok(SaveFormat::Jsonl),
            _ => Err(format!("Invalid save format: {s}. Valid options: json, jsonl")),
        }
    }
}

/// Connect and read timeouts
#[derive(Debug, Clone, PartialEq)]
pub struct Timeouts {
    /// Time allowed to establish a connection
    pub connect: Duration,
    /// Time allowed for the response after connecting
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(40),
        }
    }
}

/// Transport retry budget
#[derive(Debug, Clone, PartialEq)]
pub struct Retries {
    /// Number of retries after the first attempt
    pub total: u32,
    /// Backoff factor in seconds; the n-th retry waits `factor * 2^n`
    pub backoff_factor: f64,
    /// HTTP statuses that are retried
    pub status_forcelist: Vec<u16>,
}

impl Default for Retries {
    fn default() -> Self {
        Self {
            total: 5,
            backoff_factor: 1.2,
            status_forcelist: vec![429, 500, 502, 503, 504],
        }
    }
}

/// Endpoint path templates, relative to the base URL
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointTemplates {
    /// Locality search (paged list)
    pub localities: String,
    /// Locality detail, `{id}` substituted
    pub locality_detail: String,
    /// Locality minerals (paged list)
    pub locality_minerals: String,
}

impl Default for EndpointTemplates {
    fn default() -> Self {
        Self {
            localities: "/localities/".to_string(),
            locality_detail: "/localities/{id}/".to_string(),
            locality_minerals: "/localityminerals/".to_string(),
        }
    }
}

/// Output settings
#[derive(Debug, Clone, PartialEq)]
pub struct SaveConfig {
    /// Output directory
    pub dir: PathBuf,
    /// Output format
    pub format: SaveFormat,
    /// Flush to disk every N records
    pub checkpoint_every: usize,
    /// Skip localities already present in an existing output file
    pub resume: bool,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("mindat_data"),
            format: SaveFormat::Json,
            checkpoint_every: 1,
            resume: true,
        }
    }
}

/// Optional client-side request throttle
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: usize,
    /// Window length
    pub window: Duration,
}

/// Complete, validated application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// API base URL, e.g. `https://api.mindat.org/v1`
    pub base_url: String,
    /// Path of the file holding the API key
    pub api_key_file: PathBuf,
    /// Transport timeouts
    pub timeouts: Timeouts,
    /// Transport retry budget
    pub retries: Retries,
    /// Records requested per page
    pub page_size: u32,
    /// Endpoint templates
    pub endpoints: EndpointTemplates,
    /// Ordered search strategies
    pub search_strategies: Vec<SearchStrategy>,
    /// Output settings
    pub save: SaveConfig,
    /// Optional request throttle
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.mindat.org/v1".to_string(),
            api_key_file: PathBuf::from("api_key.txt"),
            timeouts: Timeouts::default(),
            retries: Retries::default(),
            page_size: 100,
            endpoints: EndpointTemplates::default(),
            search_strategies: Vec::new(),
            save: SaveConfig::default(),
            rate_limit: None,
        }
    }
}

/// Values supplied on the command line, applied after the YAML merge
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Records per page
    pub page_size: Option<u32>,
    /// Output format
    pub format: Option<SaveFormat>,
    /// Checkpoint interval
    pub checkpoint_every: Option<usize>,
    /// Force resume off
    pub no_resume: bool,
    /// Locality type used to build default strategies when none are configured
    pub locality_type: Option<String>,
    /// API key file path, taking precedence over the file setting
    pub api_key_file: Option<PathBuf>,
}

// ─── Raw YAML schema ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    base_url: Option<String>,
    api_key_file: Option<PathBuf>,
    timeouts: Option<RawTimeouts>,
    retries: Option<RawRetries>,
    page_size: Option<u32>,
    endpoints: Option<RawEndpoints>,
    search_strategies: Option<Vec<RawStrategy>>,
    save: Option<RawSave>,
    rate_limit: Option<RawRateLimit>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTimeouts {
    connect: Option<f64>,
    read: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRetries {
    total: Option<u32>,
    backoff_factor: Option<f64>,
    status_forcelist: Option<Vec<u16>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEndpoints {
    localities: Option<String>,
    locality_detail: Option<String>,
    locality_minerals: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSave {
    dir: Option<PathBuf>,
    format: Option<SaveFormat>,
    checkpoint_every: Option<usize>,
    resume: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawRateLimit {
    max_requests: usize,
    #[serde(default = "default_rate_window_secs")]
    window_secs: f64,
}

fn default_rate_window_secs() -> f64 {
    60.0
}

#[derive(Debug, Deserialize)]
struct RawStrategy {
    param: String,
    value: ScalarValue,
}

/// YAML scalars accepted as strategy values (`ltype: 60` and `txt: Mine` alike)
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScalarValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Int(v) => write!(f, "{v}"),
            ScalarValue::Float(v) => write!(f, "{v}"),
            ScalarValue::Bool(v) => write!(f, "{v}"),
            ScalarValue::Text(v) => f.write_str(v),
        }
    }
}

fn seconds(value: f64, name: &str) -> ConfigResult<Duration> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::Invalid(format!(
            "{name} must be a positive number of seconds, got {value}"
        )));
    }
    Ok(Duration::from_secs_f64(value))
}

/// Shallow-merge a raw YAML document over the defaults
///
/// Top-level keys replace the default value; nested sections merge field by field.
fn merge(mut cfg: AppConfig, raw: RawConfig) -> ConfigResult<AppConfig> {
    if let Some(v) = raw.base_url {
        cfg.base_url = v;
    }
    if let Some(v) = raw.api_key_file {
        cfg.api_key_file = v;
    }
    if let Some(v) = raw.page_size {
        cfg.page_size = v;
    }
    if let Some(t) = raw.timeouts {
        if let Some(v) = t.connect {
            cfg.timeouts.connect = seconds(v, "timeouts.connect")?;
        }
        if let Some(v) = t.read {
            cfg.timeouts.read = seconds(v, "timeouts.read")?;
        }
    }
    if let Some(r) = raw.retries {
        if let Some(v) = r.total {
            cfg.retries.total = v;
        }
        if let Some(v) = r.backoff_factor {
            cfg.retries.backoff_factor = v;
        }
        if let Some(v) = r.status_forcelist {
            cfg.retries.status_forcelist = v;
        }
    }
    if let Some(e) = raw.endpoints {
        if let Some(v) = e.localities {
            cfg.endpoints.localities = v;
        }
        if let Some(v) = e.locality_detail {
            cfg.endpoints.locality_detail = v;
        }
        if let Some(v) = e.locality_minerals {
            cfg.endpoints.locality_minerals = v;
        }
    }
    if let Some(strategies) = raw.search_strategies {
        cfg.search_strategies = strategies
            .into_iter()
            .enumerate()
            .map(|(rank, s)| SearchStrategy::new(rank, s.param.trim(), s.value.to_string()))
            .collect();
    }
    if let Some(s) = raw.save {
        if let Some(v) = s.dir {
            cfg.save.dir = v;
        }
        if let Some(v) = s.format {
            cfg.save.format = v;
        }
        if let Some(v) = s.checkpoint_every {
            cfg.save.checkpoint_every = v;
        }
        if let Some(v) = s.resume {
            cfg.save.resume = v;
        }
    }
    if let Some(r) = raw.rate_limit {
        cfg.rate_limit = Some(RateLimitConfig {
            max_requests: r.max_requests,
            window: seconds(r.window_secs, "rate_limit.window_secs")?,
        });
    }
    Ok(cfg)
}

impl AppConfig {
    /// Load configuration from a YAML file, falling back to defaults if it does not exist
    ///
    /// The `MINDAT_API_KEY_FILE` environment variable overrides the key file path,
    /// and `overrides` (command line values) take precedence over both.
    pub fn load(path: impl AsRef<Path>, overrides: &ConfigOverrides) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = if path.exists() {
            debug!(path = %path.display(), "Reading configuration file");
            Some(std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?)
        } else {
            info!(path = %path.display(), "Configuration file not found, using defaults");
            None
        };

        let env_key_file = std::env::var_os(API_KEY_FILE_ENV).map(PathBuf::from);
        Self::from_yaml(text.as_deref(), env_key_file, overrides).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// Build configuration from YAML text; pure apart from validation
    pub fn from_yaml(
        yaml: Option<&str>,
        env_key_file: Option<PathBuf>,
        overrides: &ConfigOverrides,
    ) -> ConfigResult<Self> {
        let raw = match yaml {
            Some(text) if !text.trim().is_empty() => {
                serde_yaml::from_str::<RawConfig>(text).map_err(|e| ConfigError::Parse {
                    path: PathBuf::new(),
                    message: e.to_string(),
                })?
            }
            _ => RawConfig::default(),
        };

        let mut cfg = merge(AppConfig::default(), raw)?;

        if let Some(key_file) = env_key_file {
            cfg.api_key_file = key_file;
        }
        cfg.apply_overrides(overrides);
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(v) = overrides.page_size {
            self.page_size = v;
        }
        if let Some(v) = overrides.format {
            self.save.format = v;
        }
        if let Some(v) = overrides.checkpoint_every {
            self.save.checkpoint_every = v;
        }
        if overrides.no_resume {
            self.save.resume = false;
        }
        if let Some(v) = &overrides.api_key_file {
            self.api_key_file = v.clone();
        }
        if self.search_strategies.is_empty() {
            let ltype = overrides.locality_type.as_deref().unwrap_or("Mine");
            self.search_strategies = SearchStrategy::defaults_for(ltype);
        }
    }

    /// Check every field eagerly
    pub fn validate(&self) -> ConfigResult<()> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| ConfigError::Invalid(format!("base_url {:?}: {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "base_url must use http or https, got {}",
                url.scheme()
            )));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".to_string()));
        }
        if self.save.checkpoint_every == 0 {
            return Err(ConfigError::Invalid(
                "save.checkpoint_every must be at least 1".to_string(),
            ));
        }
        if !self.retries.backoff_factor.is_finite() || self.retries.backoff_factor < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "retries.backoff_factor must be non-negative, got {}",
                self.retries.backoff_factor
            )));
        }
        for strategy in &self.search_strategies {
            if strategy.param().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "search strategy #{} has an empty param",
                    strategy.rank()
                )));
            }
        }
        for (name, template) in [
            ("localities", &self.endpoints.localities),
            ("locality_detail", &self.endpoints.locality_detail),
            ("locality_minerals", &self.endpoints.locality_minerals),
        ] {
            if template.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("endpoint {name} is empty")));
            }
        }
        if let Some(limit) = &self.rate_limit {
            if limit.max_requests == 0 {
                return Err(ConfigError::Invalid(
                    "rate_limit.max_requests must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Resolve the API key: `MINDAT_API_KEY` wins, otherwise the key file is read
    pub fn resolve_api_key(&self) -> ConfigResult<String> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => read_api_key(&self.api_key_file),
        }
    }
}

/// Read the API key from a file; missing, unreadable or blank files are errors
pub fn read_api_key(path: &Path) -> ConfigResult<String> {
    if !path.exists() {
        return Err(ConfigError::ApiKey {
            path: path.to_path_buf(),
            reason: "file not found".to_string(),
        });
    }
    let key = std::fs::read_to_string(path).map_err(|e| ConfigError::ApiKey {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ConfigError::ApiKey {
            path: path.to_path_buf(),
            reason: "file is empty".to_string(),
        });
    }
    Ok(key.to_string())
}
