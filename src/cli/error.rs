//! CLI error types and conversions

use crate::config::ConfigError;
use crate::downloader::DownloadError;
use crate::metrics::MetricsError;

/// CLI errors, each mapped to the stage reported on exit
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration or API key problem
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The download run failed
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Prometheus exporter could not be installed
    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),

    /// Interactive prompt could not be read
    #[error("prompt failed: {0}")]
    Prompt(#[from] std::io::Error),
}

impl CliError {
    /// Failing stage: `config`, `auth`, `search` or `persistence`
    pub fn stage(&self) -> &'static str {
        match self {
            CliError::Config(ConfigError::ApiKey { .. }) => "auth",
            CliError::Config(_) | CliError::Metrics(_) | CliError::Prompt(_) => "config",
            CliError::Download(e) => e.stage(),
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.stage() {
            "config" => 2,
            "auth" => 3,
            "search" => 4,
            _ => 5,
        }
    }
}
