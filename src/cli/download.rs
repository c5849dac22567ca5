//! Download command implementation

use crate::config::{AppConfig, ConfigOverrides, SaveFormat};
use crate::downloader::{
    DownloadJob, DownloadOutcome, DownloadService, ProgressObserver, ProgressUpdate, RunSummary,
};
use crate::fetcher::mindat_http::MindatHttpClient;
use crate::metrics::init_metrics;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::prompts::{Questioner, DEFAULT_LOCALITY_TYPE};
use super::CliError;

/// Mindat locality downloader CLI
#[derive(Parser, Debug, Clone)]
#[command(name = "mindat-downloader")]
#[command(about = "Download and enrich the Mindat localities of one country", long_about = None)]
#[command(version)]
pub struct Cli {
    /// YAML configuration file; built-in defaults are used when it does not exist
    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Country to download; asked interactively when omitted
    #[arg(long)]
    pub country: Option<String>,

    /// Locality type used for the default search strategies (default: Mine)
    #[arg(long = "type")]
    pub locality_type: Option<String>,

    /// Records per page
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub page_size: Option<u32>,

    /// Do not call the detail and mineral endpoints
    #[arg(long, default_value_t = false)]
    pub no_enrich: bool,

    /// Output format override (json or jsonl)
    #[arg(long)]
    pub format: Option<SaveFormat>,

    /// Flush the output every N records
    #[arg(long, value_parser = parse_checkpoint_every)]
    pub checkpoint_every: Option<usize>,

    /// Rewrite the output instead of skipping localities already saved
    #[arg(long, default_value_t = false)]
    pub no_resume: bool,

    /// API key file, overriding the configuration and MINDAT_API_KEY_FILE
    #[arg(long)]
    pub api_key_file: Option<PathBuf>,

    /// Serve Prometheus metrics on this address, e.g. 127.0.0.1:9000
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

fn parse_checkpoint_every(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if n == 0 {
        return Err("checkpoint interval must be at least 1".to_string());
    }
    Ok(n)
}

/// Inputs of one run after flags and prompt answers are combined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Country to download
    pub country: String,
    /// Locality type label
    pub locality_type: String,
    /// Page size chosen interactively or on the command line
    pub page_size: Option<u32>,
}

impl Cli {
    /// Combine flags with prompt answers; the questioner is only used without `--country`
    pub fn resolve_request(&self, questioner: &mut dyn Questioner) -> Result<RunRequest, CliError> {
        if let Some(country) = &self.country {
            return Ok(RunRequest {
                country: country.trim().to_string(),
                locality_type: self
                    .locality_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_LOCALITY_TYPE.to_string()),
                page_size: self.page_size,
            });
        }

        let answers = questioner.ask()?;
        Ok(RunRequest {
            country: answers.country,
            locality_type: self.locality_type.clone().unwrap_or(answers.locality_type),
            page_size: self.page_size.or(Some(answers.page_size)),
        })
    }

    /// Command line values that take precedence over the configuration file
    pub fn overrides(&self, request: &RunRequest) -> ConfigOverrides {
        ConfigOverrides {
            page_size: request.page_size,
            format: self.format,
            checkpoint_every: self.checkpoint_every,
            no_resume: self.no_resume,
            locality_type: Some(request.locality_type.clone()),
            api_key_file: self.api_key_file.clone(),
        }
    }

    /// Load and validate the configuration for `request`
    pub fn load_config(&self, request: &RunRequest) -> Result<AppConfig, CliError> {
        Ok(AppConfig::load(&self.config, &self.overrides(request))?)
    }

    /// Run the download described by `config` and `request`
    pub async fn execute(
        &self,
        config: &AppConfig,
        request: &RunRequest,
    ) -> Result<RunSummary, CliError> {
        if let Some(addr) = self.metrics_addr {
            init_metrics(addr)?;
            info!(addr = %addr, "Prometheus metrics exporter listening");
        }

        let api_key = config.resolve_api_key()?;
        let transport = MindatHttpClient::from_config(config, &api_key)?;
        let service = DownloadService::from_config(config, Arc::new(transport))?;
        let job = DownloadJob::new(request.country.clone(), !self.no_enrich);

        info!(
            country = %job.country,
            enrich = job.enrich,
            strategies = config.search_strategies.len(),
            "Starting download"
        );

        let progress = SpinnerProgress::new(&job.country);
        let result = service.download_country_mines(&job, &progress).await;
        match &result {
            Ok(_) => progress.finish(),
            Err(_) => progress.abandon(),
        }
        Ok(result?)
    }
}

/// Human-readable report of a finished run
pub fn format_summary(summary: &RunSummary) -> String {
    let mut lines = vec![format!(
        "Saved {} localities to {}",
        summary.written,
        summary.output_path.display()
    )];
    if let Some(strategy) = &summary.strategy {
        lines.push(format!("Search strategy: {strategy}"));
    }
    if summary.skipped > 0 {
        lines.push(format!("Skipped {} localities already saved", summary.skipped));
    }
    match summary.outcome {
        DownloadOutcome::Completed { .. } => {}
        DownloadOutcome::CompletedWithPartialEnrichment { failures, .. } => {
            lines.push(format!("{failures} localities saved with incomplete enrichment"));
        }
    }
    lines.push(format!("Outcome: {}", summary.outcome));
    lines.join("\n")
}

// ─── Progress spinner ────────────────────────────────────────────────────────

/// Spinner showing the locality count, switching to a bar once the total is known
pub struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    /// Start a spinner for `country`
    pub fn new(country: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(spinner_style());
        bar.set_message(format!("Downloading {country}"));
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn abandon(&self) {
        self.bar.abandon();
    }
}

impl ProgressObserver for SpinnerProgress {
    fn on_progress(&self, update: ProgressUpdate<'_>) {
        if let Some(total) = update.total {
            if self.bar.length() != Some(total) {
                self.bar.set_length(total);
                self.bar.set_style(bar_style());
            }
        }
        if let Some(strategy) = update.strategy {
            self.bar.set_prefix(strategy.to_string());
        }
        self.bar.set_position(update.processed);
    }

    fn on_finish(&self, processed: u64) {
        self.bar.set_position(processed);
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} localities {prefix} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {prefix} {msg}",
    )
    .map(|style| style.progress_chars("#>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}
