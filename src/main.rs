//! Main entry point for the mindat-downloader CLI

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use mindat_downloader::cli::{format_summary, Cli, CliError, StdinQuestioner};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing with optional JSON console output and a per-run log file
///
/// Console output goes to stderr; stdout carries the prompts and the summary.
///
/// Returns the log file path when one could be created under `log_dir`.
fn init_tracing(log_dir: Option<&Path>) -> (Option<PathBuf>, Option<String>) {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mindat_downloader=info"));

    let (json_layer, text_layer) = if json_format {
        (Some(fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (None, Some(fmt::layer().with_writer(std::io::stderr)))
    };

    let mut file_error = None;
    let log_file = log_dir.and_then(|dir| match open_run_log(dir) {
        Ok(opened) => Some(opened),
        Err(e) => {
            file_error = Some(format!("{e:#}"));
            None
        }
    });
    let log_path = log_file.as_ref().map(|(path, _)| path.clone());
    let file_layer = log_file.map(|(_, file)| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .init();

    (log_path, file_error)
}

fn open_run_log(dir: &Path) -> anyhow::Result<(PathBuf, File)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let path = dir.join(format!("run_{}.log", Local::now().format("%Y%m%d_%H%M%S")));
    let file = File::create(&path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;
    Ok((path, file))
}

fn fail(err: &CliError) -> ! {
    error!(stage = err.stage(), "Command failed: {}", err);
    eprintln!("error [{}]: {err}", err.stage());
    std::process::exit(err.exit_code());
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut questioner = StdinQuestioner::stdio();
    let request = match cli.resolve_request(&mut questioner) {
        Ok(request) => request,
        Err(e) => {
            init_tracing(None);
            fail(&e);
        }
    };

    let config = match cli.load_config(&request) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(None);
            fail(&e);
        }
    };

    let (log_path, log_error) = init_tracing(Some(&config.save.dir));
    if let Some(path) = log_path {
        info!(path = %path.display(), "Writing run log");
    }
    if let Some(message) = log_error {
        warn!("Run log unavailable, logging to console only: {message}");
    }

    match cli.execute(&config, &request).await {
        Ok(summary) => {
            info!(outcome = %summary.outcome, path = %summary.output_path.display(), "Saved");
            println!("{}", format_summary(&summary));
        }
        Err(e) => fail(&e),
    }
}
