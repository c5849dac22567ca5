//! Search, enrich and persist the localities of one country

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};

use super::job::{DownloadJob, DownloadOutcome, RunState, RunSummary};
use super::progress::{ProgressObserver, ProgressState, ProgressUpdate};
use super::DownloadError;
use crate::config::{AppConfig, ConfigError, SaveConfig};
use crate::fetcher::mindat_client::MindatClient;
use crate::fetcher::Transport;
use crate::metrics::DownloadMetrics;
use crate::output::{output_path, LocalitySink, OutputError, OutputWriter, SinkType};
use crate::repository::LocalitiesRepository;
use crate::resume::ResumeIndex;
use crate::{Locality, DETAIL_FIELD, MINERALS_FIELD};

/// Orchestrates search, optional enrichment and persistence
#[derive(Clone)]
pub struct DownloadService {
    client: MindatClient,
    repository: LocalitiesRepository,
    save: SaveConfig,
}

impl DownloadService {
    /// Create a service
    pub fn new(client: MindatClient, repository: LocalitiesRepository, save: SaveConfig) -> Self {
        Self {
            client,
            repository,
            save,
        }
    }

    /// Wire client, repository and sink settings from configuration
    pub fn from_config(config: &AppConfig, transport: Arc<dyn Transport>) -> Result<Self, DownloadError> {
        if config.save.checkpoint_every == 0 {
            return Err(ConfigError::Invalid("save.checkpoint_every must be at least 1".to_string()).into());
        }
        let client = MindatClient::from_config(config, transport);
        let repository = LocalitiesRepository::new(client.clone(), config.search_strategies.clone());
        Ok(Self::new(client, repository, config.save.clone()))
    }

    /// Enable or disable skipping of already persisted localities
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.save.resume = resume;
        self
    }

    /// Output file for a country
    pub fn output_path_for(&self, country: &str) -> Result<PathBuf, DownloadError> {
        output_path(&self.save.dir, country, self.save.format).map_err(|e| match e {
            OutputError::InvalidPath(msg) => DownloadError::Config(ConfigError::Invalid(msg)),
            other => DownloadError::Persistence(other),
        })
    }

    /// Download, enrich and persist every locality the search yields for `job.country`
    ///
    /// The output file is flushed every `checkpoint_every` records and once
    /// more at the end. A failure of the search stream or of the sink ends the
    /// run; the records flushed before it stay intact.
    pub async fn download_country_mines(
        &self,
        job: &DownloadJob,
        progress: &dyn ProgressObserver,
    ) -> Result<RunSummary, DownloadError> {
        let span = info_span!(
            "download_country",
            country = %job.country,
            format = %self.save.format,
            enrich = job.enrich
        );
        self.run(job, progress).instrument(span).await
    }

    async fn run(
        &self,
        job: &DownloadJob,
        progress: &dyn ProgressObserver,
    ) -> Result<RunSummary, DownloadError> {
        let path = self.output_path_for(&job.country)?;
        std::fs::create_dir_all(&self.save.dir).map_err(|e| OutputError::io(&self.save.dir, e))?;

        let mut index = if self.save.resume {
            ResumeIndex::load(&path, self.save.format)?
        } else {
            ResumeIndex::empty()
        };
        let seed = self.save.resume.then(|| index.take_document());
        if !index.is_empty() {
            info!(
                path = %path.display(),
                persisted = index.len(),
                "Resuming: already persisted localities will be skipped"
            );
        }

        let mut sink = SinkType::open(&path, self.save.format, seed)?;
        let metrics = DownloadMetrics::start(job.country.clone());
        let mut state = RunState::default();
        let mut progress_state = ProgressState::new(None);
        let mut search = self.repository.mines_in_country(&job.country);

        info!(path = %path.display(), "Starting locality download");

        loop {
            let mut locality = match search.next_locality().await {
                Ok(Some(locality)) => locality,
                Ok(None) => break,
                Err(e) => {
                    let err = DownloadError::Search(e);
                    metrics.record_failure(err.stage(), &err.to_string());
                    close_after_failure(sink, &path);
                    return Err(err);
                }
            };

            if state.strategy_index.is_none() {
                if let Some(strategy) = search.committed_strategy() {
                    state.strategy_index = Some(strategy.rank());
                    progress_state.set_phase(Some(strategy.to_string()));
                }
            }
            progress_state.total_expected = search.total();
            state.processed += 1;

            let already_persisted = locality.id().is_some_and(|id| index.contains(&id));
            if already_persisted {
                state.skipped += 1;
                debug!(id = ?locality.id(), "Skipping locality already persisted");
            } else {
                if job.enrich && !self.enrich(&mut locality).await {
                    state.enrichment_failures += 1;
                    metrics.record_enrichment_failure();
                }

                if let Err(e) = self.persist(&mut sink, &mut state, &locality) {
                    let err = DownloadError::Persistence(e);
                    metrics.record_failure(err.stage(), &err.to_string());
                    return Err(err);
                }
                metrics.record_locality();
            }

            progress.on_progress(ProgressUpdate {
                processed: state.processed,
                total: search.total(),
                strategy: search.committed_strategy(),
            });
            progress_state.update(1);
            if progress_state.should_emit_update() {
                info!("{}", progress_state.format_progress());
                progress_state.mark_emitted();
            }
        }

        if let Err(e) = sink.close() {
            let err = DownloadError::Persistence(e);
            metrics.record_failure(err.stage(), &err.to_string());
            return Err(err);
        }

        let outcome = DownloadOutcome::from_counts(state.written, state.enrichment_failures);
        metrics.record_success(state.written, state.enrichment_failures);
        progress.on_finish(state.processed);

        if state.processed == 0 {
            info!(country = %job.country, "No localities found for any search strategy");
        }
        info!(
            path = %path.display(),
            processed = state.processed,
            written = state.written,
            skipped = state.skipped,
            enrichment_failures = state.enrichment_failures,
            outcome = %outcome,
            "Download finished"
        );

        Ok(RunSummary {
            output_path: path,
            processed: state.processed,
            written: state.written,
            skipped: state.skipped,
            enrichment_failures: state.enrichment_failures,
            strategy: search.committed_strategy().cloned(),
            outcome,
        })
    }

    fn persist(
        &self,
        sink: &mut SinkType,
        state: &mut RunState,
        locality: &Locality,
    ) -> Result<(), OutputError> {
        sink.append(locality)?;
        state.written += 1;
        state.since_checkpoint += 1;
        if state.since_checkpoint >= self.save.checkpoint_every {
            sink.flush()?;
            state.since_checkpoint = 0;
            debug!(written = state.written, "Checkpoint flushed");
        }
        Ok(())
    }

    /// Merge detail and mineral list into `locality`; false if either call failed
    ///
    /// Detail first, then minerals. A failed call leaves `null` under its key.
    async fn enrich(&self, locality: &mut Locality) -> bool {
        let Some(id) = locality.id() else {
            warn!("Locality has no usable id, enrichment skipped");
            locality.insert(DETAIL_FIELD, Value::Null);
            locality.insert(MINERALS_FIELD, Value::Null);
            return false;
        };

        let mut complete = true;
        match self.client.get_locality_detail(&id).await {
            Ok(value) => locality.insert(DETAIL_FIELD, value),
            Err(e) => {
                warn!(id = %id, error = %e, "Detail enrichment failed");
                locality.insert(DETAIL_FIELD, Value::Null);
                complete = false;
            }
        }
        match self.client.collect_locality_minerals(&id).await {
            Ok(list) => locality.insert(MINERALS_FIELD, Value::Array(list)),
            Err(e) => {
                warn!(id = %id, error = %e, "Mineral list enrichment failed");
                locality.insert(MINERALS_FIELD, Value::Null);
                complete = false;
            }
        }
        complete
    }
}

/// Flush what was accepted before a search failure; the failure itself is what gets reported
fn close_after_failure(sink: SinkType, path: &Path) {
    if let Err(e) = sink.close() {
        warn!(path = %path.display(), error = %e, "Failed to flush output after search failure");
    }
}
