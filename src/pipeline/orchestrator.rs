//! Orchestrator - one site's run from discovery to persisted records

use crate::artifacts::ArtifactStore;
use crate::discovery::{filter_new, Discoverer};
use crate::extract::{ExtractionFailure, ExtractionOutcome};
use crate::fetch::PageFetcher;
use crate::ledger::{LinkOutcome, RetryLedger};
use crate::pipeline::RunReport;
use crate::sites::{ExtractionContext, SiteStrategy};
use crate::storage::{LinkRecord, RunStatus, Storage, StorageError};
use crate::IngestError;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Drives one site's pipeline run
///
/// Everything inside a run is sequential: links share one rendering session, so no two
/// extractions ever overlap.
pub struct Orchestrator {
    strategy: Box<dyn SiteStrategy>,
    storage: Arc<dyn Storage>,
    fetcher: Arc<dyn PageFetcher>,
    artifacts: Arc<dyn ArtifactStore>,
    ledger: RetryLedger,
    max_pages: u32,
    page_delay: Duration,
    config_hash: String,
}

impl Orchestrator {
    pub fn new(
        strategy: Box<dyn SiteStrategy>,
        storage: Arc<dyn Storage>,
        fetcher: Arc<dyn PageFetcher>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            strategy,
            ledger: RetryLedger::new(Arc::clone(&storage)),
            storage,
            fetcher,
            artifacts,
            max_pages: u32::MAX,
            page_delay: Duration::ZERO,
            config_hash: String::new(),
        }
    }

    /// Caps search pages requested per criterion
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    /// Hash of the configuration file, recorded on the run row
    pub fn with_config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = config_hash.into();
        self
    }

    /// Runs discovery then extraction, recording the run in storage
    ///
    /// A dead session stops the extraction batch but the run still finishes normally
    /// with status `aborted`. Any `Err` marks the run `failed` before propagating.
    pub async fn run(&self) -> Result<RunReport, IngestError> {
        let site = self.strategy.site();
        let run_id = self.storage.create_run(site, &self.config_hash)?;
        let start_time = Instant::now();
        tracing::info!("Starting {} run {}", site, run_id);

        let mut report = RunReport::default();
        let result = self.run_stages(&mut report).await;

        let status = match &result {
            Err(_) => RunStatus::Failed,
            Ok(()) if report.session_aborted => RunStatus::Aborted,
            Ok(()) => RunStatus::Completed,
        };

        if let Err(e) = self.storage.finish_run(run_id, status, &report.counts()) {
            tracing::error!("Failed to finish run {}: {}", run_id, e);
            result?;
            return Err(e.into());
        }
        result?;

        tracing::info!(
            "Run {} {}: {} discovered, {} new, {} processed, {} failed, {} skipped in {:?}",
            run_id,
            status.to_db_string(),
            report.discovered,
            report.new_links,
            report.processed,
            report.failed,
            report.skipped,
            start_time.elapsed()
        );

        Ok(report)
    }

    async fn run_stages(&self, report: &mut RunReport) -> Result<(), IngestError> {
        self.discover(report).await?;
        self.process_links(report).await
    }

    /// Discovers, deduplicates and inserts links for every search criterion
    ///
    /// A fetch failure ends discovery for that criterion only; the others still run.
    pub async fn discover(&self, report: &mut RunReport) -> Result<(), IngestError> {
        let site = self.strategy.site();
        let criteria = self.strategy.criteria();
        tracing::info!("Searching {} criteria for new links", criteria.len());

        for criterion in &criteria {
            let discovery = Discoverer::new(self.strategy.as_ref(), self.fetcher.as_ref(), criterion)
                .with_max_pages(self.max_pages)
                .with_page_delay(self.page_delay)
                .collect()
                .await;

            if let Some(e) = &discovery.error {
                tracing::error!("Discovery for {} stopped: {}", criterion, e);
                report.discovery_failures += 1;
            }

            let found = discovery.candidates.len();
            let fresh = filter_new(self.storage.as_ref(), site, discovery.candidates)?;
            let inserted = self.storage.upsert_links(&fresh)?;

            tracing::info!(
                "{}: {} links on {} pages, {} new",
                criterion,
                found,
                discovery.pages_fetched,
                inserted
            );

            report.discovered += found as u64;
            report.new_links += inserted as u64;
        }

        Ok(())
    }

    /// Extracts every eligible link in order
    async fn process_links(&self, report: &mut RunReport) -> Result<(), IngestError> {
        let links = self.storage.eligible_links(self.strategy.site())?;
        let total = links.len();
        tracing::info!("Processing {} auction links", total);

        for (i, link) in links.iter().enumerate() {
            tracing::info!("[{}/{}] Processing link (id = {})", i + 1, total, link.id);

            if !self.process_link(link, report).await? {
                tracing::warn!(
                    "Rendering session lost; leaving {} links for the next run",
                    total - i - 1
                );
                report.session_aborted = true;
                break;
            }
        }

        Ok(())
    }

    /// Returns false when the session died and the batch must stop
    async fn process_link(
        &self,
        link: &LinkRecord,
        report: &mut RunReport,
    ) -> Result<bool, IngestError> {
        let ctx = ExtractionContext {
            fetcher: self.fetcher.as_ref(),
            artifacts: self.artifacts.as_ref(),
        };

        let (outcome, session_alive) = match self.strategy.extract(link, ctx).await? {
            ExtractionOutcome::Extracted(record) => (LinkOutcome::Succeeded(record), true),
            ExtractionOutcome::Skipped { reason } => {
                tracing::info!("Skipping {}: {}", link.url, reason);
                (LinkOutcome::Skipped(reason), true)
            }
            ExtractionOutcome::Failed(ExtractionFailure::ListingIssue(message)) => {
                tracing::warn!("Error processing (link = {}, error = {})", link.url, message);
                (LinkOutcome::ListingIssue(message), true)
            }
            ExtractionOutcome::Failed(ExtractionFailure::Transport(message)) => {
                tracing::error!("Could not load {}: {}", link.url, message);
                (LinkOutcome::Interrupted(message), true)
            }
            ExtractionOutcome::Failed(ExtractionFailure::SessionFailure(message)) => {
                tracing::error!("Session failure on {}: {}", link.url, message);
                (LinkOutcome::Interrupted(message), false)
            }
        };

        let state = match self.ledger.record_outcome(link.id, &outcome) {
            Ok(state) => state,
            Err(StorageError::InvalidState(message)) => {
                // another run got to this link first
                tracing::warn!("Link {} changed underneath this run: {}", link.id, message);
                return Ok(session_alive);
            }
            Err(e) => return Err(e.into()),
        };

        match &outcome {
            LinkOutcome::Succeeded(_) => report.processed += 1,
            LinkOutcome::Skipped(_) => report.skipped += 1,
            LinkOutcome::ListingIssue(_) => report.failed += 1,
            LinkOutcome::Interrupted(_) if session_alive => report.transport_errors += 1,
            LinkOutcome::Interrupted(_) => {}
        }
        tracing::debug!("Link {} is now {}", link.id, state);

        Ok(session_alive)
    }
}
