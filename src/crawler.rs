//! Crawl driver: discovery, then one batch, for a single source.
//!
//! [`LawCrawler`] wires a [`SourceConfig`] to the engine: one HTTP client and
//! connection pool, one rate limiter shared by listing and document fetches,
//! and one [`BatchProcessor`]. [`determine_exit_outcome`] maps the reports of
//! a run to the process exit status.

use std::process::ExitCode;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::SourceConfig;
use crate::crawl::{
    BatchOptions, BatchProcessor, BatchResult, DiscoveryError, EngineError, FetchError, HttpFetcher,
    RateLimiter, ResultWriter,
};
use crate::sources::{DiscoveryContext, LawSource, SourceKind, parser_for};

/// Errors raised while assembling a crawler.
#[derive(Debug, Error)]
pub enum CrawlerError {
    /// The HTTP client could not be built.
    #[error(transparent)]
    Client(#[from] FetchError),

    /// The worker pool settings were rejected.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Outcome of crawling one source.
#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// Source that was crawled.
    pub source: SourceKind,
    /// Number of work items discovery produced (before any limit).
    pub discovered: usize,
    /// Batch outcome; empty when discovery failed.
    pub result: BatchResult,
    /// Why discovery failed, if it did.
    pub discovery_error: Option<String>,
}

impl CrawlReport {
    /// Report for a source whose listing could not be enumerated.
    #[must_use]
    pub fn discovery_failed(source: SourceKind, error: &DiscoveryError) -> Self {
        Self {
            source,
            discovered: 0,
            result: BatchResult::empty(source.config_key()),
            discovery_error: Some(error.to_string()),
        }
    }

    /// Returns whether at least one document was persisted.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.discovery_error.is_none() && !self.result.is_crawl_failure()
    }

    /// Logs a one-line summary plus a per-stage failure breakdown.
    pub fn log_summary(&self) {
        if let Some(error) = &self.discovery_error {
            warn!(source = %self.source, error = %error, "discovery failed");
            return;
        }
        info!(
            source = %self.source,
            discovered = self.discovered,
            total = self.result.total(),
            succeeded = self.result.succeeded(),
            failed = self.result.failed(),
            elapsed_secs = self.result.elapsed().as_secs_f64(),
            "crawl complete"
        );
        let mut kinds: Vec<_> = self.result.failures_by_kind().into_iter().collect();
        kinds.sort_by_key(|(kind, _)| kind.as_str());
        for (kind, count) in kinds {
            warn!(source = %self.source, kind = %kind, count, "failures by stage");
        }
    }
}

/// Process exit status of a crawl run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Every crawled source persisted at least one document.
    Success,
    /// Some source persisted nothing.
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => Self::SUCCESS,
            ProcessExit::Failure => Self::FAILURE,
        }
    }
}

/// `Success` only when there was something to crawl and every source
/// persisted at least one document.
#[must_use]
pub fn determine_exit_outcome(reports: &[CrawlReport]) -> ProcessExit {
    if !reports.is_empty() && reports.iter().all(CrawlReport::is_success) {
        ProcessExit::Success
    } else {
        ProcessExit::Failure
    }
}

/// Crawler for one configured source.
#[derive(Debug)]
pub struct LawCrawler {
    config: SourceConfig,
    fetcher: HttpFetcher,
    rate_limiter: Arc<RateLimiter>,
    processor: BatchProcessor,
    show_progress: bool,
}

impl LawCrawler {
    /// Builds the client, pacing, writer and worker pool from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlerError`] if the HTTP client cannot be built or the
    /// pool settings are out of range.
    pub fn new(config: SourceConfig) -> Result<Self, CrawlerError> {
        let fetcher = HttpFetcher::with_timeouts(
            config.retry_policy(),
            config.connect_timeout(),
            config.request_timeout(),
        )?;
        let rate_limiter = Arc::new(config.rate_limiter());
        let writer = Arc::new(ResultWriter::new(config.output_dir()));
        let processor = BatchProcessor::new(
            config.max_workers(),
            config.batch_size(),
            fetcher.clone(),
            Arc::clone(&rate_limiter),
            writer,
        )?;
        Ok(Self {
            config,
            fetcher,
            rate_limiter,
            processor,
            show_progress: false,
        })
    }

    /// Draws a progress bar while the batch runs.
    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Returns the settings this crawler was built from.
    #[must_use]
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Discovers and processes every document of `source`.
    ///
    /// Zero discovered items is not an error; the report simply has an empty
    /// batch.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] when the root listing cannot be loaded or
    /// the run is cancelled during discovery.
    #[instrument(skip(self, source, cancel), fields(source = source.name()))]
    pub async fn crawl(
        &self,
        source: Arc<dyn LawSource>,
        cancel: &CancellationToken,
    ) -> Result<CrawlReport, DiscoveryError> {
        info!(
            base_url = %self.config.base_url(),
            output_dir = %self.config.output_dir().display(),
            "starting discovery"
        );
        let ctx = DiscoveryContext::new(&self.config, &self.fetcher, &self.rate_limiter, cancel);
        let items = source.discover_urls(&ctx).await?;
        let discovered = items.len();
        if discovered == 0 {
            warn!("discovery found no documents");
        } else {
            info!(discovered, "discovery finished");
        }

        let options = BatchOptions::new(source.name())
            .with_limit(self.config.limit())
            .with_progress(self.show_progress);
        let kind = source.kind();
        let result = self
            .processor
            .run(items, parser_for(source), &options, cancel)
            .await;

        Ok(CrawlReport {
            source: kind,
            discovered,
            result,
            discovery_error: None,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn report(source: SourceKind, discovery_error: Option<&str>) -> CrawlReport {
        CrawlReport {
            source,
            discovered: 0,
            result: BatchResult::empty(source.config_key()),
            discovery_error: discovery_error.map(str::to_string),
        }
    }

    #[test]
    fn test_exit_outcome_failure_without_reports() {
        assert_eq!(determine_exit_outcome(&[]), ProcessExit::Failure);
    }

    #[test]
    fn test_exit_outcome_failure_for_empty_batch() {
        assert_eq!(
            determine_exit_outcome(&[report(SourceKind::Taipei, None)]),
            ProcessExit::Failure
        );
    }

    #[test]
    fn test_exit_outcome_failure_for_discovery_error() {
        let failed = CrawlReport::discovery_failed(SourceKind::Central, &DiscoveryError::Cancelled);
        assert!(!failed.is_success());
        assert_eq!(failed.discovery_error.as_deref(), Some("discovery cancelled"));
        assert_eq!(determine_exit_outcome(&[failed]), ProcessExit::Failure);
    }

    #[test]
    fn test_new_builds_from_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = SourceConfig::defaults_for(SourceKind::Taoyuan)
            .output_dir(temp.path())
            .build()
            .unwrap();
        let crawler = LawCrawler::new(config).unwrap().with_progress(true);
        assert_eq!(crawler.config().max_workers(), 5);
        assert!(crawler.show_progress);
    }
}
