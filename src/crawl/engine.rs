//! Batch processor for concurrent fetch, parse and persist of work items.
//!
//! This module provides the [`BatchProcessor`] which drives a list of
//! [`WorkItem`]s through a fixed-size worker pool. Every item is handled in
//! its own task: pace with the [`RateLimiter`], fetch and parse through the
//! [`HttpFetcher`] retry loop, then persist with the [`ResultWriter`]. A
//! failure at any stage is recorded against that item only; the batch itself
//! never fails.
//!
//! # Overview
//!
//! Concurrency is bounded by a semaphore with `max_workers` permits. The list
//! is split into chunks of `batch_size` purely for progress reporting; all
//! chunks share the same pool. Cancellation stops dispatch of new items and
//! interrupts rate-limit waits and backoff sleeps of in-flight ones; a write
//! that has started always runs to completion or cleans up after itself.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use lawcrawler_core::crawl::{
//!     BatchOptions, BatchProcessor, HttpFetcher, ParseFn, RateLimiter, ResultWriter, RetryPolicy,
//! };
//! use lawcrawler_core::{Article, LawDocument, WorkItem};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = HttpFetcher::new(RetryPolicy::default())?;
//! let limiter = Arc::new(RateLimiter::new(Duration::from_secs(1), Duration::from_secs(2)));
//! let writer = Arc::new(ResultWriter::new("law_jsons"));
//! let processor = BatchProcessor::new(5, 20, fetcher, limiter, writer)?;
//!
//! let parse: ParseFn = Arc::new(|body: &[u8], item: &WorkItem| {
//!     let text = String::from_utf8_lossy(body);
//!     LawDocument::new("範例法", "", "", vec![Article::new("1", text)], item.url())
//! });
//! let items = vec![WorkItem::new("https://law.example.gov/a")];
//! let result = processor
//!     .run(items, parse, &BatchOptions::new("example"), &CancellationToken::new())
//!     .await;
//! println!("{} of {} succeeded", result.succeeded(), result.total());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::constants::{MAX_WORKERS, MIN_WORKERS};
use super::error::{AttemptError, EngineError, ParseError};
use super::fetcher::{FetchOutcome, HttpFetcher};
use super::progress::BatchProgress;
use super::rate_limiter::RateLimiter;
use super::writer::ResultWriter;
use crate::document::{LawDocument, WorkItem};

/// Parser capability handed to [`BatchProcessor::run`].
///
/// Turns the raw body of one fetched page into a document. Shared by every
/// worker of the batch.
pub type ParseFn = Arc<dyn Fn(&[u8], &WorkItem) -> Result<LawDocument, ParseError> + Send + Sync>;

/// Stage at which an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Every fetch attempt failed at the network or HTTP level.
    Fetch,
    /// The page was fetched but never parsed into a document.
    Parse,
    /// The document could not be written.
    Persist,
    /// The batch was cancelled before the item completed.
    Cancelled,
    /// The worker task died unexpectedly.
    Panicked,
}

impl FailureKind {
    /// Short lowercase name used in logs and summaries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Parse => "parse",
            Self::Persist => "persist",
            Self::Cancelled => "cancelled",
            Self::Panicked => "panicked",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One permanently failed work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    /// URL of the item.
    pub url: String,
    /// Stage that failed.
    pub kind: FailureKind,
    /// Human-readable reason (the last error seen).
    pub reason: String,
    /// Attempts made at the failing stage.
    pub attempts: u32,
}

impl FailedItem {
    fn new(url: impl Into<String>, kind: FailureKind, reason: impl Into<String>, attempts: u32) -> Self {
        Self {
            url: url.into(),
            kind,
            reason: reason.into(),
            attempts,
        }
    }
}

/// Aggregate outcome of one batch.
///
/// `succeeded() + failed() == total()` always holds. Failures are listed in
/// completion order.
#[derive(Debug, Clone)]
pub struct BatchResult {
    label: String,
    total: usize,
    written: Vec<PathBuf>,
    failures: Vec<FailedItem>,
    cancelled: bool,
    elapsed: Duration,
}

impl BatchResult {
    /// Result for a batch with nothing to do.
    #[must_use]
    pub fn empty(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            total: 0,
            written: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
            elapsed: Duration::ZERO,
        }
    }

    /// Returns the batch label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the number of items in the batch.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Returns the number of items persisted.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.written.len()
    }

    /// Returns the number of permanently failed items.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Returns the failed items in completion order.
    #[must_use]
    pub fn failures(&self) -> &[FailedItem] {
        &self.failures
    }

    /// Returns the paths of persisted documents in completion order.
    #[must_use]
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    /// Returns whether cancellation cut the batch short.
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Returns the wall-clock duration of the batch.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Returns whether the batch counts as a failed crawl (nothing persisted).
    #[must_use]
    pub fn is_crawl_failure(&self) -> bool {
        self.succeeded() == 0
    }

    /// Counts failures by stage.
    #[must_use]
    pub fn failures_by_kind(&self) -> HashMap<FailureKind, usize> {
        let mut counts = HashMap::new();
        for failure in &self.failures {
            *counts.entry(failure.kind).or_insert(0) += 1;
        }
        counts
    }
}

/// Per-run options for [`BatchProcessor::run`].
#[derive(Debug, Clone)]
pub struct BatchOptions {
    label: String,
    limit: Option<usize>,
    show_progress: bool,
}

impl BatchOptions {
    /// Options with the given label, no limit and no progress bar.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            limit: None,
            show_progress: false,
        }
    }

    /// Processes at most `limit` items from the front of the list.
    #[must_use]
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Draws a progress bar on stderr when it is a terminal.
    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Returns the label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the item limit, if any.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

enum ItemOutcome {
    Written(PathBuf),
    Failed(FailedItem),
}

/// Worker pool that fetches, parses and persists work items.
///
/// The processor is reusable: each call to [`run`](Self::run) is an
/// independent batch sharing the same pool size, HTTP client and writer.
#[derive(Debug)]
pub struct BatchProcessor {
    max_workers: usize,
    batch_size: usize,
    semaphore: Arc<Semaphore>,
    fetcher: HttpFetcher,
    rate_limiter: Arc<RateLimiter>,
    writer: Arc<ResultWriter>,
}

impl BatchProcessor {
    /// Creates a processor.
    ///
    /// # Arguments
    ///
    /// * `max_workers` - Pool size (1-100)
    /// * `batch_size` - Progress chunk size (at least 1)
    /// * `fetcher` - Shared HTTP client and retry policy
    /// * `rate_limiter` - Delay applied before each item
    /// * `writer` - Destination of parsed documents
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if `max_workers` or `batch_size` is out of range.
    pub fn new(
        max_workers: usize,
        batch_size: usize,
        fetcher: HttpFetcher,
        rate_limiter: Arc<RateLimiter>,
        writer: Arc<ResultWriter>,
    ) -> Result<Self, EngineError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&max_workers) {
            return Err(EngineError::InvalidWorkers {
                value: max_workers,
                min: MIN_WORKERS,
                max: MAX_WORKERS,
            });
        }
        if batch_size == 0 {
            return Err(EngineError::InvalidBatchSize { value: batch_size });
        }

        debug!(max_workers, batch_size, "creating batch processor");

        Ok(Self {
            max_workers,
            batch_size,
            semaphore: Arc::new(Semaphore::new(max_workers)),
            fetcher,
            rate_limiter,
            writer,
        })
    }

    /// Returns the pool size.
    #[must_use]
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Returns the progress chunk size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns the writer documents are persisted through.
    #[must_use]
    pub fn writer(&self) -> &ResultWriter {
        &self.writer
    }

    /// Runs a batch with default options and no external cancellation.
    pub async fn run_batch(&self, items: Vec<WorkItem>, process: ParseFn, label: &str) -> BatchResult {
        self.run(items, process, &BatchOptions::new(label), &CancellationToken::new())
            .await
    }

    /// Runs one batch to completion.
    ///
    /// An empty list returns [`BatchResult::empty`] without touching the
    /// network. Otherwise every item ends up either persisted or in the
    /// failure list. When `cancel` fires, items not yet dispatched are
    /// recorded as [`FailureKind::Cancelled`] and in-flight items stop at
    /// their next wait.
    #[allow(clippy::too_many_lines)]
    #[instrument(skip(self, items, process, options, cancel), fields(label = %options.label(), items = items.len()))]
    pub async fn run(
        &self,
        mut items: Vec<WorkItem>,
        process: ParseFn,
        options: &BatchOptions,
        cancel: &CancellationToken,
    ) -> BatchResult {
        if let Some(limit) = options.limit() {
            items.truncate(limit);
        }
        let label = options.label().to_string();
        if items.is_empty() {
            warn!("no work items to process");
            return BatchResult::empty(label);
        }

        let started = Instant::now();
        let total = items.len();
        let batch_size = self.batch_size;
        let chunks = total.div_ceil(batch_size);
        info!(total, chunks, max_workers = self.max_workers, "starting batch");

        let progress = Arc::new(BatchProgress::new(&label, total, options.show_progress));
        let mut tasks: JoinSet<ItemOutcome> = JoinSet::new();
        let mut task_urls = HashMap::new();
        let mut failures = Vec::new();
        let mut written = Vec::new();
        let mut cancelled = false;

        let mut pending = items.into_iter().enumerate();
        while let Some((index, item)) = pending.next() {
            if index % batch_size == 0 {
                debug!(chunk = index / batch_size + 1, chunks, "dispatching chunk");
            }

            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = Arc::clone(&self.semaphore).acquire_owned() => result.ok(),
            };
            let Some(permit) = permit else {
                cancelled = true;
                info!(remaining = total - index, "cancelled, not dispatching remaining items");
                for (_, skipped) in std::iter::once((index, item)).chain(pending.by_ref()) {
                    progress.record_failure();
                    failures.push(FailedItem::new(
                        skipped.url(),
                        FailureKind::Cancelled,
                        "cancelled before dispatch",
                        0,
                    ));
                }
                break;
            };

            let url = item.url().to_string();
            let fetcher = self.fetcher.clone();
            let rate_limiter = Arc::clone(&self.rate_limiter);
            let writer = Arc::clone(&self.writer);
            let process = Arc::clone(&process);
            let progress = Arc::clone(&progress);
            let cancel = cancel.clone();

            let handle = tasks.spawn(async move {
                // Permit is released when the task finishes
                let _permit = permit;
                let outcome = process_item(&item, &fetcher, &rate_limiter, &writer, &process, &cancel).await;
                let completed = match &outcome {
                    ItemOutcome::Written(_) => progress.record_success(),
                    ItemOutcome::Failed(_) => progress.record_failure(),
                };
                if completed % batch_size == 0 || completed == total {
                    info!(completed, total, succeeded = progress.succeeded(), "batch progress");
                }
                outcome
            });
            task_urls.insert(handle.id(), url);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, ItemOutcome::Written(path))) => written.push(path),
                Ok((_, ItemOutcome::Failed(failure))) => {
                    if failure.kind == FailureKind::Cancelled {
                        cancelled = true;
                    }
                    warn!(
                        url = %failure.url,
                        kind = %failure.kind,
                        attempts = failure.attempts,
                        reason = %failure.reason,
                        "item failed"
                    );
                    failures.push(failure);
                }
                Err(join_error) => {
                    let url = task_urls
                        .get(&join_error.id())
                        .cloned()
                        .unwrap_or_default();
                    warn!(url = %url, error = %join_error, "worker task failed");
                    progress.record_failure();
                    failures.push(FailedItem::new(
                        url,
                        FailureKind::Panicked,
                        join_error.to_string(),
                        0,
                    ));
                }
            }
        }
        progress.finish();

        let result = BatchResult {
            label,
            total,
            written,
            failures,
            cancelled,
            elapsed: started.elapsed(),
        };
        info!(
            total = result.total(),
            succeeded = result.succeeded(),
            failed = result.failed(),
            cancelled = result.was_cancelled(),
            elapsed_ms = result.elapsed().as_millis(),
            "batch finished"
        );
        result
    }
}

/// Pace, fetch, parse and persist one item.
async fn process_item(
    item: &WorkItem,
    fetcher: &HttpFetcher,
    rate_limiter: &RateLimiter,
    writer: &ResultWriter,
    process: &ParseFn,
    cancel: &CancellationToken,
) -> ItemOutcome {
    let url = item.url();
    if !rate_limiter.wait(cancel).await {
        return ItemOutcome::Failed(FailedItem::new(
            url,
            FailureKind::Cancelled,
            "cancelled before fetch",
            0,
        ));
    }

    // A blank name is a parse failure however the document was built
    let parse = |body: &[u8]| {
        catch_unwind(AssertUnwindSafe(|| process(body, item)))
            .unwrap_or_else(|_| Err(ParseError::structure(url, "parser panicked")))
            .and_then(|document| {
                if document.name.trim().is_empty() {
                    Err(ParseError::missing_name(url))
                } else {
                    Ok(document)
                }
            })
    };

    let document = match fetcher.fetch_with(url, cancel, parse).await {
        FetchOutcome::Success(document) => document,
        FetchOutcome::Failure { error, attempts } => {
            let kind = match error {
                AttemptError::Fetch(_) => FailureKind::Fetch,
                AttemptError::Parse(_) => FailureKind::Parse,
            };
            return ItemOutcome::Failed(FailedItem::new(url, kind, error.to_string(), attempts));
        }
        FetchOutcome::Cancelled { attempts } => {
            return ItemOutcome::Failed(FailedItem::new(
                url,
                FailureKind::Cancelled,
                "cancelled during retry",
                attempts,
            ));
        }
    };

    match writer.write(&document).await {
        Ok(path) => {
            debug!(url, path = %path.display(), "item persisted");
            ItemOutcome::Written(path)
        }
        Err(error) => ItemOutcome::Failed(FailedItem::new(
            url,
            FailureKind::Persist,
            error.to_string(),
            1,
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::crawl::RetryPolicy;
    use crate::document::Article;
    use tempfile::TempDir;

    fn processor(max_workers: usize, out: &std::path::Path) -> Result<BatchProcessor, EngineError> {
        BatchProcessor::new(
            max_workers,
            20,
            HttpFetcher::new(RetryPolicy::new(3, Duration::ZERO)).unwrap(),
            Arc::new(RateLimiter::disabled()),
            Arc::new(ResultWriter::new(out)),
        )
    }

    fn echo_parser() -> ParseFn {
        Arc::new(|body: &[u8], item: &WorkItem| {
            LawDocument::new(
                "測試法",
                "",
                "",
                vec![Article::new("1", String::from_utf8_lossy(body))],
                item.url(),
            )
        })
    }

    #[test]
    fn test_new_rejects_zero_workers() {
        let temp = TempDir::new().unwrap();
        let error = processor(0, temp.path()).unwrap_err();
        assert!(matches!(error, EngineError::InvalidWorkers { value: 0, .. }));
    }

    #[test]
    fn test_new_rejects_too_many_workers() {
        let temp = TempDir::new().unwrap();
        let error = processor(101, temp.path()).unwrap_err();
        assert!(matches!(error, EngineError::InvalidWorkers { value: 101, .. }));
    }

    #[test]
    fn test_new_rejects_zero_batch_size() {
        let temp = TempDir::new().unwrap();
        let error = BatchProcessor::new(
            1,
            0,
            HttpFetcher::new(RetryPolicy::default()).unwrap(),
            Arc::new(RateLimiter::disabled()),
            Arc::new(ResultWriter::new(temp.path())),
        )
        .unwrap_err();
        assert!(matches!(error, EngineError::InvalidBatchSize { value: 0 }));
    }

    #[test]
    fn test_new_accepts_bounds() {
        let temp = TempDir::new().unwrap();
        assert_eq!(processor(1, temp.path()).unwrap().max_workers(), 1);
        assert_eq!(processor(100, temp.path()).unwrap().max_workers(), 100);
    }

    #[tokio::test]
    async fn test_empty_batch_returns_immediately() {
        let temp = TempDir::new().unwrap();
        let engine = processor(4, temp.path()).unwrap();
        let result = engine.run_batch(Vec::new(), echo_parser(), "empty").await;
        assert_eq!(result.total(), 0);
        assert_eq!(result.succeeded(), 0);
        assert!(result.failures().is_empty());
        assert!(result.is_crawl_failure());
        assert!(!temp.path().exists() || std::fs::read_dir(temp.path()).unwrap().count() == 0);
    }

    #[tokio::test]
    async fn test_limit_zero_behaves_like_empty() {
        let temp = TempDir::new().unwrap();
        let engine = processor(4, temp.path()).unwrap();
        let options = BatchOptions::new("limited").with_limit(Some(0));
        let result = engine
            .run(
                vec![WorkItem::new("http://127.0.0.1:9/never")],
                echo_parser(),
                &options,
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.total(), 0);
        assert_eq!(result.label(), "limited");
    }

    #[tokio::test]
    async fn test_precancelled_batch_records_every_item() {
        let temp = TempDir::new().unwrap();
        let engine = processor(2, temp.path()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let items: Vec<WorkItem> = (0..5)
            .map(|i| WorkItem::new(format!("http://127.0.0.1:9/{i}")))
            .collect();
        let result = engine
            .run(items, echo_parser(), &BatchOptions::new("cancelled"), &cancel)
            .await;

        assert_eq!(result.total(), 5);
        assert_eq!(result.succeeded(), 0);
        assert_eq!(result.failed(), 5);
        assert!(result.was_cancelled());
        assert!(
            result
                .failures()
                .iter()
                .all(|f| f.kind == FailureKind::Cancelled && f.attempts == 0)
        );
    }

    #[test]
    fn test_failures_by_kind_counts() {
        let mut result = BatchResult::empty("x");
        result.total = 3;
        result.failures = vec![
            FailedItem::new("a", FailureKind::Fetch, "boom", 3),
            FailedItem::new("b", FailureKind::Fetch, "boom", 3),
            FailedItem::new("c", FailureKind::Parse, "bad", 3),
        ];
        let counts = result.failures_by_kind();
        assert_eq!(counts.get(&FailureKind::Fetch), Some(&2));
        assert_eq!(counts.get(&FailureKind::Parse), Some(&1));
        assert_eq!(counts.get(&FailureKind::Persist), None);
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::Persist.to_string(), "persist");
        assert_eq!(FailureKind::Cancelled.to_string(), "cancelled");
    }
}
