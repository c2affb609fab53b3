//! Batch crawl engine: pacing, retry, fetch, worker pool and persistence.
//!
//! This module is source-agnostic. A source supplies a list of
//! [`WorkItem`](crate::WorkItem)s and a [`ParseFn`]; the engine drives them to
//! completion under a concurrency limit and writes one JSON file per
//! document.
//!
//! # Features
//!
//! - Fixed-size worker pool (semaphore permits, 1-100 workers)
//! - Randomized per-worker delay before each item
//! - Linear backoff retry covering both fetch and parse
//! - Per-item failure isolation with a typed failure list
//! - Collision-safe, all-or-nothing JSON output
//! - Cooperative cancellation through a `CancellationToken`
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use lawcrawler_core::crawl::{FetchOutcome, HttpFetcher, RetryPolicy};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = HttpFetcher::new(RetryPolicy::new(3, Duration::from_millis(500)))?;
//! if let FetchOutcome::Success(html) = fetcher
//!     .fetch_text("https://law.moj.gov.tw/Law/LawSearchLaw.aspx", &CancellationToken::new())
//!     .await
//! {
//!     println!("{} chars", html.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod constants;
mod engine;
mod error;
mod fetcher;
mod progress;
mod rate_limiter;
mod retry;
mod writer;

pub use engine::{BatchOptions, BatchProcessor, BatchResult, FailedItem, FailureKind, ParseFn};
pub use error::{
    AttemptError, DiscoveryError, EngineError, FetchError, ParseError, PersistenceError,
};
pub use fetcher::{FetchOutcome, HttpFetcher};
pub use progress::BatchProgress;
pub use rate_limiter::RateLimiter;
pub use retry::{DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES, RetryDecision, RetryPolicy};
pub use writer::{ResultWriter, sanitize_filename};

// No module-local Result aliases; signatures spell out `Result<T, FetchError>` etc.
