//! Lawcrawler Core Library
//!
//! Batch crawler for Taiwanese statute databases. Each source enumerates its
//! law pages, and a shared engine fetches, parses and writes one JSON
//! document per law under a bounded worker pool with randomized pacing and
//! linear-backoff retry.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`crawl`] - Source-agnostic engine: rate limiter, retry, fetcher, batch processor, writer
//! - [`sources`] - Per-database discovery and parsing behind the [`LawSource`] trait
//! - [`crawler`] - Runs discovery plus one batch for a configured source
//! - [`config`] - Immutable per-source settings and the optional TOML file
//! - [`document`] - Work items and the persisted law document

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod crawl;
pub mod crawler;
pub mod document;
pub mod sources;
pub mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, FileConfig, SourceConfig, SourceConfigBuilder};
pub use crawl::{
    BatchOptions, BatchProcessor, BatchResult, DiscoveryError, FailedItem, FailureKind, FetchError,
    FetchOutcome, HttpFetcher, ParseError, ParseFn, PersistenceError, RateLimiter, ResultWriter,
    RetryPolicy,
};
pub use crawler::{CrawlReport, CrawlerError, LawCrawler, ProcessExit, determine_exit_outcome};
pub use document::{Article, LawDocument, WorkItem};
pub use sources::{DiscoveryContext, LawSource, SourceKind, build_source};
