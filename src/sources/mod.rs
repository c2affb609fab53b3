//! Law sources: discovery and parsing for each statute database.
//!
//! A source knows two things: how to enumerate the documents it publishes
//! ([`LawSource::discover_urls`]) and how to turn one fetched page into a
//! [`LawDocument`] ([`LawSource::parse_document`]). Everything else
//! (pacing, retry, concurrency, persistence) is the engine's job.
//!
//! # Architecture
//!
//! - [`SourceKind`] - Closed set of supported databases with built-in defaults
//! - [`LawSource`] - Async trait each adapter implements
//! - [`DiscoveryContext`] - Shared fetcher, pacing and cancellation for listing pages
//! - [`build_source`] - Maps a kind to its adapter
//!
//! HTML parsing runs in synchronous helpers that return owned data, so no
//! parsed document is ever held across an `.await`.

mod central;
mod cms;
mod html;
mod kaohsiung;
mod new_taipei;
mod taichung;
mod taipei;
mod taoyuan;

pub use central::CentralSource;
pub use kaohsiung::KaohsiungSource;
pub use new_taipei::NewTaipeiSource;
pub use taichung::TaichungSource;
pub use taipei::TaipeiSource;
pub use taoyuan::TaoyuanSource;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::config::SourceConfig;
use crate::crawl::{DiscoveryError, FetchOutcome, HttpFetcher, ParseError, ParseFn, RateLimiter};
use crate::document::{LawDocument, WorkItem};

/// Upper bound on listing pages followed for one category or pager chain.
pub const MAX_LISTING_PAGES: usize = 1000;

/// Supported statute databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// National Laws & Regulations Database.
    Central,
    /// Taipei City.
    Taipei,
    /// New Taipei City.
    NewTaipei,
    /// Taichung City.
    Taichung,
    /// Taoyuan City.
    Taoyuan,
    /// Kaohsiung City.
    Kaohsiung,
}

impl SourceKind {
    /// Every source, in the order `--source all` crawls them.
    pub const ALL: [Self; 6] = [
        Self::Central,
        Self::Taipei,
        Self::NewTaipei,
        Self::Taichung,
        Self::Taoyuan,
        Self::Kaohsiung,
    ];

    /// Key used in config files and log labels.
    #[must_use]
    pub fn config_key(self) -> &'static str {
        match self {
            Self::Central => "central",
            Self::Taipei => "taipei",
            Self::NewTaipei => "new_taipei",
            Self::Taichung => "taichung",
            Self::Taoyuan => "taoyuan",
            Self::Kaohsiung => "kaohsiung",
        }
    }

    /// Inverse of [`config_key`](Self::config_key).
    #[must_use]
    pub fn from_config_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.config_key() == key)
    }

    /// Site root of the production database.
    #[must_use]
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Central => "https://law.moj.gov.tw/Law/",
            Self::Taipei => "https://www.laws.taipei.gov.tw/",
            Self::NewTaipei => "https://web.law.ntpc.gov.tw/",
            Self::Taichung => "https://law.taichung.gov.tw/",
            Self::Taoyuan => "https://law.tycg.gov.tw/",
            Self::Kaohsiung => "https://outlaw.kcg.gov.tw/",
        }
    }

    /// Default output directory, relative to the working directory.
    #[must_use]
    pub fn default_output_dir(self) -> &'static str {
        match self {
            Self::Central => "law_jsons",
            Self::Taipei => "taipei_law_jsons",
            Self::NewTaipei => "new_taipei_law_jsons",
            Self::Taichung => "taichung_law_jsons",
            Self::Taoyuan => "taoyuan_law_jsons",
            Self::Kaohsiung => "kaohsiung_law_jsons",
        }
    }

    /// Default log file name.
    #[must_use]
    pub fn default_log_file(self) -> String {
        format!("{}_laws_crawler.log", self.config_key())
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

/// Shared resources for walking listing pages.
///
/// Listing fetches go through the same client, retry policy and rate
/// limiter as document fetches.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryContext<'a> {
    config: &'a SourceConfig,
    fetcher: &'a HttpFetcher,
    rate_limiter: &'a RateLimiter,
    cancel: &'a CancellationToken,
}

impl<'a> DiscoveryContext<'a> {
    /// Creates a context.
    #[must_use]
    pub fn new(
        config: &'a SourceConfig,
        fetcher: &'a HttpFetcher,
        rate_limiter: &'a RateLimiter,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            config,
            fetcher,
            rate_limiter,
            cancel,
        }
    }

    /// Settings of the source being crawled.
    #[must_use]
    pub fn config(&self) -> &SourceConfig {
        self.config
    }

    /// Returns whether the crawl was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves `path` against the source's base URL.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Listing`] if the result is not a valid URL.
    pub fn resolve(&self, path: &str) -> Result<Url, DiscoveryError> {
        self.config
            .join(path)
            .ok_or_else(|| DiscoveryError::listing(path, "cannot be resolved against the base URL"))
    }

    /// Fetches a listing page after the usual pacing delay.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Fetch`] when every attempt failed and
    /// [`DiscoveryError::Cancelled`] when the crawl was cancelled.
    pub async fn fetch_listing(&self, url: &Url) -> Result<String, DiscoveryError> {
        if !self.rate_limiter.wait(self.cancel).await {
            return Err(DiscoveryError::Cancelled);
        }
        debug!(url = %url, "fetching listing page");
        match self.fetcher.fetch_text(url.as_str(), self.cancel).await {
            FetchOutcome::Success(body) => Ok(body),
            FetchOutcome::Failure { error, attempts } => Err(DiscoveryError::Fetch {
                url: url.to_string(),
                attempts,
                source: error,
            }),
            FetchOutcome::Cancelled { .. } => Err(DiscoveryError::Cancelled),
        }
    }

    /// Like [`fetch_listing`](Self::fetch_listing), but a failed page is
    /// logged and yields `None` so discovery can continue.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Cancelled`] only.
    pub async fn fetch_listing_or_skip(&self, url: &Url) -> Result<Option<String>, DiscoveryError> {
        match self.fetch_listing(url).await {
            Ok(body) => Ok(Some(body)),
            Err(DiscoveryError::Cancelled) => Err(DiscoveryError::Cancelled),
            Err(error) => {
                warn!(url = %url, error = %error, "skipping listing page");
                Ok(None)
            }
        }
    }
}

/// A statute database the crawler knows how to walk.
///
/// # Object Safety
///
/// Uses `async_trait` so adapters can be held as `Arc<dyn LawSource>`.
#[async_trait]
pub trait LawSource: Send + Sync {
    /// Which database this adapter targets.
    fn kind(&self) -> SourceKind;

    /// Label used in logs and reports.
    fn name(&self) -> &'static str {
        self.kind().config_key()
    }

    /// Enumerates the documents to fetch, de-duplicated, in discovery order.
    ///
    /// An empty list is a valid result. An error means the listing itself
    /// could not be enumerated.
    async fn discover_urls(&self, ctx: &DiscoveryContext<'_>) -> Result<Vec<WorkItem>, DiscoveryError>;

    /// Parses the raw body of one document page.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] when the page lacks a law name or its articles
    /// cannot be extracted.
    fn parse_document(&self, body: &[u8], item: &WorkItem) -> Result<LawDocument, ParseError>;
}

/// Builds the adapter for `kind`.
#[must_use]
pub fn build_source(kind: SourceKind) -> Arc<dyn LawSource> {
    match kind {
        SourceKind::Central => Arc::new(CentralSource::new()),
        SourceKind::Taipei => Arc::new(TaipeiSource::new()),
        SourceKind::NewTaipei => Arc::new(NewTaipeiSource::new()),
        SourceKind::Taichung => Arc::new(TaichungSource::new()),
        SourceKind::Taoyuan => Arc::new(TaoyuanSource::new()),
        SourceKind::Kaohsiung => Arc::new(KaohsiungSource::new()),
    }
}

/// Wraps a source's parser as the engine's [`ParseFn`].
#[must_use]
pub fn parser_for(source: Arc<dyn LawSource>) -> ParseFn {
    Arc::new(move |body: &[u8], item: &WorkItem| source.parse_document(body, item))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::crawl::RetryPolicy;

    #[test]
    fn test_config_keys_round_trip() {
        for kind in SourceKind::ALL {
            assert_eq!(SourceKind::from_config_key(kind.config_key()), Some(kind));
        }
        assert_eq!(SourceKind::from_config_key("tainan"), None);
        assert_eq!(SourceKind::NewTaipei.to_string(), "new_taipei");
    }

    #[test]
    fn test_default_base_urls_parse() {
        for kind in SourceKind::ALL {
            let url = Url::parse(kind.default_base_url()).unwrap();
            assert_eq!(url.scheme(), "https");
            assert!(url.path().ends_with('/'), "{kind} base must end with /");
        }
    }

    #[test]
    fn test_default_log_file_names() {
        assert_eq!(SourceKind::Central.default_log_file(), "central_laws_crawler.log");
        assert_eq!(SourceKind::Kaohsiung.default_log_file(), "kaohsiung_laws_crawler.log");
    }

    #[test]
    fn test_build_source_matches_kind() {
        for kind in SourceKind::ALL {
            let source = build_source(kind);
            assert_eq!(source.kind(), kind);
            assert_eq!(source.name(), kind.config_key());
        }
    }

    #[test]
    fn test_parser_for_delegates_to_source() {
        let parse = parser_for(build_source(SourceKind::Central));
        let item = WorkItem::new("https://law.moj.gov.tw/Law/LawAll.aspx?PCODE=A0000001");
        let error = parse(b"<html><body></body></html>", &item).unwrap_err();
        assert!(matches!(error, ParseError::MissingName { .. }));
    }

    #[tokio::test]
    async fn test_fetch_listing_cancelled_before_request() {
        let config = SourceConfig::defaults_for(SourceKind::Central).build().unwrap();
        let fetcher = HttpFetcher::new(RetryPolicy::new(1, Duration::ZERO)).unwrap();
        let limiter = RateLimiter::disabled();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = DiscoveryContext::new(&config, &fetcher, &limiter, &cancel);

        let url = ctx.resolve("LawSearchLaw.aspx").unwrap();
        assert_eq!(url.as_str(), "https://law.moj.gov.tw/Law/LawSearchLaw.aspx");
        let error = ctx.fetch_listing(&url).await.unwrap_err();
        assert!(matches!(error, DiscoveryError::Cancelled));
        assert!(matches!(
            ctx.fetch_listing_or_skip(&url).await,
            Err(DiscoveryError::Cancelled)
        ));
    }
}
