//! HTTP fetcher with retry for crawl workers.
//!
//! [`HttpFetcher`] wraps one pooled [`reqwest::Client`] shared by every worker
//! of a crawl and drives the attempt loop for a single URL: one GET per
//! attempt with a rotated browser User-Agent, a [`RetryPolicy`] consulted on
//! each failure, and a cancellable backoff sleep between attempts. All
//! failures are returned as [`FetchOutcome`] values; nothing escapes as an
//! error or panic.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS};
use super::error::{AttemptError, FetchError, ParseError};
use super::retry::{RetryDecision, RetryPolicy};
use crate::user_agent;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE_ZH_TW: &str = "zh-TW,zh;q=0.9,en-US;q=0.8,en;q=0.7";

/// Result of driving one URL through the attempt loop.
#[derive(Debug)]
pub enum FetchOutcome<T = Vec<u8>> {
    /// An attempt succeeded.
    Success(T),

    /// Every allowed attempt failed.
    Failure {
        /// The error of the final attempt.
        error: AttemptError,
        /// How many attempts were made.
        attempts: u32,
    },

    /// Cancellation fired before an attempt could succeed.
    Cancelled {
        /// How many attempts were made before stopping.
        attempts: u32,
    },
}

impl<T> FetchOutcome<T> {
    /// Returns the number of attempts that were made, if known.
    ///
    /// Success is always reported after at least one attempt.
    #[must_use]
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Success(_) => None,
            Self::Failure { attempts, .. } | Self::Cancelled { attempts } => Some(*attempts),
        }
    }

    /// Returns `true` for [`FetchOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Converts the outcome into an `Option`, dropping failure detail.
    #[must_use]
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure { .. } | Self::Cancelled { .. } => None,
        }
    }
}

/// Pooled HTTP client plus the retry policy applied to every URL.
///
/// Cloning is cheap and shares the underlying connection pool.
///
/// # Example
///
/// ```no_run
/// use lawcrawler_core::crawl::{FetchOutcome, HttpFetcher, RetryPolicy};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = HttpFetcher::new(RetryPolicy::default())?;
/// let cancel = CancellationToken::new();
/// match fetcher.fetch("https://law.moj.gov.tw/Law/", &cancel).await {
///     FetchOutcome::Success(bytes) => println!("{} bytes", bytes.len()),
///     other => println!("gave up: {other:?}"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    retry_policy: RetryPolicy,
}

impl HttpFetcher {
    /// Creates a fetcher with the default connect and request timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the HTTP client cannot be built.
    pub fn new(retry_policy: RetryPolicy) -> Result<Self, FetchError> {
        Self::with_timeouts(
            retry_policy,
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        )
    }

    /// Creates a fetcher with explicit timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the HTTP client cannot be built.
    #[instrument(level = "debug", skip(retry_policy))]
    pub fn with_timeouts(
        retry_policy: RetryPolicy,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_ZH_TW));

        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .build()
            .map_err(|source| FetchError::Client { source })?;

        Ok(Self {
            client,
            retry_policy,
        })
    }

    /// Returns the retry policy applied to each URL.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Fetches the raw body of `url`, retrying per the policy.
    pub async fn fetch(&self, url: &str, cancel: &CancellationToken) -> FetchOutcome<Vec<u8>> {
        self.fetch_with(url, cancel, |body| Ok(body.to_vec())).await
    }

    /// Fetches `url` as text (lossy UTF-8), retrying per the policy.
    ///
    /// Used for listing pages during discovery.
    pub async fn fetch_text(&self, url: &str, cancel: &CancellationToken) -> FetchOutcome<String> {
        self.fetch_with(url, cancel, |body| {
            Ok(String::from_utf8_lossy(body).into_owned())
        })
        .await
    }

    /// Fetches `url` and applies `parse` to the body, retrying the pair.
    ///
    /// A parse failure consumes an attempt exactly like a network failure.
    #[instrument(skip(self, cancel, parse), fields(url = %url))]
    pub async fn fetch_with<T, F>(
        &self,
        url: &str,
        cancel: &CancellationToken,
        parse: F,
    ) -> FetchOutcome<T>
    where
        F: Fn(&[u8]) -> Result<T, ParseError>,
    {
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return FetchOutcome::Cancelled {
                    attempts: attempt - 1,
                };
            }

            let result = match self.fetch_once(url).await {
                Ok(body) => parse(body.as_slice()).map_err(AttemptError::from),
                Err(error) => Err(AttemptError::from(error)),
            };

            let error = match result {
                Ok(value) => {
                    debug!(attempt, "fetch succeeded");
                    return FetchOutcome::Success(value);
                }
                Err(error) => error,
            };

            match self.retry_policy.should_retry(attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "attempt failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            debug!(attempt, "backoff interrupted by cancellation");
                            return FetchOutcome::Cancelled { attempts: attempt };
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt = next_attempt;
                }
                RetryDecision::DoNotRetry { reason } => {
                    warn!(attempt, error = %error, reason = %reason, "giving up");
                    return FetchOutcome::Failure {
                        error,
                        attempts: attempt,
                    };
                }
            }
        }
    }

    /// Performs exactly one GET request and reads the whole body.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] for an unparseable URL, a transport failure,
    /// a timeout, or a non-success status.
    pub async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;

        let response = self
            .client
            .get(parsed)
            .header(USER_AGENT, user_agent::random_browser_user_agent())
            .send()
            .await
            .map_err(|e| map_transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(url, e))?;
        Ok(body.to_vec())
    }
}

fn map_transport_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::timeout(url)
    } else {
        FetchError::network(url, error)
    }
}
