//! Error types for the crawl engine.
//!
//! Each stage of a work item has its own error type so failures can be
//! recorded with the stage that produced them:
//!
//! - [`FetchError`] - network failures (connection, timeout, HTTP status)
//! - [`ParseError`] - fetched content did not match the expected structure
//! - [`PersistenceError`] - writing the normalized document to disk failed
//! - [`DiscoveryError`] - the source's listing could not be enumerated
//!
//! [`EngineError`] covers misconfiguration of the engine itself.

use std::path::PathBuf;

use thiserror::Error;

/// Network-level failure of a single fetch attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, DNS, TLS or body read failure.
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Request did not complete within the configured timeout.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Server answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The URL could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The malformed URL string.
        url: String,
    },

    /// The shared HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}

/// Fetched content did not yield a usable law document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The document title could not be located or was empty.
    #[error("missing law name in {url}")]
    MissingName {
        /// Source URL of the document.
        url: String,
    },

    /// The article list was absent or malformed.
    #[error("malformed article list in {url}: {detail}")]
    MalformedArticles {
        /// Source URL of the document.
        url: String,
        /// What was wrong with the list.
        detail: String,
    },

    /// Any other structural mismatch.
    #[error("unexpected document structure in {url}: {detail}")]
    Structure {
        /// Source URL of the document.
        url: String,
        /// Description of the mismatch.
        detail: String,
    },
}

impl ParseError {
    /// Creates a missing-name error.
    pub fn missing_name(url: impl Into<String>) -> Self {
        Self::MissingName { url: url.into() }
    }

    /// Creates a malformed-articles error.
    pub fn malformed_articles(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedArticles {
            url: url.into(),
            detail: detail.into(),
        }
    }

    /// Creates a generic structure error.
    pub fn structure(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Structure {
            url: url.into(),
            detail: detail.into(),
        }
    }
}

/// Failure of one fetch-and-parse attempt.
///
/// Both halves are retried identically by the fetcher.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// The request itself failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The response body did not parse.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Failure to commit a document to the output directory.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Filesystem operation failed.
    #[error("IO error writing {path}: {source}")]
    Io {
        /// Path that was being written or created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The document could not be serialized.
    #[error("failed to serialize {name}: {source}")]
    Serialize {
        /// Display name of the document.
        name: String,
        /// The underlying serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// Every disambiguation suffix for a name was already taken.
    #[error("no free filename left for {name}")]
    NameExhausted {
        /// Display name of the document.
        name: String,
    },
}

impl PersistenceError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// The source listing could not be enumerated.
///
/// Distinct from discovering zero URLs, which is not an error.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The root listing page could not be fetched.
    #[error("failed to load listing {url} after {attempts} attempts: {source}")]
    Fetch {
        /// The listing URL.
        url: String,
        /// Attempts made before giving up.
        attempts: u32,
        /// The last fetch failure.
        #[source]
        source: AttemptError,
    },

    /// The root listing page did not have the expected structure.
    #[error("unrecognized listing at {url}: {detail}")]
    Listing {
        /// The listing URL.
        url: String,
        /// What was missing.
        detail: String,
    },

    /// Discovery was cancelled before it completed.
    #[error("discovery cancelled")]
    Cancelled,
}

impl DiscoveryError {
    /// Creates a listing structure error.
    pub fn listing(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Listing {
            url: url.into(),
            detail: detail.into(),
        }
    }
}

/// Error type for batch processor construction.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid worker count provided.
    #[error("invalid worker count {value}: must be between {min} and {max}")]
    InvalidWorkers {
        /// The rejected value.
        value: usize,
        /// Smallest accepted value.
        min: usize,
        /// Largest accepted value.
        max: usize,
    },

    /// Invalid chunk size provided.
    #[error("invalid batch size {value}: must be at least 1")]
    InvalidBatchSize {
        /// The rejected value.
        value: usize,
    },
}
