//! Per-source crawl configuration.
//!
//! [`SourceConfig`] is the immutable settings value a crawler is built from.
//! It is assembled by [`SourceConfigBuilder`], which starts from the built-in
//! defaults of a [`SourceKind`], layers the optional TOML file on top
//! (`[defaults]`, then `[sources.<name>]`), then any explicit overrides, and
//! validates the result once in [`SourceConfigBuilder::build`].
//!
//! # File format
//!
//! ```toml
//! [defaults]
//! max_workers = 3
//! delay_min_secs = 0.5
//! delay_max_secs = 1.5
//!
//! [sources.taipei]
//! output_dir = "/data/taipei"
//! limit = 50
//! ```

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::crawl::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_BATCH_SIZE, DEFAULT_DELAY_MAX, DEFAULT_DELAY_MIN,
    DEFAULT_MAX_WORKERS, MAX_WORKERS, MIN_WORKERS, REQUEST_TIMEOUT_SECS,
};
use crate::crawl::{DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES, RateLimiter, RetryPolicy};
use crate::sources::SourceKind;

/// Longest accepted inter-request delay or timeout.
const MAX_DURATION_SECS: u64 = 3600;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has unexpected keys.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A `[sources.<name>]` table names no known source.
    #[error("unknown source '{name}' in config (expected one of: {expected})")]
    UnknownSource {
        /// The unrecognized name.
        name: String,
        /// Comma-separated list of valid names.
        expected: String,
    },

    /// A value is out of range.
    #[error("invalid value for `{field}`: {detail}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        detail: String,
    },

    /// The base URL is empty or not absolute.
    #[error("invalid base URL '{url}'")]
    InvalidBaseUrl {
        /// The rejected URL.
        url: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            detail: detail.into(),
        }
    }
}

/// Immutable settings for crawling one source.
///
/// Shared read-only by every worker of a batch; there are no setters.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    base_url: Url,
    output_dir: PathBuf,
    log_file: Option<PathBuf>,
    max_workers: usize,
    batch_size: usize,
    delay_min: Duration,
    delay_max: Duration,
    max_retries: u32,
    backoff_base: Duration,
    connect_timeout: Duration,
    request_timeout: Duration,
    limit: Option<usize>,
}

impl SourceConfig {
    /// Starts a builder with generic defaults for `base_url`.
    #[must_use]
    pub fn builder(base_url: impl Into<String>) -> SourceConfigBuilder {
        SourceConfigBuilder::new(base_url)
    }

    /// Starts a builder preloaded with the built-in defaults of `kind`.
    #[must_use]
    pub fn defaults_for(kind: SourceKind) -> SourceConfigBuilder {
        SourceConfigBuilder::new(kind.default_base_url())
            .output_dir(kind.default_output_dir())
            .log_file(Some(PathBuf::from(kind.default_log_file())))
    }

    /// Site root; listing and document URLs are resolved against it.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Directory documents are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Log file for this source, if any.
    #[must_use]
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Worker pool size.
    #[must_use]
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Progress chunk size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Lower bound of the inter-request delay.
    #[must_use]
    pub fn delay_min(&self) -> Duration {
        self.delay_min
    }

    /// Upper bound of the inter-request delay.
    #[must_use]
    pub fn delay_max(&self) -> Duration {
        self.delay_max
    }

    /// Attempts per item, including the first.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff base between attempts.
    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    /// TCP connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Whole-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Maximum number of discovered items to process, if capped.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Retry policy derived from these settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.backoff_base)
    }

    /// Rate limiter derived from these settings.
    #[must_use]
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.delay_min, self.delay_max)
    }

    /// Resolves `path` (relative or absolute) against the base URL.
    ///
    /// Returns `None` if the result is not a valid URL.
    #[must_use]
    pub fn join(&self, path: &str) -> Option<Url> {
        self.base_url.join(path).ok()
    }
}

/// Builder for [`SourceConfig`].
#[derive(Debug, Clone)]
pub struct SourceConfigBuilder {
    base_url: String,
    output_dir: PathBuf,
    log_file: Option<PathBuf>,
    max_workers: usize,
    batch_size: usize,
    delay_min: Duration,
    delay_max: Duration,
    max_retries: u32,
    backoff_base: Duration,
    connect_timeout: Duration,
    request_timeout: Duration,
    limit: Option<usize>,
}

impl SourceConfigBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            output_dir: PathBuf::from("law_jsons"),
            log_file: None,
            max_workers: DEFAULT_MAX_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            delay_min: DEFAULT_DELAY_MIN,
            delay_max: DEFAULT_DELAY_MAX,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            limit: None,
        }
    }

    /// Sets the site root.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the output directory.
    #[must_use]
    pub fn output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// Sets or clears the log file.
    #[must_use]
    pub fn log_file(mut self, log_file: Option<PathBuf>) -> Self {
        self.log_file = log_file;
        self
    }

    /// Sets the worker pool size.
    #[must_use]
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Sets the progress chunk size.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the delay window.
    #[must_use]
    pub fn delay(mut self, delay_min: Duration, delay_max: Duration) -> Self {
        self.delay_min = delay_min;
        self.delay_max = delay_max;
        self
    }

    /// Sets the number of attempts per item.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the backoff base.
    #[must_use]
    pub fn backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Sets the connect and request timeouts.
    #[must_use]
    pub fn timeouts(mut self, connect_timeout: Duration, request_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.request_timeout = request_timeout;
        self
    }

    /// Caps the number of items processed per run.
    #[must_use]
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Layers the values present in `overrides` on top of this builder.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for negative or non-finite
    /// delays.
    pub fn apply(mut self, overrides: &SourceOverrides) -> Result<Self, ConfigError> {
        if let Some(base_url) = &overrides.base_url {
            self.base_url.clone_from(base_url);
        }
        if let Some(output_dir) = &overrides.output_dir {
            self.output_dir.clone_from(output_dir);
        }
        if let Some(log_file) = &overrides.log_file {
            self.log_file = Some(log_file.clone());
        }
        if let Some(max_workers) = overrides.max_workers {
            self.max_workers = max_workers;
        }
        if let Some(batch_size) = overrides.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(secs) = overrides.delay_min_secs {
            self.delay_min = secs_to_duration("delay_min_secs", secs)?;
        }
        if let Some(secs) = overrides.delay_max_secs {
            self.delay_max = secs_to_duration("delay_max_secs", secs)?;
        }
        if let Some(max_retries) = overrides.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(ms) = overrides.backoff_base_ms {
            self.backoff_base = Duration::from_millis(ms);
        }
        if let Some(secs) = overrides.connect_timeout_secs {
            self.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = overrides.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        if overrides.limit.is_some() {
            self.limit = overrides.limit;
        }
        Ok(self)
    }

    /// Validates and freezes the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the base URL is not absolute, `max_workers`
    /// is outside 1-100, `batch_size` or `max_retries` is zero, the delay
    /// window is inverted or exceeds an hour, or a timeout is zero.
    pub fn build(self) -> Result<SourceConfig, ConfigError> {
        let trimmed = self.base_url.trim();
        let base_url = Url::parse(trimmed)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
            })?;

        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.max_workers) {
            return Err(ConfigError::invalid(
                "max_workers",
                format!(
                    "{} (expected {MIN_WORKERS}..={MAX_WORKERS})",
                    self.max_workers
                ),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "must be at least 1"));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::invalid("max_retries", "must be at least 1"));
        }
        if self.delay_min > self.delay_max {
            return Err(ConfigError::invalid(
                "delay_min_secs",
                format!(
                    "{:?} is greater than delay_max {:?}",
                    self.delay_min, self.delay_max
                ),
            ));
        }
        if self.delay_max > Duration::from_secs(MAX_DURATION_SECS) {
            return Err(ConfigError::invalid(
                "delay_max_secs",
                format!("must not exceed {MAX_DURATION_SECS} seconds"),
            ));
        }
        for (field, timeout) in [
            ("connect_timeout_secs", self.connect_timeout),
            ("request_timeout_secs", self.request_timeout),
        ] {
            if timeout.is_zero() || timeout > Duration::from_secs(MAX_DURATION_SECS) {
                return Err(ConfigError::invalid(
                    field,
                    format!("expected 1..={MAX_DURATION_SECS} seconds"),
                ));
            }
        }

        Ok(SourceConfig {
            base_url,
            output_dir: self.output_dir,
            log_file: self.log_file,
            max_workers: self.max_workers,
            batch_size: self.batch_size,
            delay_min: self.delay_min,
            delay_max: self.delay_max,
            max_retries: self.max_retries,
            backoff_base: self.backoff_base,
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            limit: self.limit,
        })
    }
}

fn secs_to_duration(field: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| ConfigError::invalid(field, format!("{secs} is not a valid number of seconds")))
}

/// Subset of [`SourceConfig`] fields as they appear in the TOML file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceOverrides {
    /// Site root.
    pub base_url: Option<String>,
    /// Output directory.
    pub output_dir: Option<PathBuf>,
    /// Log file.
    pub log_file: Option<PathBuf>,
    /// Worker pool size.
    pub max_workers: Option<usize>,
    /// Progress chunk size.
    pub batch_size: Option<usize>,
    /// Lower bound of the delay window, in seconds.
    pub delay_min_secs: Option<f64>,
    /// Upper bound of the delay window, in seconds.
    pub delay_max_secs: Option<f64>,
    /// Attempts per item.
    pub max_retries: Option<u32>,
    /// Backoff base in milliseconds.
    pub backoff_base_ms: Option<u64>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Item cap per run.
    pub limit: Option<usize>,
}

/// Parsed contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Values applied to every source.
    #[serde(default)]
    pub defaults: SourceOverrides,
    /// Per-source values, keyed by source name.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceOverrides>,
}

impl FileConfig {
    /// Parses TOML text. `origin` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid TOML or unknown keys, and
    /// [`ConfigError::UnknownSource`] for a `[sources.<name>]` table that
    /// names no known source.
    pub fn parse(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        for name in config.sources.keys() {
            if SourceKind::from_config_key(name).is_none() {
                return Err(ConfigError::UnknownSource {
                    name: name.clone(),
                    expected: SourceKind::ALL
                        .iter()
                        .map(|kind| kind.config_key())
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
        }
        Ok(config)
    }

    /// Builder for `kind` with built-in defaults, `[defaults]` and
    /// `[sources.<kind>]` applied in that order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for unusable delay values.
    pub fn builder_for(&self, kind: SourceKind) -> Result<SourceConfigBuilder, ConfigError> {
        let mut builder = SourceConfig::defaults_for(kind).apply(&self.defaults)?;
        if let Some(overrides) = self.sources.get(kind.config_key()) {
            builder = builder.apply(overrides)?;
        }
        Ok(builder)
    }
}

/// Config file metadata.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Resolved config path, if one could be determined.
    pub path: Option<PathBuf>,
    /// Parsed config; empty when no file was loaded.
    pub config: FileConfig,
    /// Whether a file was actually read.
    pub loaded_from_file: bool,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/lawcrawler/config.toml`
/// 2. `$HOME/.config/lawcrawler/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("lawcrawler")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("lawcrawler")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads a config file that must exist.
///
/// # Errors
///
/// Returns [`ConfigError::Read`] if the file cannot be read, or any error of
/// [`FileConfig::parse`].
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loaded config file");
    FileConfig::parse(&raw, path)
}

/// Loads the config from the default path if a file exists there.
///
/// # Errors
///
/// Returns the errors of [`load_file_config`] when a file exists but is
/// unreadable or invalid.
pub fn load_default_file_config() -> Result<LoadedConfig, ConfigError> {
    let path = resolve_default_config_path();
    let Some(path_ref) = path.as_deref().filter(|p| p.exists()) else {
        return Ok(LoadedConfig {
            path,
            config: FileConfig::default(),
            loaded_from_file: false,
        });
    };

    let config = load_file_config(path_ref)?;
    Ok(LoadedConfig {
        path,
        config,
        loaded_from_file: true,
    })
}
