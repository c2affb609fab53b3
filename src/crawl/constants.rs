//! Constants for the crawl module (timeouts, pool bounds, pacing).

use std::time::Duration;

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default timeout for a whole request including the body (30 seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Minimum allowed worker pool size.
pub const MIN_WORKERS: usize = 1;

/// Maximum allowed worker pool size.
pub const MAX_WORKERS: usize = 100;

/// Default worker pool size.
pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Default progress chunk size.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Default lower bound of the inter-request delay.
pub const DEFAULT_DELAY_MIN: Duration = Duration::from_secs(1);

/// Default upper bound of the inter-request delay.
pub const DEFAULT_DELAY_MAX: Duration = Duration::from_secs(2);
