//! Randomized inter-request delay for crawl workers.
//!
//! This module provides the [`RateLimiter`] which pauses a worker for a
//! random duration drawn uniformly from `[delay_min, delay_max]` before the
//! worker touches the network.
//!
//! # Overview
//!
//! The limiter holds no per-worker or per-domain state: every worker draws its
//! own delay independently, so the effective request rate is bounded by
//! `max_workers / delay_min` rather than serialized globally. The wait can be
//! interrupted by a [`CancellationToken`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use lawcrawler_core::crawl::RateLimiter;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(Duration::from_secs(1), Duration::from_secs(2));
//! let cancel = CancellationToken::new();
//!
//! // Sleeps somewhere between one and two seconds
//! let completed = limiter.wait(&cancel).await;
//! assert!(completed);
//! # }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Jittered delay applied before each work item is fetched.
///
/// `RateLimiter` is `Send + Sync` and cheap to share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Lower bound of the delay window.
    delay_min: Duration,

    /// Upper bound of the delay window.
    delay_max: Duration,
}

impl RateLimiter {
    /// Creates a limiter drawing delays from `[delay_min, delay_max]`.
    ///
    /// Bounds given in the wrong order are swapped.
    #[must_use]
    #[instrument(skip_all, fields(min_ms = delay_min.as_millis(), max_ms = delay_max.as_millis()))]
    pub fn new(delay_min: Duration, delay_max: Duration) -> Self {
        debug!("creating rate limiter");
        let (delay_min, delay_max) = if delay_min <= delay_max {
            (delay_min, delay_max)
        } else {
            (delay_max, delay_min)
        };
        Self {
            delay_min,
            delay_max,
        }
    }

    /// Creates a limiter that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Returns whether the limiter never waits.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.delay_max.is_zero()
    }

    /// Returns the lower bound of the delay window.
    #[must_use]
    pub fn delay_min(&self) -> Duration {
        self.delay_min
    }

    /// Returns the upper bound of the delay window.
    #[must_use]
    pub fn delay_max(&self) -> Duration {
        self.delay_max
    }

    /// Draws the next delay uniformly from the configured window.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        if self.delay_min == self.delay_max {
            return self.delay_min;
        }
        rand::thread_rng().gen_range(self.delay_min..=self.delay_max)
    }

    /// Sleeps for one drawn delay.
    ///
    /// Returns `false` if `cancel` fired before the delay elapsed.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        let delay = self.next_delay();
        if delay.is_zero() {
            return true;
        }

        debug!(delay_ms = delay.as_millis(), "pacing request");
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}
