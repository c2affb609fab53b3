//! Retry logic with linear backoff for failed fetch attempts.
//!
//! Every failure of a work item (network error, HTTP error status, or a
//! parse failure of the fetched page) is treated the same way: it is retried
//! until the attempt budget is spent. The policy does not try to tell
//! transient failures from permanent ones.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use lawcrawler_core::crawl::{RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::new(3, Duration::from_millis(500));
//!
//! match policy.should_retry(1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Giving up: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

/// Default maximum attempts per work item (including the first).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff base; attempt `n` waits `base * n`.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before the next attempt.
        delay: Duration,
        /// Which attempt number the retry will be (1-indexed, so the first retry is 2).
        attempt: u32,
    },

    /// The attempt budget is spent; the item has permanently failed.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Retry budget and linear backoff for a single work item.
///
/// # Delay Calculation
///
/// ```text
/// delay(n) = backoff_base * n
/// ```
///
/// where `n` is the 1-based number of the attempt that just failed. With the
/// defaults the waits are 0.5s and 1s before attempts 2 and 3.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Multiplied by the failed attempt number to get the wait.
    backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy.
    ///
    /// `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// Creates a policy with a custom attempt budget and the default backoff.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the backoff base.
    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    /// Backoff to wait after attempt `attempt` failed.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(attempt.max(1))
    }

    /// Determines whether to retry after attempt `attempt` (1-indexed) failed.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.backoff_delay(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff_base(), Duration::from_millis(500));
    }

    #[test]
    fn test_retry_policy_max_attempts_minimum_is_one() {
        let policy = RetryPolicy::with_max_attempts(0);
        assert_eq!(policy.max_attempts(), 1);
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_backoff_is_linear_in_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(6));
    }

    #[test]
    fn test_should_retry_below_budget() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(
            policy.should_retry(1),
            RetryDecision::Retry {
                delay: Duration::from_millis(100),
                attempt: 2,
            }
        );
        assert_eq!(
            policy.should_retry(2),
            RetryDecision::Retry {
                delay: Duration::from_millis(200),
                attempt: 3,
            }
        );
    }

    #[test]
    fn test_should_not_retry_on_final_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        match policy.should_retry(3) {
            RetryDecision::DoNotRetry { reason } => {
                assert!(reason.contains("max attempts (3)"), "reason: {reason}");
            }
            RetryDecision::Retry { .. } => panic!("expected DoNotRetry on attempt 3"),
        }
    }

    #[test]
    fn test_single_attempt_policy_never_retries() {
        let policy = RetryPolicy::with_max_attempts(1);
        assert!(matches!(
            policy.should_retry(1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_zero_base_gives_zero_delay() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        assert_eq!(
            policy.should_retry(1),
            RetryDecision::Retry {
                delay: Duration::ZERO,
                attempt: 2,
            }
        );
    }
}
