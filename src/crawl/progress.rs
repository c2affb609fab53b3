//! Per-batch progress indicator.

use std::io::IsTerminal;
use std::sync::atomic::{AtomicUsize, Ordering};

use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str = "{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg} ({elapsed})";

/// Completion counter for one batch, optionally drawn as a progress bar.
///
/// Advances once per completed item. The bar is hidden when disabled or when
/// stderr is not a terminal; the counters are kept either way.
#[derive(Debug)]
pub struct BatchProgress {
    bar: ProgressBar,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl BatchProgress {
    /// Creates the indicator for `total` items.
    #[must_use]
    pub fn new(label: &str, total: usize, enabled: bool) -> Self {
        let total_u64 = u64::try_from(total).unwrap_or(u64::MAX);
        let bar = if enabled && std::io::stderr().is_terminal() {
            let bar = ProgressBar::new(total_u64);
            bar.set_style(
                ProgressStyle::with_template(BAR_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
            bar
        } else {
            ProgressBar::hidden()
        };
        bar.set_length(total_u64);
        bar.set_prefix(label.to_string());
        Self {
            bar,
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Creates an indicator that never draws.
    #[must_use]
    pub fn hidden(total: usize) -> Self {
        Self::new("", total, false)
    }

    /// Records one successful item and returns the number completed so far.
    pub fn record_success(&self) -> usize {
        let succeeded = self.succeeded.fetch_add(1, Ordering::SeqCst) + 1;
        self.advance();
        succeeded + self.failed.load(Ordering::SeqCst)
    }

    /// Records one failed item and returns the number completed so far.
    pub fn record_failure(&self) -> usize {
        let failed = self.failed.fetch_add(1, Ordering::SeqCst) + 1;
        self.advance();
        failed + self.succeeded.load(Ordering::SeqCst)
    }

    /// Returns the number of completed items.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst) + self.failed.load(Ordering::SeqCst)
    }

    /// Returns the number of successful items.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    /// Returns the number of failed items.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Clears the bar from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn advance(&self) {
        self.bar.inc(1);
        self.bar.set_message(format!(
            "ok {} / failed {}",
            self.succeeded.load(Ordering::SeqCst),
            self.failed.load(Ordering::SeqCst)
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_progress_counts_items() {
        let progress = BatchProgress::hidden(3);
        assert_eq!(progress.record_success(), 1);
        assert_eq!(progress.record_failure(), 2);
        assert_eq!(progress.record_success(), 3);
        assert_eq!(progress.completed(), 3);
        assert_eq!(progress.succeeded(), 2);
        assert_eq!(progress.failed(), 1);
        progress.finish();
    }

    #[test]
    fn test_progress_bar_position_advances_per_item() {
        let progress = BatchProgress::new("taipei", 2, false);
        progress.record_success();
        assert_eq!(progress.bar.position(), 1);
        progress.record_failure();
        assert_eq!(progress.bar.position(), 2);
    }
}
