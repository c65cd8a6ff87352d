//! Progress reporting for the quorum wait.
//!
//! While a participant waits for quorum, the page shows a progress bar that
//! tracks `n` of `q` required participants. The reporter trait is the seam
//! between the quorum notifier and whatever renders that indicator.

use async_trait::async_trait;

/// Format the quorum indicator label: `round(n/q * 100)` with a trailing `%`.
pub fn percent_label(current: u64, total: u64) -> String {
    if total == 0 {
        return "0%".to_string();
    }
    let percent = (current as f64 / total as f64 * 100.0).round() as i64;
    format!("{percent}%")
}

/// Sink for quorum progress updates.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    /// Report that `current` of `total` required participants are present.
    ///
    /// Updates are best-effort; a reporter that cannot render has nothing
    /// useful to return.
    async fn report_count(&self, current: u64, total: u64);
}

/// A reporter that drops all updates.
#[derive(Debug, Clone, Default)]
pub struct NoopProgressReporter;

#[async_trait]
impl ProgressReporter for NoopProgressReporter {
    async fn report_count(&self, _current: u64, _total: u64) {}
}

/// A reporter that logs updates through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LogProgressReporter;

#[async_trait]
impl ProgressReporter for LogProgressReporter {
    async fn report_count(&self, current: u64, total: u64) {
        tracing::info!(
            current,
            total,
            label = %percent_label(current, total),
            "quorum progress"
        );
    }
}
