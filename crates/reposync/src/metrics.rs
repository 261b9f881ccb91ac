//! Sync outcome reporting.

use std::time::Duration;

/// Receives one report per sync run.
///
/// Implementations must be safe to share between controllers running on
/// different threads.
pub trait SyncMetrics: Send + Sync {
    /// A run failed.
    fn record_failure(&self, source: &str, repository: &str);

    /// A run that contacted the remote succeeded.
    fn record_success(&self, source: &str, repository: &str, duration: Duration);
}

/// Discards all reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl SyncMetrics for NoopMetrics {
    fn record_failure(&self, _source: &str, _repository: &str) {}

    fn record_success(&self, _source: &str, _repository: &str, _duration: Duration) {}
}

/// Emits reports as tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMetrics;

impl SyncMetrics for LogMetrics {
    fn record_failure(&self, source: &str, repository: &str) {
        tracing::error!(source, repository, "Sync failed");
    }

    fn record_success(&self, source: &str, repository: &str, duration: Duration) {
        tracing::info!(
            source,
            repository,
            duration_ms = duration.as_millis() as u64,
            "Sync succeeded"
        );
    }
}
