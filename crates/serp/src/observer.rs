// ABOUTME: Batch lifecycle observer seam with tracing-backed and no-op implementations.
// ABOUTME: Keeps logging out of the extraction core; the orchestrator reports through this trait.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::result::{BatchResult, QueryOutcome, QueryTask};

/// Receives batch lifecycle notifications.
///
/// Implementations must not panic; they run inline with the batch.
pub trait BatchObserver: Send + Sync {
    /// A batch of `size` tasks is about to start.
    fn on_batch_start(&self, _size: usize, _timeout: Duration) {}

    /// One task has been dispatched.
    fn on_query_start(&self, _task: &QueryTask) {}

    /// One task settled after `elapsed`.
    fn on_query_settled(&self, _task: &QueryTask, _outcome: &QueryOutcome, _elapsed: Duration) {}

    /// Every task has settled.
    fn on_batch_end(&self, _result: &BatchResult, _elapsed: Duration) {}
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl BatchObserver for NoOpObserver {}

/// Emits `tracing` events for each lifecycle step.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl BatchObserver for TracingObserver {
    fn on_batch_start(&self, size: usize, timeout: Duration) {
        info!(
            tasks = size,
            timeout_ms = timeout.as_millis() as u64,
            "batch started"
        );
    }

    fn on_query_start(&self, task: &QueryTask) {
        debug!(query = %task.query, query_id = ?task.query_id, "query dispatched");
    }

    fn on_query_settled(&self, task: &QueryTask, outcome: &QueryOutcome, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        match outcome {
            QueryOutcome::Success(record) => debug!(
                query = %task.query,
                fields = record.len(),
                elapsed_ms,
                "query succeeded"
            ),
            QueryOutcome::SoftFailure(msg) => warn!(
                query = %task.query,
                elapsed_ms,
                reason = %msg,
                "query returned no content"
            ),
            QueryOutcome::HardFailure(err) => warn!(
                query = %task.query,
                elapsed_ms,
                code = err.code.as_str(),
                error = %err,
                "query failed"
            ),
            QueryOutcome::Timeout(bound) => warn!(
                query = %task.query,
                bound_ms = bound.as_millis() as u64,
                "query timed out"
            ),
        }
    }

    fn on_batch_end(&self, result: &BatchResult, elapsed: Duration) {
        info!(
            tasks = result.len(),
            succeeded = result.success_count(),
            elapsed_ms = elapsed.as_millis() as u64,
            "batch finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SerpError;

    #[test]
    fn observers_accept_every_outcome() {
        let task = QueryTask::new("rust");
        let outcomes = [
            QueryOutcome::Success(Default::default()),
            QueryOutcome::SoftFailure("empty".to_string()),
            QueryOutcome::HardFailure(SerpError::fetch("rust", "Fetch", None)),
            QueryOutcome::Timeout(Duration::from_millis(5)),
        ];
        let observers: [&dyn BatchObserver; 2] = [&NoOpObserver, &TracingObserver];
        for observer in observers {
            observer.on_batch_start(outcomes.len(), Duration::from_secs(1));
            for outcome in &outcomes {
                observer.on_query_start(&task);
                observer.on_query_settled(&task, outcome, Duration::from_millis(1));
            }
            observer.on_batch_end(&BatchResult::default(), Duration::from_millis(2));
        }
    }
}
