mod types;

pub use types::{AttemptMetrics, AttemptResult, MetricsSnapshot};

use std::sync::Arc;
use tokio::sync::Mutex;

const MAX_RECENT_ATTEMPTS: usize = 20;

/// Rolling record of fetch attempts for diagnostics.
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

#[derive(Default)]
struct MetricsState {
    recent_attempts: Vec<AttemptMetrics>,
    attempt_count: u64,
    success_count: u64,
    failure_count: u64,
    skipped_count: u64,
    cancelled_count: u64,
    cooldown_count: u64,
    total_fetch_ms: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent_attempts: Vec::with_capacity(MAX_RECENT_ATTEMPTS),
                ..Default::default()
            })),
        }
    }

    pub async fn record_attempt(&self, metrics: AttemptMetrics) {
        let mut state = self.inner.lock().await;

        state.attempt_count += 1;
        match metrics.result {
            AttemptResult::Success => {
                state.success_count += 1;
                state.total_fetch_ms += metrics.duration_ms;
            }
            AttemptResult::Failure => state.failure_count += 1,
            AttemptResult::Skipped => state.skipped_count += 1,
            AttemptResult::Cancelled => state.cancelled_count += 1,
        }

        state.recent_attempts.push(metrics);

        if state.recent_attempts.len() > MAX_RECENT_ATTEMPTS {
            state.recent_attempts.remove(0);
        }
    }

    pub async fn record_cooldown(&self) {
        self.inner.lock().await.cooldown_count += 1;
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let state = self.inner.lock().await;

        let avg_fetch_ms = (state.success_count > 0)
            .then(|| state.total_fetch_ms as f64 / state.success_count as f64);

        MetricsSnapshot {
            recent_attempts: state.recent_attempts.clone(),
            attempt_count: state.attempt_count,
            success_count: state.success_count,
            failure_count: state.failure_count,
            skipped_count: state.skipped_count,
            cancelled_count: state.cancelled_count,
            cooldown_count: state.cooldown_count,
            avg_fetch_ms,
        }
    }

    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        *state = MetricsState::default();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MetricsCollector {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn attempt(result: AttemptResult, duration_ms: u64) -> AttemptMetrics {
        AttemptMetrics {
            timestamp: Utc::now(),
            forced: false,
            result,
            duration_ms,
            readings: None,
            error: None,
            next_delay_ms: None,
        }
    }

    #[tokio::test]
    async fn keeps_a_bounded_window_of_attempts() {
        let metrics = MetricsCollector::new();
        for i in 0..25 {
            metrics.record_attempt(attempt(AttemptResult::Success, i)).await;
        }

        let snapshot = metrics.get_snapshot().await;
        assert_eq!(snapshot.attempt_count, 25);
        assert_eq!(snapshot.recent_attempts.len(), MAX_RECENT_ATTEMPTS);
        assert_eq!(snapshot.recent_attempts[0].duration_ms, 5);
        assert_eq!(snapshot.avg_fetch_ms, Some(12.0));
    }

    #[tokio::test]
    async fn counts_by_result_and_resets() {
        let metrics = MetricsCollector::new();
        metrics.record_attempt(attempt(AttemptResult::Failure, 0)).await;
        metrics.record_attempt(attempt(AttemptResult::Skipped, 0)).await;
        metrics.record_attempt(AttemptMetrics::skipped(true)).await;
        metrics.record_cooldown().await;

        let snapshot = metrics.get_snapshot().await;
        assert_eq!(snapshot.failure_count, 1);
        assert_eq!(snapshot.skipped_count, 2);
        assert_eq!(snapshot.cooldown_count, 1);
        assert_eq!(snapshot.avg_fetch_ms, None);

        metrics.reset().await;
        assert_eq!(metrics.get_snapshot().await, MetricsSnapshot::default());
    }
}
