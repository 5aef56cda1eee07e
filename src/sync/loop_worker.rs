use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::detector::{aggregate, diff};
use crate::metrics::{AttemptMetrics, AttemptResult};
use crate::models::{ConnectionStatus, RawReading, Snapshot};

use super::backoff::NextAttempt;
use super::controller::EngineInner;
use super::error::FetchError;
use super::state::{FetchOutcome, FetchPhase};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

pub(super) struct AttemptReport {
    pub outcome: FetchOutcome,
    /// Set on failure: how long the loop should wait before trying again.
    pub next: Option<NextAttempt>,
}

impl AttemptReport {
    fn skipped() -> Self {
        Self {
            outcome: FetchOutcome::Skipped,
            next: None,
        }
    }
}

/// Clears the single-flight flag however the attempt ends.
struct FetchGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FetchGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub(super) async fn sync_loop(inner: Arc<EngineInner>, cancel_token: CancellationToken) {
    log_info!(
        "sync loop started (interval {}ms)",
        inner.refresh_interval().as_millis()
    );

    let mut delay = Duration::ZERO;

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = inner.wake.notified() => {
                delay = inner.refresh_interval();
                log_debug!("refresh rate changed, next attempt in {}ms", delay.as_millis());
                continue;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        let report = run_attempt(&inner, false, &cancel_token).await;
        if cancel_token.is_cancelled() {
            break;
        }

        let interval = inner.refresh_interval();
        delay = report
            .next
            .map(|next| next.delay(interval))
            .unwrap_or(interval);
    }

    log_info!("sync loop shutting down");
}

/// One fetch, end to end: gate, fetch under timeout and cancellation, then
/// publish and notify.
pub(super) async fn run_attempt(
    inner: &EngineInner,
    forced: bool,
    cancel_token: &CancellationToken,
) -> AttemptReport {
    let now = Instant::now();
    if forced && inner.lock_state().too_soon(now, inner.config.min_fetch_spacing) {
        log_debug!(
            "forced fetch skipped: previous attempt started under {}ms ago",
            inner.config.min_fetch_spacing.as_millis()
        );
        inner.metrics.record_attempt(AttemptMetrics::skipped(forced)).await;
        return AttemptReport::skipped();
    }

    let Some(_guard) = FetchGuard::acquire(&inner.fetching) else {
        log_debug!("fetch skipped: another attempt is in flight");
        inner.metrics.record_attempt(AttemptMetrics::skipped(forced)).await;
        return AttemptReport::skipped();
    };

    {
        let mut state = inner.lock_state();
        state.last_attempt_at = Some(now);
        state.phase = FetchPhase::Fetching;
    }

    let timestamp = Utc::now();
    let fetch_timeout = inner.config.fetch_timeout;
    let result = tokio::select! {
        biased;
        _ = cancel_token.cancelled() => Err(FetchError::Cancelled),
        fetched = tokio::time::timeout(fetch_timeout, inner.source.fetch()) => {
            fetched.unwrap_or(Err(FetchError::Timeout(fetch_timeout)))
        }
    };
    let duration_ms = u64::try_from(now.elapsed().as_millis()).unwrap_or(u64::MAX);

    let mut metrics = AttemptMetrics {
        timestamp,
        forced,
        result: AttemptResult::Success,
        duration_ms,
        readings: None,
        error: None,
        next_delay_ms: None,
    };

    if cancel_token.is_cancelled() || result.as_ref().is_err_and(FetchError::is_cancelled) {
        inner.lock_state().phase = FetchPhase::Idle;
        log_debug!("fetch cancelled after {}ms", duration_ms);
        metrics.result = AttemptResult::Cancelled;
        inner.metrics.record_attempt(metrics).await;
        return AttemptReport::skipped();
    }

    match result {
        Ok(readings) => {
            let count = apply_success(inner, readings).await;
            metrics.readings = Some(count);
            inner.metrics.record_attempt(metrics).await;
            AttemptReport {
                outcome: FetchOutcome::Updated,
                next: None,
            }
        }
        Err(err) => {
            let next = apply_failure(inner, &err).await;
            metrics.result = AttemptResult::Failure;
            metrics.error = Some(err.to_string());
            metrics.next_delay_ms = Some(
                u64::try_from(next.delay(inner.refresh_interval()).as_millis()).unwrap_or(u64::MAX),
            );
            inner.metrics.record_attempt(metrics).await;
            AttemptReport {
                outcome: FetchOutcome::Failed,
                next: Some(next),
            }
        }
    }
}

async fn apply_success(inner: &EngineInner, readings: Vec<RawReading>) -> usize {
    let snapshot = aggregate(&readings);
    let previous = inner.lock_last_good().replace(snapshot.clone());

    {
        let mut state = inner.lock_state();
        state.backoff.on_success();
        state.phase = FetchPhase::Idle;
        state.last_success_at = Some(Utc::now());
        state.last_error = None;
    }

    log_debug!(
        "snapshot: {}/{} spots free across {} floors",
        snapshot.available_spots,
        snapshot.total_spots,
        snapshot.floors.len()
    );

    inner.publish_snapshot(snapshot.clone());
    inner.publish_status(ConnectionStatus::Connected);

    if let (Some(previous), Some(dispatcher)) = (previous, inner.dispatcher.as_ref()) {
        let changes = diff(&previous, &snapshot);
        if !changes.is_empty() {
            log_info!(
                "{} slots newly available, {} floors with more space",
                changes.newly_available.len(),
                changes.floor_increases.len()
            );
            dispatcher.notify_changes(&changes, &snapshot).await;
        }
    }

    snapshot.sensor_data.len()
}

async fn apply_failure(inner: &EngineInner, err: &FetchError) -> NextAttempt {
    let interval = inner.refresh_interval();
    let (next, consecutive) = {
        let mut state = inner.lock_state();
        let next = state.backoff.on_failure(err.is_auth(), interval);
        state.phase = FetchPhase::Backoff;
        state.last_error = Some(err.to_string());
        (next, state.backoff.consecutive_errors())
    };

    log_warn!(
        "fetch failed: {err} (consecutive errors {consecutive}, next attempt in {}ms)",
        next.delay(interval).as_millis()
    );
    if next.is_cooldown() {
        log_error!(
            "consecutive error ceiling reached, cooling down for {}ms",
            next.delay(interval).as_millis()
        );
        inner.metrics.record_cooldown().await;
    }

    let descriptor = format!("Connection error: {err}");
    let stale = match inner.lock_last_good().as_ref() {
        Some(last) => last.stale(descriptor),
        None => Snapshot::empty(descriptor),
    };
    inner.publish_snapshot(stale);
    inner.publish_status(ConnectionStatus::Error);

    next
}
