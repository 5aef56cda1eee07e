use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::metrics::MetricsSnapshot;
use crate::models::ConnectionStatus;

use super::backoff::{Backoff, BackoffPolicy};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum EngineStatus {
    #[default]
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum FetchPhase {
    #[default]
    Idle,
    Fetching,
    Backoff,
}

/// Result of a single fetch attempt as seen by callers.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FetchOutcome {
    Updated,
    Failed,
    /// Another fetch was in flight, the call came too soon after the
    /// previous one, or the engine was stopped mid-flight.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct EngineState {
    pub status: EngineStatus,
    pub phase: FetchPhase,
    pub refresh_rate_ms: u64,
    pub backoff: Backoff,
    pub ever_started: bool,
    pub last_attempt_at: Option<Instant>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl EngineState {
    pub fn new(refresh_rate_ms: u64, policy: BackoffPolicy) -> Self {
        Self {
            status: EngineStatus::Stopped,
            phase: FetchPhase::Idle,
            refresh_rate_ms,
            backoff: Backoff::new(policy),
            ever_started: false,
            last_attempt_at: None,
            last_success_at: None,
            last_error: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == EngineStatus::Running
    }

    pub fn begin(&mut self) {
        self.status = EngineStatus::Running;
        self.phase = FetchPhase::Idle;
        self.ever_started = true;
    }

    pub fn halt(&mut self) {
        self.status = EngineStatus::Stopped;
        self.phase = FetchPhase::Idle;
    }

    /// Whether a forced fetch now would land too close to the previous attempt.
    pub fn too_soon(&self, now: Instant, spacing: std::time::Duration) -> bool {
        self.last_attempt_at
            .map(|at| now.saturating_duration_since(at) < spacing)
            .unwrap_or(false)
    }
}

/// Diagnostic view returned by `SyncEngine::get_stats`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub status: EngineStatus,
    pub phase: FetchPhase,
    pub connection_status: Option<ConnectionStatus>,
    pub refresh_rate_ms: u64,
    pub retry_count: u32,
    pub consecutive_errors: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub has_snapshot: bool,
    pub snapshot_subscribers: usize,
    pub status_subscribers: usize,
    pub metrics: MetricsSnapshot,
}
