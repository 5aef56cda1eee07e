use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AttemptResult {
    Success,
    Failure,
    Skipped,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttemptMetrics {
    pub timestamp: DateTime<Utc>,
    pub forced: bool,
    pub result: AttemptResult,
    pub duration_ms: u64,
    /// Assigned readings in the snapshot, on success.
    pub readings: Option<usize>,
    pub error: Option<String>,
    /// Delay chosen before the next scheduled attempt, on failure.
    pub next_delay_ms: Option<u64>,
}

impl AttemptMetrics {
    pub fn skipped(forced: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            forced,
            result: AttemptResult::Skipped,
            duration_ms: 0,
            readings: None,
            error: None,
            next_delay_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub recent_attempts: Vec<AttemptMetrics>,
    pub attempt_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub skipped_count: u64,
    pub cancelled_count: u64,
    pub cooldown_count: u64,
    pub avg_fetch_ms: Option<f64>,
}
