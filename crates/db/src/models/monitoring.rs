//! Health sample and alert models.

use serde::Serialize;
use sqlx::FromRow;
use velora_core::entity::AlertSeverity;
use velora_core::types::{DbId, Timestamp};

use super::status::StatusId;

/// A row from the `health_samples` table: one point-in-time snapshot of
/// queue and conflict metrics, written by the monitor loop.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct HealthSample {
    pub id: DbId,
    pub sampled_at: Timestamp,
    pub pending_ops: i64,
    pub in_progress_ops: i64,
    pub failed_ops: i64,
    pub dead_letter_ops: i64,
    pub oldest_pending_age_secs: i64,
    pub error_rate: f64,
    pub avg_push_latency_ms: Option<f64>,
    pub open_conflicts: i64,
}

/// Metrics captured for a new sample (everything except id/sampled_at).
#[derive(Debug, Clone, Copy)]
pub struct NewHealthSample {
    pub pending_ops: i64,
    pub in_progress_ops: i64,
    pub failed_ops: i64,
    pub dead_letter_ops: i64,
    pub oldest_pending_age_secs: i64,
    pub error_rate: f64,
    pub avg_push_latency_ms: Option<f64>,
    pub open_conflicts: i64,
}

/// A row from the `alerts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Alert {
    pub id: DbId,
    pub rule: String,
    #[sqlx(try_from = "String")]
    pub severity: AlertSeverity,
    pub status_id: StatusId,
    pub message: String,
    pub created_at: Timestamp,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<Timestamp>,
    pub resolved_at: Option<Timestamp>,
}
