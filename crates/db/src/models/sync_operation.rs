//! Sync operation queue models and DTOs.

use serde::Serialize;
use sqlx::FromRow;
use velora_core::entity::{EntityKind, OpType};
use velora_core::types::{DbId, Timestamp};

use super::status::StatusId;

/// A row from the `sync_operations` table: one unit of propagation work
/// between the platform and the external scheduling system.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SyncOperation {
    pub id: DbId,
    #[sqlx(try_from = "String")]
    pub op_type: OpType,
    #[sqlx(try_from = "String")]
    pub entity_kind: EntityKind,
    pub entity_id: DbId,
    pub external_ref: Option<String>,
    pub payload: serde_json::Value,
    pub payload_hash: String,
    pub priority: i32,
    pub status_id: StatusId,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_retry_at: Timestamp,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

/// Input for enqueuing a new operation.
#[derive(Debug, Clone)]
pub struct EnqueueOp {
    pub op_type: OpType,
    pub entity_kind: EntityKind,
    pub entity_id: DbId,
    pub external_ref: Option<String>,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub max_attempts: i32,
}

/// Queue depth broken down by operation status.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueCounts {
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub failed: i64,
    pub dead_letter: i64,
}
