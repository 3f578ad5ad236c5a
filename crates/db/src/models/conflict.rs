//! Conflict audit-trail models and DTOs.

use serde::Serialize;
use sqlx::FromRow;
use velora_core::entity::{ConflictType, EntityKind, Resolution};
use velora_core::types::{DbId, Timestamp};

/// A row from the `conflicts` table: a recorded divergence between the
/// platform view and the external view of one entity.
///
/// Rows are never deleted; a resolved conflict stays as an audit record
/// and a fresh divergence opens a new row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Conflict {
    pub id: DbId,
    #[sqlx(try_from = "String")]
    pub entity_kind: EntityKind,
    pub entity_id: DbId,
    pub external_ref: Option<String>,
    #[sqlx(try_from = "String")]
    pub conflict_type: ConflictType,
    pub local_snapshot: Option<serde_json::Value>,
    pub external_snapshot: Option<serde_json::Value>,
    pub resolution: Option<String>,
    pub resolved_at: Option<Timestamp>,
    pub resolved_by: Option<String>,
    pub detected_at: Timestamp,
}

impl Conflict {
    /// Parsed resolution, if the conflict has been resolved.
    pub fn parsed_resolution(&self) -> Option<Resolution> {
        self.resolution.clone().and_then(|r| Resolution::try_from(r).ok())
    }
}

/// Input for opening a new conflict record.
#[derive(Debug, Clone)]
pub struct NewConflict {
    pub entity_kind: EntityKind,
    pub entity_id: DbId,
    pub external_ref: Option<String>,
    pub conflict_type: ConflictType,
    pub local_snapshot: Option<serde_json::Value>,
    pub external_snapshot: Option<serde_json::Value>,
}
