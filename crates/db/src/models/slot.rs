//! Slot entity models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use velora_core::types::{DbId, Timestamp};

use super::status::StatusId;

/// A row from the `slots` table: one bookable unit of service capacity.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Slot {
    pub id: DbId,
    pub service_id: DbId,
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
    pub capacity: i32,
    pub status_id: StatusId,
    pub price_cents: i32,
    pub external_ref: Option<String>,
    pub needs_sync: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for publishing new availability.
#[derive(Debug, Deserialize)]
pub struct CreateSlot {
    pub service_id: DbId,
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
    pub capacity: Option<i32>,
    pub price_cents: Option<i32>,
}

/// Query parameters for `GET /api/v1/slots`.
#[derive(Debug, Deserialize)]
pub struct SlotListQuery {
    pub service_id: Option<DbId>,
    /// Only slots starting at or after this instant.
    pub from: Option<Timestamp>,
    /// Only slots starting before this instant.
    pub until: Option<Timestamp>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Canonical projection of a slot compared against external snapshots by
/// the conflict detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotProjection {
    pub status: String,
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
    pub price_cents: i32,
}
