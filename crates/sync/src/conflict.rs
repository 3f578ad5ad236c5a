//! Conflict detection and resolution policies.
//!
//! Detection compares canonical projections (status, times, price); price
//! differences within the configured tolerance are not conflicts.
//! Resolution marks the conflict row terminal first, then runs the
//! policy's side effects, so a second resolve of the same conflict always
//! fails before touching anything.

use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use velora_booksy::types::ExternalBooking;
use velora_core::entity::{
    ConflictType, EntityKind, OpType, Resolution, PRIORITY_AVAILABILITY, PRIORITY_BOOKING,
};
use velora_core::error::CoreError;
use velora_core::types::{DbId, Timestamp};
use velora_db::models::booking::{Booking, BookingProjection};
use velora_db::models::conflict::{Conflict, NewConflict};
use velora_db::models::slot::SlotProjection;
use velora_db::models::status::{BookingStatus, SlotStatus, StatusId};
use velora_db::models::sync_operation::EnqueueOp;
use velora_db::repositories::{BookingRepo, ConflictRepo, SlotRepo, SyncOperationRepo};

use crate::config::SyncConfig;
use crate::{db_err, engine, json_err};

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Whether the local projection and the external snapshot disagree on
/// anything beyond the price tolerance.
pub fn booking_diverges(
    local: &BookingProjection,
    external: &ExternalBooking,
    tolerance_cents: i32,
) -> bool {
    local.status != external.status
        || local.starts_at != external.starts_at
        || local.ends_at != external.ends_at
        || (local.price_cents - external.price_cents).abs() > tolerance_cents
}

/// Canonical projection of a local booking, with times from its slot.
pub async fn booking_projection(
    pool: &PgPool,
    booking: &Booking,
) -> Result<BookingProjection, CoreError> {
    let slot = SlotRepo::find_by_id(pool, booking.slot_id)
        .await
        .map_err(db_err)?
        .ok_or(CoreError::NotFound { entity: "Slot", id: booking.slot_id })?;
    Ok(BookingProjection {
        status: engine::booking_status_str(booking.status_id).to_string(),
        starts_at: slot.starts_at,
        ends_at: slot.ends_at,
        price_cents: booking.price_cents,
    })
}

/// Compare a local booking against an external snapshot and record a
/// `data_mismatch` conflict when they diverge.
///
/// At most one conflict stays open per entity; an existing open one is
/// returned untouched instead of stacking duplicates.
pub async fn record_booking_mismatch(
    pool: &PgPool,
    booking: &Booking,
    external: &ExternalBooking,
    tolerance_cents: i32,
) -> Result<Option<Conflict>, CoreError> {
    if let Some(open) =
        ConflictRepo::find_open_for_entity(pool, EntityKind::Booking, booking.id)
            .await
            .map_err(db_err)?
    {
        return Ok(Some(open));
    }

    let local = booking_projection(pool, booking).await?;
    if !booking_diverges(&local, external, tolerance_cents) {
        return Ok(None);
    }

    let conflict = ConflictRepo::create(
        pool,
        &NewConflict {
            entity_kind: EntityKind::Booking,
            entity_id: booking.id,
            external_ref: Some(external.external_ref.clone()),
            conflict_type: ConflictType::DataMismatch,
            local_snapshot: serde_json::to_value(&local).ok(),
            external_snapshot: serde_json::to_value(external).ok(),
        },
    )
    .await
    .map_err(db_err)?;
    Ok(Some(conflict))
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Fields a resolution needs from a stored or operator-supplied snapshot.
/// Extra fields are ignored, so both wire snapshots and projections parse.
#[derive(Debug, Deserialize)]
struct SnapshotFields {
    status: String,
    #[serde(default)]
    starts_at: Option<Timestamp>,
    #[serde(default)]
    ends_at: Option<Timestamp>,
    price_cents: i32,
}

/// Apply a resolution policy to an open conflict.
///
/// - `platform_wins` re-enqueues an update whose payload is the platform
///   state captured now, at resolution time.
/// - `external_wins` applies the recorded external snapshot locally and
///   completes the entity's queued operations; nothing remains to push.
/// - `merged` applies the operator-supplied payload locally and enqueues
///   it for the external side. The payload is required.
pub async fn resolve(
    pool: &PgPool,
    config: &SyncConfig,
    conflict_id: DbId,
    policy: Resolution,
    actor: &str,
    merged_payload: Option<Value>,
) -> Result<Conflict, CoreError> {
    if policy == Resolution::Merged && merged_payload.is_none() {
        return Err(CoreError::Validation(
            "merged resolution requires a merged payload".to_string(),
        ));
    }
    if policy == Resolution::ExternalWins {
        let open = ConflictRepo::find_by_id(pool, conflict_id)
            .await
            .map_err(db_err)?
            .ok_or(CoreError::NotFound { entity: "Conflict", id: conflict_id })?;
        if open.external_snapshot.is_none() {
            return Err(CoreError::Validation(
                "conflict has no external snapshot to apply".to_string(),
            ));
        }
    }

    let conflict = ConflictRepo::resolve(pool, conflict_id, policy, actor).await?;

    match policy {
        Resolution::PlatformWins => requeue_platform_snapshot(pool, config, &conflict).await?,
        Resolution::ExternalWins => {
            let snapshot = conflict.external_snapshot.clone().ok_or_else(|| {
                CoreError::Validation("conflict has no external snapshot to apply".to_string())
            })?;
            apply_snapshot(pool, &conflict, &snapshot).await?;
            SyncOperationRepo::complete_pending_for_entity(
                pool,
                conflict.entity_kind,
                conflict.entity_id,
            )
            .await
            .map_err(db_err)?;
        }
        Resolution::Merged => {
            let payload = merged_payload.ok_or_else(|| {
                CoreError::Validation("merged resolution requires a merged payload".to_string())
            })?;
            apply_snapshot(pool, &conflict, &payload).await?;
            enqueue_resolution_payload(pool, config, &conflict, payload).await?;
        }
    }
    Ok(conflict)
}

/// Capture the platform's current state for the entity and queue it as an
/// update toward the external side.
async fn requeue_platform_snapshot(
    pool: &PgPool,
    config: &SyncConfig,
    conflict: &Conflict,
) -> Result<(), CoreError> {
    match conflict.entity_kind {
        EntityKind::Booking => {
            let booking = BookingRepo::find_by_id(pool, conflict.entity_id)
                .await
                .map_err(db_err)?
                .ok_or(CoreError::NotFound { entity: "Booking", id: conflict.entity_id })?;
            let payload = serde_json::to_value(engine::booking_payload(pool, &booking).await?)
                .map_err(json_err)?;
            let op_type =
                if booking.external_ref.is_some() { OpType::Update } else { OpType::Create };
            SyncOperationRepo::enqueue(
                pool,
                &EnqueueOp {
                    op_type,
                    entity_kind: EntityKind::Booking,
                    entity_id: booking.id,
                    external_ref: booking.external_ref.clone(),
                    payload,
                    priority: PRIORITY_BOOKING,
                    max_attempts: config.max_attempts,
                },
                config.dedupe_window,
            )
            .await
            .map_err(db_err)?;
        }
        EntityKind::AvailabilitySlot => {
            let slot = SlotRepo::find_by_id(pool, conflict.entity_id)
                .await
                .map_err(db_err)?
                .ok_or(CoreError::NotFound { entity: "Slot", id: conflict.entity_id })?;
            let payload = serde_json::to_value(engine::slot_payload(&slot)).map_err(json_err)?;
            let op_type = if slot.external_ref.is_some() { OpType::Update } else { OpType::Create };
            SyncOperationRepo::enqueue(
                pool,
                &EnqueueOp {
                    op_type,
                    entity_kind: EntityKind::AvailabilitySlot,
                    entity_id: slot.id,
                    external_ref: slot.external_ref.clone(),
                    payload,
                    priority: PRIORITY_AVAILABILITY,
                    max_attempts: config.max_attempts,
                },
                config.dedupe_window,
            )
            .await
            .map_err(db_err)?;
        }
    }
    Ok(())
}

/// Overwrite the local entity's projected fields from a snapshot.
async fn apply_snapshot(
    pool: &PgPool,
    conflict: &Conflict,
    snapshot: &Value,
) -> Result<(), CoreError> {
    let fields: SnapshotFields = serde_json::from_value(snapshot.clone())
        .map_err(|e| CoreError::Validation(format!("snapshot is missing required fields: {e}")))?;

    match conflict.entity_kind {
        EntityKind::Booking => {
            let status_id = booking_status_id(&fields.status)?;
            let applied = BookingRepo::apply_external_projection(
                pool,
                conflict.entity_id,
                status_id,
                fields.price_cents,
            )
            .await
            .map_err(db_err)?;
            if !applied {
                return Err(CoreError::NotFound { entity: "Booking", id: conflict.entity_id });
            }
        }
        EntityKind::AvailabilitySlot => {
            let status_id = slot_status_id(&fields.status)?;
            let (Some(starts_at), Some(ends_at)) = (fields.starts_at, fields.ends_at) else {
                return Err(CoreError::Validation(
                    "slot snapshot requires starts_at and ends_at".to_string(),
                ));
            };
            let projection = SlotProjection {
                status: fields.status.clone(),
                starts_at,
                ends_at,
                price_cents: fields.price_cents,
            };
            let applied =
                SlotRepo::apply_external_projection(pool, conflict.entity_id, status_id, &projection)
                    .await
                    .map_err(db_err)?;
            if !applied {
                return Err(CoreError::NotFound { entity: "Slot", id: conflict.entity_id });
            }
        }
    }
    Ok(())
}

/// Queue an operator-merged payload for the external side.
async fn enqueue_resolution_payload(
    pool: &PgPool,
    config: &SyncConfig,
    conflict: &Conflict,
    payload: Value,
) -> Result<(), CoreError> {
    let priority = match conflict.entity_kind {
        EntityKind::Booking => PRIORITY_BOOKING,
        EntityKind::AvailabilitySlot => PRIORITY_AVAILABILITY,
    };
    SyncOperationRepo::enqueue(
        pool,
        &EnqueueOp {
            op_type: OpType::Update,
            entity_kind: conflict.entity_kind,
            entity_id: conflict.entity_id,
            external_ref: conflict.external_ref.clone(),
            payload,
            priority,
            max_attempts: config.max_attempts,
        },
        config.dedupe_window,
    )
    .await
    .map_err(db_err)?;
    Ok(())
}

fn booking_status_id(status: &str) -> Result<StatusId, CoreError> {
    match status {
        "pending" => Ok(BookingStatus::Pending.id()),
        "confirmed" => Ok(BookingStatus::Confirmed.id()),
        "cancelled" => Ok(BookingStatus::Cancelled.id()),
        other => Err(CoreError::Validation(format!("Unknown booking status: {other}"))),
    }
}

fn slot_status_id(status: &str) -> Result<StatusId, CoreError> {
    match status {
        "available" => Ok(SlotStatus::Available.id()),
        "held" => Ok(SlotStatus::Held.id()),
        "booked" => Ok(SlotStatus::Booked.id()),
        "blocked" => Ok(SlotStatus::Blocked.id()),
        other => Err(CoreError::Validation(format!("Unknown slot status: {other}"))),
    }
}
