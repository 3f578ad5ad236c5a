//! Seed helpers shared by the repository integration tests.

#![allow(dead_code)]

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use sqlx::PgPool;
use velora_core::entity::{EntityKind, OpType};
use velora_core::types::DbId;
use velora_db::models::slot::{CreateSlot, Slot};
use velora_db::models::sync_operation::{EnqueueOp, SyncOperation};
use velora_db::repositories::{SlotRepo, SyncOperationRepo};

pub const DEDUPE_WINDOW: Duration = Duration::from_secs(60);

pub async fn seed_slot(pool: &PgPool, capacity: i32) -> Slot {
    let starts_at = Utc::now() + ChronoDuration::hours(24);
    SlotRepo::create(
        pool,
        &CreateSlot {
            service_id: 1,
            starts_at,
            ends_at: starts_at + ChronoDuration::hours(1),
            capacity: Some(capacity),
            price_cents: Some(5000),
        },
    )
    .await
    .expect("seed slot")
}

/// Enqueue an operation with a payload derived from `tag`, so two calls
/// with the same tag deduplicate and different tags do not.
pub async fn enqueue_op(
    pool: &PgPool,
    op_type: OpType,
    entity_id: DbId,
    priority: i32,
    tag: &str,
) -> SyncOperation {
    SyncOperationRepo::enqueue(
        pool,
        &EnqueueOp {
            op_type,
            entity_kind: EntityKind::Booking,
            entity_id,
            external_ref: None,
            payload: json!({ "tag": tag }),
            priority,
            max_attempts: 3,
        },
        DEDUPE_WINDOW,
    )
    .await
    .expect("enqueue")
}
