//! Repository for the `slots` table.

use sqlx::PgPool;
use velora_core::types::{DbId, Timestamp};

use crate::models::slot::{CreateSlot, Slot, SlotListQuery, SlotProjection};
use crate::models::status::{SlotStatus, StatusId};

/// Column list for `slots` queries.
const COLUMNS: &str = "\
    id, service_id, starts_at, ends_at, capacity, status_id, price_cents, \
    external_ref, needs_sync, created_at, updated_at";

/// Maximum page size for slot listing.
const MAX_LIMIT: i64 = 200;

/// Default page size for slot listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides CRUD and sync bookkeeping for bookable slots.
pub struct SlotRepo;

impl SlotRepo {
    /// Publish a new slot. New slots start `available` and dirty for sync.
    pub async fn create(pool: &PgPool, input: &CreateSlot) -> Result<Slot, sqlx::Error> {
        let query = format!(
            "INSERT INTO slots (service_id, starts_at, ends_at, capacity, price_cents) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Slot>(&query)
            .bind(input.service_id)
            .bind(input.starts_at)
            .bind(input.ends_at)
            .bind(input.capacity.unwrap_or(1).max(1))
            .bind(input.price_cents.unwrap_or(0))
            .fetch_one(pool)
            .await
    }

    /// Find a slot by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Slot>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM slots WHERE id = $1");
        sqlx::query_as::<_, Slot>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a slot by the external platform's reference.
    pub async fn find_by_external_ref(
        pool: &PgPool,
        external_ref: &str,
    ) -> Result<Option<Slot>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM slots WHERE external_ref = $1");
        sqlx::query_as::<_, Slot>(&query)
            .bind(external_ref)
            .fetch_optional(pool)
            .await
    }

    /// List slots filtered by service and time range.
    pub async fn list(pool: &PgPool, params: &SlotListQuery) -> Result<Vec<Slot>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0).max(0);

        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx: u32 = 1;

        if params.service_id.is_some() {
            conditions.push(format!("service_id = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.from.is_some() {
            conditions.push(format!("starts_at >= ${bind_idx}"));
            bind_idx += 1;
        }
        if params.until.is_some() {
            conditions.push(format!("starts_at < ${bind_idx}"));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM slots \
             {where_clause} \
             ORDER BY starts_at ASC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, Slot>(&query);
        if let Some(sid) = params.service_id {
            q = q.bind(sid);
        }
        if let Some(from) = params.from {
            q = q.bind(from);
        }
        if let Some(until) = params.until {
            q = q.bind(until);
        }
        q = q.bind(limit).bind(offset);

        q.fetch_all(pool).await
    }

    /// Slots flagged dirty for the next full sync pass.
    pub async fn list_needing_sync(pool: &PgPool, limit: i64) -> Result<Vec<Slot>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM slots WHERE needs_sync ORDER BY updated_at ASC LIMIT $1"
        );
        sqlx::query_as::<_, Slot>(&query).bind(limit).fetch_all(pool).await
    }

    /// Clear the dirty flag once the slot has been propagated.
    pub async fn mark_synced(
        pool: &PgPool,
        id: DbId,
        external_ref: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE slots \
             SET needs_sync = FALSE, \
                 external_ref = COALESCE($2, external_ref), \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(external_ref)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Transition the slot status and flag it dirty for sync.
    pub async fn set_status(
        pool: &PgPool,
        id: DbId,
        status: SlotStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE slots SET status_id = $2, needs_sync = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark slots whose end time has passed as `blocked`.
    ///
    /// Past capacity never returns to the pool; slots are not deleted.
    pub async fn block_past(pool: &PgPool, now: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE slots SET status_id = $2, updated_at = NOW() \
             WHERE ends_at < $1 AND status_id <> $2",
        )
        .bind(now)
        .bind(SlotStatus::Blocked.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Overwrite the slot's projected fields from an external snapshot
    /// (the `external_wins` resolution path). Does not flag for sync.
    pub async fn apply_external_projection(
        pool: &PgPool,
        id: DbId,
        status_id: StatusId,
        projection: &SlotProjection,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE slots \
             SET status_id = $2, starts_at = $3, ends_at = $4, price_cents = $5, \
                 needs_sync = FALSE, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status_id)
        .bind(projection.starts_at)
        .bind(projection.ends_at)
        .bind(projection.price_cents)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
