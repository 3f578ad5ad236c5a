//! Repository for the `holds` table: checkout-time slot claims.
//!
//! All capacity accounting runs inside a single transaction with the slot
//! row locked (`SELECT ... FOR UPDATE`), so two concurrent acquisitions on
//! the same slot are linearized by Postgres and at most one succeeds when
//! only one capacity unit is free.

use std::time::Duration;

use sqlx::{PgPool, Postgres, Transaction};
use velora_core::error::CoreError;
use velora_core::types::DbId;

use super::db_internal;
use crate::models::hold::Hold;
use crate::models::status::{BookingStatus, SlotStatus};

/// Column list for `holds` queries.
const COLUMNS: &str = "id, slot_id, session_id, created_at, expires_at";

/// Provides acquisition, release, extension, and reaping of slot holds.
pub struct HoldRepo;

impl HoldRepo {
    /// Atomically acquire a hold on one unit of a slot's capacity.
    ///
    /// Within one transaction:
    /// 1. lock the slot row,
    /// 2. release any prior hold owned by this session (a session holds at
    ///    most one slot at a time, and switching slots must never leave the
    ///    customer holding two or none),
    /// 3. recompute free capacity as
    ///    `capacity - confirmed bookings - unexpired holds`,
    /// 4. insert the new hold if a unit is free.
    ///
    /// Fails with [`CoreError::SlotUnavailable`] when the slot is at
    /// capacity or blocked.
    pub async fn acquire(
        pool: &PgPool,
        slot_id: DbId,
        session_id: &str,
        ttl: Duration,
    ) -> Result<Hold, CoreError> {
        let mut tx = pool.begin().await.map_err(db_internal)?;

        let slot: Option<(i32, i16)> = sqlx::query_as(
            "SELECT capacity, status_id FROM slots WHERE id = $1 FOR UPDATE",
        )
        .bind(slot_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_internal)?;

        let Some((capacity, status_id)) = slot else {
            return Err(CoreError::NotFound { entity: "Slot", id: slot_id });
        };

        if status_id == SlotStatus::Blocked.id() {
            return Err(CoreError::SlotUnavailable { slot_id });
        }

        sqlx::query("DELETE FROM holds WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(db_internal)?;

        let used = Self::used_capacity(&mut tx, slot_id).await?;
        if used >= i64::from(capacity) {
            // Transaction rolls back on drop; the deleted prior hold for
            // this session is restored along with it.
            return Err(CoreError::SlotUnavailable { slot_id });
        }

        let query = format!(
            "INSERT INTO holds (slot_id, session_id, expires_at) \
             VALUES ($1, $2, NOW() + make_interval(secs => $3)) \
             RETURNING {COLUMNS}"
        );
        let hold = sqlx::query_as::<_, Hold>(&query)
            .bind(slot_id)
            .bind(session_id)
            .bind(ttl.as_secs_f64())
            .fetch_one(&mut *tx)
            .await
            .map_err(db_internal)?;

        sqlx::query("UPDATE slots SET status_id = $2, updated_at = NOW() WHERE id = $1 AND status_id = $3")
            .bind(slot_id)
            .bind(SlotStatus::Held.id())
            .bind(SlotStatus::Available.id())
            .execute(&mut *tx)
            .await
            .map_err(db_internal)?;

        tx.commit().await.map_err(db_internal)?;

        tracing::debug!(hold_id = hold.id, slot_id, session_id, "Hold acquired");
        Ok(hold)
    }

    /// Release a hold. Only the owning session may release it.
    pub async fn release(
        pool: &PgPool,
        hold_id: DbId,
        session_id: &str,
    ) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM holds WHERE id = $1 AND session_id = $2")
            .bind(hold_id)
            .bind(session_id)
            .execute(pool)
            .await
            .map_err(db_internal)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound { entity: "Hold", id: hold_id });
        }
        Ok(())
    }

    /// Reset a hold's expiry to now + TTL (explicit user activity during
    /// checkout). An already-expired hold cannot be extended.
    pub async fn extend(
        pool: &PgPool,
        hold_id: DbId,
        session_id: &str,
        ttl: Duration,
    ) -> Result<Hold, CoreError> {
        let query = format!(
            "UPDATE holds \
             SET expires_at = NOW() + make_interval(secs => $3) \
             WHERE id = $1 AND session_id = $2 AND expires_at > NOW() \
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Hold>(&query)
            .bind(hold_id)
            .bind(session_id)
            .bind(ttl.as_secs_f64())
            .fetch_optional(pool)
            .await
            .map_err(db_internal)?;

        match updated {
            Some(hold) => Ok(hold),
            None => {
                // Distinguish "gone" from "expired" for the caller.
                let exists: Option<(DbId,)> =
                    sqlx::query_as("SELECT id FROM holds WHERE id = $1 AND session_id = $2")
                        .bind(hold_id)
                        .bind(session_id)
                        .fetch_optional(pool)
                        .await
                        .map_err(db_internal)?;
                if exists.is_some() {
                    Err(CoreError::HoldExpired { hold_id })
                } else {
                    Err(CoreError::NotFound { entity: "Hold", id: hold_id })
                }
            }
        }
    }

    /// Delete holds whose expiry has strictly passed.
    ///
    /// This sweep is the only mechanism that returns abandoned capacity to
    /// the pool, and the only code allowed to delete another session's
    /// hold. Safe to race with in-flight acquisitions: an unexpired hold is
    /// never touched.
    pub async fn reap_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM holds WHERE expires_at < NOW()")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Find a hold by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Hold>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM holds WHERE id = $1");
        sqlx::query_as::<_, Hold>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Unexpired holds currently counting against a slot's capacity.
    pub async fn active_count_for_slot(pool: &PgPool, slot_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM holds WHERE slot_id = $1 AND expires_at > NOW()")
            .bind(slot_id)
            .fetch_one(pool)
            .await
    }

    /// Confirmed bookings plus unexpired holds for a slot, computed inside
    /// the caller's transaction (the slot row must already be locked).
    pub(crate) async fn used_capacity(
        tx: &mut Transaction<'_, Postgres>,
        slot_id: DbId,
    ) -> Result<i64, CoreError> {
        let used: i64 = sqlx::query_scalar(
            "SELECT \
                (SELECT COUNT(*) FROM bookings \
                 WHERE slot_id = $1 AND status_id = $2) + \
                (SELECT COUNT(*) FROM holds \
                 WHERE slot_id = $1 AND expires_at > NOW())",
        )
        .bind(slot_id)
        .bind(BookingStatus::Confirmed.id())
        .fetch_one(&mut **tx)
        .await
        .map_err(db_internal)?;
        Ok(used)
    }
}
