//! Repository for the `bookings` table.
//!
//! Bookings enter through two doors: the checkout flow converts an active
//! hold into a confirmed booking, and the external webhook path creates a
//! confirmed booking for an appointment made directly on the external
//! platform. Both run inside a transaction with the slot row locked so
//! capacity accounting stays exact.

use sqlx::PgPool;
use velora_core::error::CoreError;
use velora_core::types::DbId;

use super::db_internal;
use crate::models::booking::{Booking, ConfirmBooking};
use crate::models::status::{BookingStatus, SlotStatus, StatusId};

/// Column list for `bookings` queries.
const COLUMNS: &str = "\
    id, slot_id, client_name, client_email, client_phone, price_cents, \
    status_id, external_ref, needs_sync, created_at, updated_at";

/// Provides booking creation, cancellation, and sync bookkeeping.
pub struct BookingRepo;

impl BookingRepo {
    /// Convert an active hold into a confirmed booking.
    ///
    /// The hold must belong to `session_id` and must not have expired; the
    /// conversion and the hold deletion happen in one transaction, so the
    /// capacity unit passes directly from hold to booking with no window
    /// where another customer could claim it.
    pub async fn confirm_from_hold(
        pool: &PgPool,
        input: &ConfirmBooking,
    ) -> Result<Booking, CoreError> {
        let mut tx = pool.begin().await.map_err(db_internal)?;

        let hold: Option<(DbId, bool)> = sqlx::query_as(
            "SELECT slot_id, expires_at > NOW() FROM holds \
             WHERE id = $1 AND session_id = $2 \
             FOR UPDATE",
        )
        .bind(input.hold_id)
        .bind(&input.session_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_internal)?;

        let Some((slot_id, unexpired)) = hold else {
            return Err(CoreError::NotFound { entity: "Hold", id: input.hold_id });
        };
        if !unexpired {
            // The reaper may not have swept it yet, but it no longer
            // guarantees capacity.
            return Err(CoreError::HoldExpired { hold_id: input.hold_id });
        }

        let price_cents: i32 =
            sqlx::query_scalar("SELECT price_cents FROM slots WHERE id = $1 FOR UPDATE")
                .bind(slot_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_internal)?;

        sqlx::query("DELETE FROM holds WHERE id = $1")
            .bind(input.hold_id)
            .execute(&mut *tx)
            .await
            .map_err(db_internal)?;

        let query = format!(
            "INSERT INTO bookings \
                 (slot_id, client_name, client_email, client_phone, price_cents, status_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        let booking = sqlx::query_as::<_, Booking>(&query)
            .bind(slot_id)
            .bind(&input.client_name)
            .bind(&input.client_email)
            .bind(&input.client_phone)
            .bind(price_cents)
            .bind(BookingStatus::Confirmed.id())
            .fetch_one(&mut *tx)
            .await
            .map_err(db_internal)?;

        sqlx::query("UPDATE slots SET status_id = $2, needs_sync = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(slot_id)
            .bind(SlotStatus::Booked.id())
            .execute(&mut *tx)
            .await
            .map_err(db_internal)?;

        tx.commit().await.map_err(db_internal)?;

        tracing::info!(booking_id = booking.id, slot_id, "Booking confirmed from hold");
        Ok(booking)
    }

    /// Create a confirmed booking for an appointment that originated on
    /// the external platform (webhook path).
    ///
    /// Fails with [`CoreError::SlotUnavailable`] when a local hold or
    /// booking already claims the capacity unit; the caller records an
    /// `availability_mismatch` conflict instead of overwriting local state.
    pub async fn create_confirmed_external(
        pool: &PgPool,
        slot_id: DbId,
        external_ref: &str,
        client_name: &str,
        client_email: &str,
        price_cents: i32,
    ) -> Result<Booking, CoreError> {
        let mut tx = pool.begin().await.map_err(db_internal)?;

        let capacity: Option<i32> =
            sqlx::query_scalar("SELECT capacity FROM slots WHERE id = $1 FOR UPDATE")
                .bind(slot_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_internal)?;

        let Some(capacity) = capacity else {
            return Err(CoreError::NotFound { entity: "Slot", id: slot_id });
        };

        let used = super::HoldRepo::used_capacity(&mut tx, slot_id).await?;
        if used >= i64::from(capacity) {
            return Err(CoreError::SlotUnavailable { slot_id });
        }

        let query = format!(
            "INSERT INTO bookings \
                 (slot_id, client_name, client_email, price_cents, status_id, \
                  external_ref, needs_sync) \
             VALUES ($1, $2, $3, $4, $5, $6, FALSE) \
             RETURNING {COLUMNS}"
        );
        let booking = sqlx::query_as::<_, Booking>(&query)
            .bind(slot_id)
            .bind(client_name)
            .bind(client_email)
            .bind(price_cents)
            .bind(BookingStatus::Confirmed.id())
            .bind(external_ref)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_internal)?;

        sqlx::query("UPDATE slots SET status_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(slot_id)
            .bind(SlotStatus::Booked.id())
            .execute(&mut *tx)
            .await
            .map_err(db_internal)?;

        tx.commit().await.map_err(db_internal)?;

        tracing::info!(
            booking_id = booking.id,
            slot_id,
            external_ref,
            "Booking created from external platform"
        );
        Ok(booking)
    }

    /// Cancel a booking and return its slot to the pool if no other
    /// confirmed booking remains.
    pub async fn cancel(pool: &PgPool, id: DbId) -> Result<Booking, CoreError> {
        let mut tx = pool.begin().await.map_err(db_internal)?;

        let query = format!(
            "UPDATE bookings \
             SET status_id = $2, needs_sync = TRUE, updated_at = NOW() \
             WHERE id = $1 AND status_id <> $2 \
             RETURNING {COLUMNS}"
        );
        let booking = sqlx::query_as::<_, Booking>(&query)
            .bind(id)
            .bind(BookingStatus::Cancelled.id())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_internal)?
            .ok_or(CoreError::NotFound { entity: "Booking", id })?;

        // Reopen the slot when the last confirmed booking is gone.
        sqlx::query(
            "UPDATE slots SET status_id = $2, needs_sync = TRUE, updated_at = NOW() \
             WHERE id = $1 \
               AND status_id = $3 \
               AND NOT EXISTS (\
                   SELECT 1 FROM bookings \
                   WHERE slot_id = $1 AND status_id = $4)",
        )
        .bind(booking.slot_id)
        .bind(SlotStatus::Available.id())
        .bind(SlotStatus::Booked.id())
        .bind(BookingStatus::Confirmed.id())
        .execute(&mut *tx)
        .await
        .map_err(db_internal)?;

        tx.commit().await.map_err(db_internal)?;

        tracing::info!(booking_id = id, slot_id = booking.slot_id, "Booking cancelled");
        Ok(booking)
    }

    /// Find a booking by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Booking>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM bookings WHERE id = $1");
        sqlx::query_as::<_, Booking>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a booking by the external platform's reference.
    pub async fn find_by_external_ref(
        pool: &PgPool,
        external_ref: &str,
    ) -> Result<Option<Booking>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM bookings WHERE external_ref = $1");
        sqlx::query_as::<_, Booking>(&query)
            .bind(external_ref)
            .fetch_optional(pool)
            .await
    }

    /// Confirmed bookings for a slot (capacity accounting outside a
    /// transaction; informational only).
    pub async fn confirmed_count_for_slot(
        pool: &PgPool,
        slot_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE slot_id = $1 AND status_id = $2")
            .bind(slot_id)
            .bind(BookingStatus::Confirmed.id())
            .fetch_one(pool)
            .await
    }

    /// Bookings flagged dirty for the next full sync pass.
    pub async fn list_needing_sync(pool: &PgPool, limit: i64) -> Result<Vec<Booking>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM bookings WHERE needs_sync ORDER BY updated_at ASC LIMIT $1"
        );
        sqlx::query_as::<_, Booking>(&query).bind(limit).fetch_all(pool).await
    }

    /// Clear the dirty flag and record the external reference assigned by
    /// the platform, if any.
    pub async fn mark_synced(
        pool: &PgPool,
        id: DbId,
        external_ref: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE bookings \
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

    /// Overwrite the booking's projected fields from an external snapshot
    /// (the `external_wins` resolution path). Does not flag for sync.
    pub async fn apply_external_projection(
        pool: &PgPool,
        id: DbId,
        status_id: StatusId,
        price_cents: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE bookings \
             SET status_id = $2, price_cents = $3, needs_sync = FALSE, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status_id)
        .bind(price_cents)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
