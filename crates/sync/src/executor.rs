//! Execution of claimed queue operations against the external calendar.
//!
//! The only blocking I/O in the sync path happens here, and every call is
//! bounded by the caller-side timeout. Outcome recording goes through
//! [`SyncOperationRepo`] so the state machine stays in rows.

use std::future::Future;
use std::time::Duration;

use sqlx::PgPool;
use velora_booksy::types::{AvailabilityPayload, BookingPayload};
use velora_booksy::{ClientError, ExternalCalendar};
use velora_core::backoff::backoff_with_jitter;
use velora_core::entity::{AlertSeverity, EntityKind, OpType};
use velora_core::error::CoreError;
use velora_db::models::status::OperationStatus;
use velora_db::models::sync_operation::SyncOperation;
use velora_db::repositories::{AlertRepo, BookingRepo, SlotRepo, SyncOperationRepo};

use crate::config::SyncConfig;
use crate::db_err;

/// Alert rule raised when external credentials stop working.
pub(crate) const AUTH_ALERT_RULE: &str = "external_auth";

/// Why a push attempt did not succeed.
enum PushError {
    /// The external call failed; retryability follows the client taxonomy.
    Client(ClientError),
    /// The operation can never succeed as written (malformed payload,
    /// missing rows). Dead-letters without retry.
    Permanent(String),
}

impl PushError {
    fn retry_delay(&self, attempts: u32, config: &SyncConfig) -> Option<Duration> {
        match self {
            Self::Client(err) if err.is_retryable() => Some(err.retry_after().unwrap_or_else(
                || backoff_with_jitter(attempts, config.backoff_base, config.backoff_cap),
            )),
            _ => None,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Client(err) => err.to_string(),
            Self::Permanent(msg) => msg.clone(),
        }
    }
}

impl From<ClientError> for PushError {
    fn from(err: ClientError) -> Self {
        Self::Client(err)
    }
}

fn permanent_db(err: sqlx::Error) -> PushError {
    PushError::Permanent(format!("post-push bookkeeping failed: {err}"))
}

/// Bound an external call by the caller-side timeout. A hung call must
/// fail the attempt, never stall the worker.
pub(crate) async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Transient(format!(
            "external call exceeded {}s timeout",
            limit.as_secs()
        ))),
    }
}

/// Execute one claimed operation and record its outcome.
///
/// Returns whether the operation completed. A failed attempt is recorded
/// via [`SyncOperationRepo::fail`], which either schedules a retry or
/// dead-letters with a `sync_failure` conflict; an `Auth` dead-letter
/// additionally raises a critical alert, since no further sync can
/// proceed without credentials.
pub(crate) async fn execute_claimed(
    pool: &PgPool,
    calendar: &dyn ExternalCalendar,
    config: &SyncConfig,
    op: &SyncOperation,
) -> Result<bool, CoreError> {
    match push(pool, calendar, config, op).await {
        Ok(()) => {
            SyncOperationRepo::complete(pool, op.id).await.map_err(db_err)?;
            tracing::debug!(
                op_id = op.id,
                entity_kind = %op.entity_kind,
                entity_id = op.entity_id,
                "Sync operation completed"
            );
            Ok(true)
        }
        Err(err) => {
            let delay = err.retry_delay(op.attempts as u32, config);
            let message = err.message();
            tracing::warn!(
                op_id = op.id,
                entity_kind = %op.entity_kind,
                entity_id = op.entity_id,
                retryable = delay.is_some(),
                error = %message,
                "Sync operation attempt failed"
            );
            let updated = SyncOperationRepo::fail(pool, op.id, &message, delay).await?;
            if updated.status_id == OperationStatus::DeadLetter.id() {
                if let PushError::Client(ClientError::Auth(_)) = err {
                    AlertRepo::raise(pool, AUTH_ALERT_RULE, AlertSeverity::Critical, &message)
                        .await
                        .map_err(db_err)?;
                }
            }
            Ok(false)
        }
    }
}

async fn push(
    pool: &PgPool,
    calendar: &dyn ExternalCalendar,
    config: &SyncConfig,
    op: &SyncOperation,
) -> Result<(), PushError> {
    match op.entity_kind {
        EntityKind::Booking => push_booking(pool, calendar, config, op).await,
        EntityKind::AvailabilitySlot => push_slot(pool, calendar, config, op).await,
    }
}

async fn push_booking(
    pool: &PgPool,
    calendar: &dyn ExternalCalendar,
    config: &SyncConfig,
    op: &SyncOperation,
) -> Result<(), PushError> {
    let payload: BookingPayload = serde_json::from_value(op.payload.clone())
        .map_err(|e| PushError::Permanent(format!("undecodable booking payload: {e}")))?;

    match op.op_type {
        OpType::Create => {
            let external_ref =
                with_timeout(config.call_timeout, calendar.create_booking(&payload)).await?;
            BookingRepo::mark_synced(pool, op.entity_id, Some(&external_ref))
                .await
                .map_err(permanent_db)?;
        }
        OpType::Update => {
            let external_ref = booking_external_ref(pool, op).await?;
            with_timeout(config.call_timeout, calendar.update_booking(&external_ref, &payload))
                .await?;
            BookingRepo::mark_synced(pool, op.entity_id, None).await.map_err(permanent_db)?;
        }
        OpType::Cancel => {
            let external_ref = booking_external_ref(pool, op).await?;
            match with_timeout(config.call_timeout, calendar.cancel_booking(&external_ref)).await {
                // Already gone on the external side counts as cancelled.
                Ok(()) | Err(ClientError::NotFound(_)) => {}
                Err(other) => return Err(other.into()),
            }
            BookingRepo::mark_synced(pool, op.entity_id, None).await.map_err(permanent_db)?;
        }
    }
    Ok(())
}

/// Resolve the external reference for a booking operation at execution
/// time. FIFO-per-entity dispatch guarantees a preceding create has
/// completed, so the row carries the reference even when the operation
/// was enqueued before it existed.
async fn booking_external_ref(pool: &PgPool, op: &SyncOperation) -> Result<String, PushError> {
    let booking = BookingRepo::find_by_id(pool, op.entity_id)
        .await
        .map_err(permanent_db)?
        .ok_or_else(|| PushError::Permanent(format!("booking {} no longer exists", op.entity_id)))?;
    booking
        .external_ref
        .or_else(|| op.external_ref.clone())
        .ok_or_else(|| {
            PushError::Permanent(format!("booking {} has no external reference", op.entity_id))
        })
}

async fn push_slot(
    pool: &PgPool,
    calendar: &dyn ExternalCalendar,
    config: &SyncConfig,
    op: &SyncOperation,
) -> Result<(), PushError> {
    let payload: AvailabilityPayload = serde_json::from_value(op.payload.clone())
        .map_err(|e| PushError::Permanent(format!("undecodable availability payload: {e}")))?;

    let slot = SlotRepo::find_by_id(pool, op.entity_id)
        .await
        .map_err(permanent_db)?
        .ok_or_else(|| PushError::Permanent(format!("slot {} no longer exists", op.entity_id)))?;

    // A cancel pushes the same shape with a blocked status; the payload
    // already carries it.
    let current_ref = slot.external_ref.as_deref().or(op.external_ref.as_deref());
    let external_ref =
        with_timeout(config.call_timeout, calendar.push_availability(current_ref, &payload))
            .await?;
    SlotRepo::mark_synced(pool, op.entity_id, Some(&external_ref)).await.map_err(permanent_db)?;
    Ok(())
}
