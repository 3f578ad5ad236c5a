//! Full and incremental sync passes, plus the webhook application path.
//!
//! The engine never talks to the external platform directly except to
//! verify credentials and to pull recent external bookings; all pushes go
//! through the durable operation queue so a crash mid-pass loses nothing.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use velora_booksy::types::{AvailabilityPayload, BookingPayload, WebhookEvent, WebhookEventType};
use velora_booksy::{ClientError, ConsentService, ExternalCalendar};
use velora_core::entity::{
    AlertSeverity, ConflictType, EntityKind, OpType, PRIORITY_AVAILABILITY, PRIORITY_BOOKING,
    PRIORITY_CANCELLATION,
};
use velora_core::error::CoreError;
use velora_core::types::{DbId, Timestamp};
use velora_db::models::booking::Booking;
use velora_db::models::conflict::{Conflict, NewConflict};
use velora_db::models::slot::{Slot, SlotProjection};
use velora_db::models::status::{BookingStatus, SlotStatus, StatusId};
use velora_db::models::sync_operation::{EnqueueOp, SyncOperation};
use velora_db::repositories::{
    AlertRepo, BookingRepo, ConflictRepo, SlotRepo, SyncOperationRepo, SyncStateRepo,
};

use crate::config::SyncConfig;
use crate::{conflict, db_err, executor, json_err};

/// How far back the first-ever pull reaches when no full sync has run yet.
const INITIAL_PULL_DAYS: i64 = 30;

/// Outcome summary of one full sync pass.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SyncReport {
    /// Operations completed during the drain phase.
    pub processed: u64,
    /// Operations that failed an attempt during the drain phase.
    pub failed: u64,
    /// Conflicts newly opened during the pass.
    pub conflicts: i64,
    pub duration_ms: u64,
}

/// What applying one external webhook event did locally.
#[derive(Debug)]
pub enum WebhookOutcome {
    /// A local confirmed booking was created for the external appointment.
    Created(Booking),
    /// The local booking was cancelled to match the external side.
    Cancelled(Booking),
    /// Local state already claimed the capacity; a conflict was recorded
    /// instead of overwriting it.
    ConflictRecorded(Conflict),
    /// Nothing to do (already applied, or no local counterpart).
    Ignored,
}

/// Orchestrates propagation between the platform and the external calendar.
pub struct SyncEngine {
    pool: PgPool,
    calendar: Arc<dyn ExternalCalendar>,
    consent: Arc<dyn ConsentService>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(
        pool: PgPool,
        calendar: Arc<dyn ExternalCalendar>,
        consent: Arc<dyn ConsentService>,
        config: SyncConfig,
    ) -> Self {
        Self { pool, calendar, consent, config }
    }

    /// One full reconciliation pass.
    ///
    /// Enqueues every dirty slot and booking, pulls recent external
    /// bookings for mismatch detection, then drains the queue until it is
    /// empty, the wall-clock budget runs out, or `cancel` fires. Undrained
    /// operations stay pending for the worker pool; they are not failures.
    pub async fn run_full_sync(&self, cancel: &CancellationToken) -> Result<SyncReport, CoreError> {
        let started = Instant::now();
        let deadline = started + self.config.full_sync_budget;
        let conflicts_before = ConflictRepo::count_open(&self.pool).await.map_err(db_err)?;

        // Nothing can propagate without working credentials; check first.
        if let Err(err) =
            executor::with_timeout(self.config.call_timeout, self.calendar.get_auth_token()).await
        {
            if matches!(err, ClientError::Auth(_)) {
                AlertRepo::raise(
                    &self.pool,
                    executor::AUTH_ALERT_RULE,
                    AlertSeverity::Critical,
                    &err.to_string(),
                )
                .await
                .map_err(db_err)?;
            }
            return Err(CoreError::Internal(format!("external auth check failed: {err}")));
        }

        self.enqueue_dirty().await?;

        let since = SyncStateRepo::last_full_sync_at(&self.pool)
            .await
            .map_err(db_err)?
            .unwrap_or_else(|| Utc::now() - chrono::Duration::days(INITIAL_PULL_DAYS));
        self.pull_external(since).await?;

        let (processed, failed) = self.drain(deadline, cancel).await?;

        SyncStateRepo::set_last_full_sync(&self.pool, Utc::now()).await.map_err(db_err)?;
        let conflicts_after = ConflictRepo::count_open(&self.pool).await.map_err(db_err)?;

        let report = SyncReport {
            processed,
            failed,
            conflicts: (conflicts_after - conflicts_before).max(0),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            processed = report.processed,
            failed = report.failed,
            conflicts = report.conflicts,
            duration_ms = report.duration_ms,
            "Full sync pass finished"
        );
        Ok(report)
    }

    /// Enqueue propagation for a single entity.
    ///
    /// Returns `None` when nothing was queued (consent absent, or a
    /// cancellation that never reached the external side).
    pub async fn run_incremental_sync(
        &self,
        kind: EntityKind,
        id: DbId,
    ) -> Result<Option<SyncOperation>, CoreError> {
        match kind {
            EntityKind::AvailabilitySlot => {
                let slot = SlotRepo::find_by_id(&self.pool, id)
                    .await
                    .map_err(db_err)?
                    .ok_or(CoreError::NotFound { entity: "Slot", id })?;
                Ok(Some(self.enqueue_slot(&slot).await?))
            }
            EntityKind::Booking => {
                let booking = BookingRepo::find_by_id(&self.pool, id)
                    .await
                    .map_err(db_err)?
                    .ok_or(CoreError::NotFound { entity: "Booking", id })?;
                self.enqueue_booking(&booking).await
            }
        }
    }

    /// Apply an external webhook event to local state.
    ///
    /// Free capacity on the matched slot turns into a local confirmed
    /// booking carrying the external reference. Capacity already claimed
    /// by a local hold or booking is never overwritten; an
    /// `availability_mismatch` conflict is recorded for manual resolution.
    pub async fn apply_external_booking(
        &self,
        event: &WebhookEvent,
    ) -> Result<WebhookOutcome, CoreError> {
        match event.event_type {
            WebhookEventType::BookingCancelled => self.apply_external_cancellation(event).await,
            WebhookEventType::BookingCreated => self.apply_external_creation(event).await,
        }
    }

    async fn apply_external_cancellation(
        &self,
        event: &WebhookEvent,
    ) -> Result<WebhookOutcome, CoreError> {
        let external_ref = &event.booking.external_ref;
        let Some(local) = BookingRepo::find_by_external_ref(&self.pool, external_ref)
            .await
            .map_err(db_err)?
        else {
            tracing::debug!(external_ref, "Cancellation for unknown external booking ignored");
            return Ok(WebhookOutcome::Ignored);
        };
        if local.status_id == BookingStatus::Cancelled.id() {
            return Ok(WebhookOutcome::Ignored);
        }

        let cancelled = BookingRepo::cancel(&self.pool, local.id).await?;
        // The change came from the external side; there is nothing to push
        // back, so clear the dirty flag the cancel set.
        BookingRepo::mark_synced(&self.pool, cancelled.id, None).await.map_err(db_err)?;

        tracing::info!(
            booking_id = cancelled.id,
            external_ref,
            "Local booking cancelled from external event"
        );
        Ok(WebhookOutcome::Cancelled(cancelled))
    }

    async fn apply_external_creation(
        &self,
        event: &WebhookEvent,
    ) -> Result<WebhookOutcome, CoreError> {
        let ext = &event.booking;
        if BookingRepo::find_by_external_ref(&self.pool, &ext.external_ref)
            .await
            .map_err(db_err)?
            .is_some()
        {
            tracing::debug!(external_ref = %ext.external_ref, "External booking already applied");
            return Ok(WebhookOutcome::Ignored);
        }

        let slot = match ext.service_ref.as_deref() {
            Some(service_ref) => SlotRepo::find_by_external_ref(&self.pool, service_ref)
                .await
                .map_err(db_err)?,
            None => None,
        };
        let Some(slot) = slot else {
            tracing::warn!(
                external_ref = %ext.external_ref,
                service_ref = ?ext.service_ref,
                "External booking matches no local slot"
            );
            return Ok(WebhookOutcome::Ignored);
        };

        match BookingRepo::create_confirmed_external(
            &self.pool,
            slot.id,
            &ext.external_ref,
            &ext.client_name,
            ext.client_email.as_deref().unwrap_or_default(),
            ext.price_cents,
        )
        .await
        {
            Ok(booking) => Ok(WebhookOutcome::Created(booking)),
            Err(CoreError::SlotUnavailable { slot_id }) => {
                let local_snapshot = serde_json::to_value(SlotProjection {
                    status: slot_status_str(slot.status_id).to_string(),
                    starts_at: slot.starts_at,
                    ends_at: slot.ends_at,
                    price_cents: slot.price_cents,
                })
                .map_err(json_err)?;
                let conflict = ConflictRepo::create(
                    &self.pool,
                    &NewConflict {
                        entity_kind: EntityKind::AvailabilitySlot,
                        entity_id: slot_id,
                        external_ref: Some(ext.external_ref.clone()),
                        conflict_type: ConflictType::AvailabilityMismatch,
                        local_snapshot: Some(local_snapshot),
                        external_snapshot: serde_json::to_value(ext).ok(),
                    },
                )
                .await
                .map_err(db_err)?;
                Ok(WebhookOutcome::ConflictRecorded(conflict))
            }
            Err(other) => Err(other),
        }
    }

    /// Queue an update (or first create) for a slot.
    pub async fn enqueue_slot(&self, slot: &Slot) -> Result<SyncOperation, CoreError> {
        let op_type = if slot.external_ref.is_some() { OpType::Update } else { OpType::Create };
        let payload = serde_json::to_value(slot_payload(slot)).map_err(json_err)?;
        SyncOperationRepo::enqueue(
            &self.pool,
            &EnqueueOp {
                op_type,
                entity_kind: EntityKind::AvailabilitySlot,
                entity_id: slot.id,
                external_ref: slot.external_ref.clone(),
                payload,
                priority: PRIORITY_AVAILABILITY,
                max_attempts: self.config.max_attempts,
            },
            self.config.dedupe_window,
        )
        .await
        .map_err(db_err)
    }

    /// Queue propagation for a booking, consent-gated.
    pub async fn enqueue_booking(
        &self,
        booking: &Booking,
    ) -> Result<Option<SyncOperation>, CoreError> {
        let cancelled = booking.status_id == BookingStatus::Cancelled.id();
        if cancelled && booking.external_ref.is_none() {
            // Never propagated; there is nothing external to cancel.
            BookingRepo::mark_synced(&self.pool, booking.id, None).await.map_err(db_err)?;
            return Ok(None);
        }

        if !self.consent.has_valid_consent(&booking.client_email).await {
            tracing::info!(
                booking_id = booking.id,
                "Skipping sync enqueue: no data-transfer consent"
            );
            return Ok(None);
        }

        let (op_type, priority) = if cancelled {
            (OpType::Cancel, PRIORITY_CANCELLATION)
        } else if booking.external_ref.is_some() {
            (OpType::Update, PRIORITY_BOOKING)
        } else {
            (OpType::Create, PRIORITY_BOOKING)
        };
        let payload =
            serde_json::to_value(booking_payload(&self.pool, booking).await?).map_err(json_err)?;
        let op = SyncOperationRepo::enqueue(
            &self.pool,
            &EnqueueOp {
                op_type,
                entity_kind: EntityKind::Booking,
                entity_id: booking.id,
                external_ref: booking.external_ref.clone(),
                payload,
                priority,
                max_attempts: self.config.max_attempts,
            },
            self.config.dedupe_window,
        )
        .await
        .map_err(db_err)?;
        Ok(Some(op))
    }

    async fn enqueue_dirty(&self) -> Result<(), CoreError> {
        let slots =
            SlotRepo::list_needing_sync(&self.pool, self.config.full_sync_batch).await.map_err(db_err)?;
        for slot in &slots {
            self.enqueue_slot(slot).await?;
        }

        let bookings = BookingRepo::list_needing_sync(&self.pool, self.config.full_sync_batch)
            .await
            .map_err(db_err)?;
        for booking in &bookings {
            self.enqueue_booking(booking).await?;
        }
        Ok(())
    }

    /// Pull bookings the external side changed since the last pass and
    /// record mismatch conflicts. Pull failures degrade the pass, they do
    /// not abort the push side.
    async fn pull_external(&self, since: Timestamp) -> Result<(), CoreError> {
        let external = match executor::with_timeout(
            self.config.call_timeout,
            self.calendar.list_bookings(since),
        )
        .await
        {
            Ok(list) => list,
            Err(err) => {
                tracing::warn!(error = %err, "External pull failed; push-side sync continues");
                return Ok(());
            }
        };

        for ext in &external {
            let Some(local) = BookingRepo::find_by_external_ref(&self.pool, &ext.external_ref)
                .await
                .map_err(db_err)?
            else {
                // Creation of new external bookings is the webhook's job.
                continue;
            };
            conflict::record_booking_mismatch(
                &self.pool,
                &local,
                ext,
                self.config.price_tolerance_cents,
            )
            .await?;
        }
        Ok(())
    }

    async fn drain(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<(u64, u64), CoreError> {
        let mut processed = 0u64;
        let mut failed = 0u64;
        loop {
            if cancel.is_cancelled() || Instant::now() >= deadline {
                // Whatever remains pending belongs to the worker pool.
                break;
            }
            let Some(op) = SyncOperationRepo::claim_next(&self.pool).await.map_err(db_err)? else {
                break;
            };
            if executor::execute_claimed(&self.pool, self.calendar.as_ref(), &self.config, &op)
                .await?
            {
                processed += 1;
            } else {
                failed += 1;
            }
        }
        Ok((processed, failed))
    }
}

// ---------------------------------------------------------------------------
// Payload and status-text helpers
// ---------------------------------------------------------------------------

pub(crate) fn booking_status_str(status_id: StatusId) -> &'static str {
    match status_id {
        x if x == BookingStatus::Pending.id() => "pending",
        x if x == BookingStatus::Confirmed.id() => "confirmed",
        x if x == BookingStatus::Cancelled.id() => "cancelled",
        _ => "unknown",
    }
}

pub(crate) fn slot_status_str(status_id: StatusId) -> &'static str {
    match status_id {
        x if x == SlotStatus::Available.id() => "available",
        x if x == SlotStatus::Held.id() => "held",
        x if x == SlotStatus::Booked.id() => "booked",
        x if x == SlotStatus::Blocked.id() => "blocked",
        _ => "unknown",
    }
}

/// Wire payload for a booking, with times taken from its slot.
pub(crate) async fn booking_payload(
    pool: &PgPool,
    booking: &Booking,
) -> Result<BookingPayload, CoreError> {
    let slot = SlotRepo::find_by_id(pool, booking.slot_id)
        .await
        .map_err(db_err)?
        .ok_or(CoreError::NotFound { entity: "Slot", id: booking.slot_id })?;
    Ok(BookingPayload {
        client_name: booking.client_name.clone(),
        client_email: Some(booking.client_email.clone()),
        starts_at: slot.starts_at,
        ends_at: slot.ends_at,
        price_cents: booking.price_cents,
        status: booking_status_str(booking.status_id).to_string(),
    })
}

/// Wire payload for a slot's availability.
pub(crate) fn slot_payload(slot: &Slot) -> AvailabilityPayload {
    AvailabilityPayload {
        starts_at: slot.starts_at,
        ends_at: slot.ends_at,
        capacity: slot.capacity,
        price_cents: slot.price_cents,
        status: slot_status_str(slot.status_id).to_string(),
    }
}
