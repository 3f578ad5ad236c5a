//! Shared fixtures for sync integration tests: a scripted external
//! calendar and seed helpers.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use velora_booksy::types::{
    AvailabilityPayload, BookingPayload, ExternalBooking, ExternalService, WebhookEvent,
    WebhookEventType,
};
use velora_booksy::{ClientError, ExternalCalendar};
use velora_core::types::Timestamp;
use velora_db::models::booking::{Booking, ConfirmBooking};
use velora_db::models::slot::{CreateSlot, Slot};
use velora_db::repositories::{BookingRepo, ConsentRepo, HoldRepo, SlotRepo};
use velora_sync::{DbConsentService, SyncConfig, SyncEngine};

/// One scripted failure for the next matching call.
pub enum Scripted {
    Transient,
    Auth,
    Missing,
    RateLimited(Option<Duration>),
}

impl Scripted {
    fn to_error(&self) -> ClientError {
        match self {
            Self::Transient => ClientError::Transient("scripted transient failure".to_string()),
            Self::Auth => ClientError::Auth("scripted auth failure".to_string()),
            Self::Missing => ClientError::NotFound("scripted missing entity".to_string()),
            Self::RateLimited(retry_after) => {
                ClientError::RateLimited { retry_after: *retry_after }
            }
        }
    }
}

/// In-memory [`ExternalCalendar`] whose create calls fail according to a
/// script, then succeed. Successful calls are recorded for assertions.
#[derive(Default)]
pub struct ScriptedCalendar {
    pub create_failures: Mutex<VecDeque<Scripted>>,
    pub created: Mutex<Vec<BookingPayload>>,
    pub updated: Mutex<Vec<(String, BookingPayload)>>,
    pub cancelled: Mutex<Vec<String>>,
    pub pushed: Mutex<Vec<AvailabilityPayload>>,
    pub external_bookings: Mutex<Vec<ExternalBooking>>,
    counter: AtomicU64,
}

impl ScriptedCalendar {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_creates(failures: Vec<Scripted>) -> Arc<Self> {
        let calendar = Self::default();
        *calendar.create_failures.lock().unwrap() = failures.into();
        Arc::new(calendar)
    }

    fn next_ref(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl ExternalCalendar for ScriptedCalendar {
    async fn list_services(&self) -> Result<Vec<ExternalService>, ClientError> {
        Ok(Vec::new())
    }

    async fn list_bookings(&self, _since: Timestamp) -> Result<Vec<ExternalBooking>, ClientError> {
        Ok(self.external_bookings.lock().unwrap().clone())
    }

    async fn create_booking(&self, payload: &BookingPayload) -> Result<String, ClientError> {
        if let Some(failure) = self.create_failures.lock().unwrap().pop_front() {
            return Err(failure.to_error());
        }
        self.created.lock().unwrap().push(payload.clone());
        Ok(self.next_ref("ext"))
    }

    async fn update_booking(
        &self,
        external_ref: &str,
        payload: &BookingPayload,
    ) -> Result<(), ClientError> {
        self.updated.lock().unwrap().push((external_ref.to_string(), payload.clone()));
        Ok(())
    }

    async fn cancel_booking(&self, external_ref: &str) -> Result<(), ClientError> {
        self.cancelled.lock().unwrap().push(external_ref.to_string());
        Ok(())
    }

    async fn push_availability(
        &self,
        external_ref: Option<&str>,
        payload: &AvailabilityPayload,
    ) -> Result<String, ClientError> {
        self.pushed.lock().unwrap().push(payload.clone());
        Ok(external_ref.map(str::to_string).unwrap_or_else(|| self.next_ref("svc")))
    }

    async fn get_auth_token(&self) -> Result<String, ClientError> {
        Ok("test-token".to_string())
    }
}

pub fn test_config() -> SyncConfig {
    SyncConfig {
        full_sync_budget: Duration::from_secs(10),
        worker_poll_interval: Duration::from_millis(50),
        ..SyncConfig::default()
    }
}

pub fn engine_with(
    pool: &PgPool,
    calendar: Arc<ScriptedCalendar>,
    config: SyncConfig,
) -> SyncEngine {
    SyncEngine::new(
        pool.clone(),
        calendar,
        Arc::new(DbConsentService::new(pool.clone())),
        config,
    )
}

pub async fn seed_slot(pool: &PgPool, capacity: i32, price_cents: i32) -> Slot {
    let starts_at = Utc::now() + ChronoDuration::hours(24);
    SlotRepo::create(
        pool,
        &CreateSlot {
            service_id: 1,
            starts_at,
            ends_at: starts_at + ChronoDuration::hours(1),
            capacity: Some(capacity),
            price_cents: Some(price_cents),
        },
    )
    .await
    .expect("seed slot")
}

/// Grant consent, hold the slot, and confirm a booking from the hold.
pub async fn seed_booking(pool: &PgPool, slot: &Slot, email: &str) -> Booking {
    ConsentRepo::grant(pool, email).await.expect("grant consent");
    let hold = HoldRepo::acquire(pool, slot.id, "sess-seed", Duration::from_secs(300))
        .await
        .expect("acquire hold");
    BookingRepo::confirm_from_hold(
        pool,
        &ConfirmBooking {
            hold_id: hold.id,
            session_id: "sess-seed".to_string(),
            client_name: "Anna Kowalska".to_string(),
            client_email: email.to_string(),
            client_phone: None,
        },
    )
    .await
    .expect("confirm booking")
}

pub fn booking_event(
    event_type: WebhookEventType,
    external_ref: &str,
    service_ref: Option<&str>,
    slot: &Slot,
    price_cents: i32,
) -> WebhookEvent {
    WebhookEvent {
        event_type,
        booking: ExternalBooking {
            external_ref: external_ref.to_string(),
            service_ref: service_ref.map(str::to_string),
            client_name: "Walk-in Client".to_string(),
            client_email: Some("walkin@example.com".to_string()),
            starts_at: slot.starts_at,
            ends_at: slot.ends_at,
            price_cents,
            status: "confirmed".to_string(),
        },
    }
}
