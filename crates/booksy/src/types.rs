//! Wire types exchanged with the external platform.

use serde::{Deserialize, Serialize};
use velora_core::types::Timestamp;

/// A service offered on the external platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalService {
    pub external_ref: String,
    pub name: String,
    pub duration_minutes: i32,
    pub price_cents: i32,
}

/// The external platform's view of one booking.
///
/// Attached to sync operations and webhook payloads; the conflict
/// detector compares it against the platform's canonical projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalBooking {
    pub external_ref: String,
    pub service_ref: Option<String>,
    pub client_name: String,
    pub client_email: Option<String>,
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
    pub price_cents: i32,
    /// External status string, e.g. `"confirmed"` or `"cancelled"`.
    pub status: String,
}

/// Payload pushed when creating or updating a booking externally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingPayload {
    pub client_name: String,
    pub client_email: Option<String>,
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
    pub price_cents: i32,
    pub status: String,
}

/// Payload pushed when publishing or updating a bookable time slot
/// externally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityPayload {
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
    pub capacity: i32,
    pub price_cents: i32,
    pub status: String,
}

/// Event kinds delivered to `POST /webhooks/booksy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    BookingCreated,
    BookingCancelled,
}

/// A webhook notification from the external platform about a booking it
/// received or cancelled directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_type: WebhookEventType,
    pub booking: ExternalBooking,
}
