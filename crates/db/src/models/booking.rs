//! Booking entity models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use velora_core::types::{DbId, Timestamp};

use super::status::StatusId;

/// A row from the `bookings` table: a confirmed or pending appointment.
///
/// `external_ref` is set once the booking has been propagated to (or was
/// originated by) the external scheduling platform.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Booking {
    pub id: DbId,
    pub slot_id: DbId,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub price_cents: i32,
    pub status_id: StatusId,
    pub external_ref: Option<String>,
    pub needs_sync: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for confirming a booking from an active hold.
#[derive(Debug, Deserialize)]
pub struct ConfirmBooking {
    pub hold_id: DbId,
    pub session_id: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
}

/// Canonical projection of a booking compared against external snapshots
/// by the conflict detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingProjection {
    pub status: String,
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
    pub price_cents: i32,
}
