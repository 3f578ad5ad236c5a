//! Domain-level error type shared across crates.

use crate::types::DbId;

/// Errors produced by domain logic and the repository layer.
///
/// HTTP mapping happens in the API crate's `AppError`; nothing here knows
/// about status codes.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An entity lookup by id found nothing.
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// Input failed a domain validation rule.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The slot has no free capacity left (confirmed bookings plus
    /// unexpired holds already equal capacity). Returned synchronously to
    /// the booking flow and never retried automatically.
    #[error("Slot {slot_id} has no free capacity")]
    SlotUnavailable { slot_id: DbId },

    /// The hold's expiry has passed; it can no longer be extended or
    /// converted into a booking.
    #[error("Hold {hold_id} has expired")]
    HoldExpired { hold_id: DbId },

    /// An unresolved conflict blocks automatic sync of this entity.
    #[error("Entity is blocked by unresolved conflict {conflict_id}")]
    ConflictOpen { conflict_id: DbId },

    /// Anything unexpected. The message is logged, not shown to end users.
    #[error("Internal error: {0}")]
    Internal(String),
}
