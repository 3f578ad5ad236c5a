//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Plain CRUD returns
//! `sqlx::Error`; methods that enforce domain invariants inside a
//! transaction (hold acquisition, queue claim, dead-lettering) return
//! `CoreError`.

pub mod alert_repo;
pub mod booking_repo;
pub mod conflict_repo;
pub mod consent_repo;
pub mod health_repo;
pub mod hold_repo;
pub mod slot_repo;
pub mod sync_operation_repo;
pub mod sync_state_repo;

pub use alert_repo::AlertRepo;
pub use booking_repo::BookingRepo;
pub use conflict_repo::ConflictRepo;
pub use consent_repo::ConsentRepo;
pub use health_repo::HealthRepo;
pub use hold_repo::HoldRepo;
pub use slot_repo::SlotRepo;
pub use sync_operation_repo::SyncOperationRepo;
pub use sync_state_repo::SyncStateRepo;

use velora_core::error::CoreError;

/// Map an unexpected sqlx failure into the domain error type.
///
/// Used by transactional repository methods whose signature is `CoreError`;
/// expected conditions (not found, capacity, expiry) are mapped explicitly
/// before this catch-all.
pub(crate) fn db_internal(err: sqlx::Error) -> CoreError {
    CoreError::Internal(format!("database error: {err}"))
}
