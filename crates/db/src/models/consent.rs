//! GDPR consent record model.

use serde::Serialize;
use sqlx::FromRow;
use velora_core::types::{DbId, Timestamp};

/// A row from the `consents` table.
///
/// A customer's data may only be transmitted to the external platform
/// while consent is granted and not revoked.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Consent {
    pub id: DbId,
    pub customer_email: String,
    pub granted_at: Timestamp,
    pub revoked_at: Option<Timestamp>,
}
