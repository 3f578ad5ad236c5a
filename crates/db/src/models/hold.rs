//! Hold entity model.

use serde::Serialize;
use sqlx::FromRow;
use velora_core::types::{DbId, Timestamp};

/// A row from the `holds` table: a short-lived exclusive claim on one unit
/// of a slot's capacity while a customer completes checkout.
///
/// A hold counts against capacity only while `expires_at` is in the
/// future. Expired rows are removed by the reaper sweep.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Hold {
    pub id: DbId,
    pub slot_id: DbId,
    pub session_id: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Hold {
    /// Whether this hold still counts against slot capacity.
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.expires_at > now
    }
}
