//! Repository for the single-row `sync_state` table.

use sqlx::PgPool;
use velora_core::types::Timestamp;

/// Provides the last-successful-full-sync bookkeeping.
pub struct SyncStateRepo;

impl SyncStateRepo {
    /// Timestamp of the last successful full sync, if one has run.
    pub async fn last_full_sync_at(pool: &PgPool) -> Result<Option<Timestamp>, sqlx::Error> {
        sqlx::query_scalar("SELECT last_full_sync_at FROM sync_state WHERE id = 1")
            .fetch_one(pool)
            .await
    }

    /// Record a completed full sync.
    pub async fn set_last_full_sync(pool: &PgPool, at: Timestamp) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sync_state SET last_full_sync_at = $1 WHERE id = 1")
            .bind(at)
            .execute(pool)
            .await?;
        Ok(())
    }
}
