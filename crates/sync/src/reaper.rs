//! Expired-hold reaper.
//!
//! The only place that deletes holds it does not own. Also blocks slots
//! whose end time has passed, so stale capacity never returns to the pool.

use chrono::Utc;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use velora_db::repositories::{HoldRepo, SlotRepo};

use crate::config::SyncConfig;

/// Run the reaper loop until `cancel` is triggered.
pub async fn run(pool: PgPool, config: SyncConfig, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(config.reap_interval);
    tracing::info!(interval_secs = config.reap_interval.as_secs(), "Hold reaper started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Hold reaper stopping");
                break;
            }
            _ = ticker.tick() => {
                match HoldRepo::reap_expired(&pool).await {
                    Ok(0) => {}
                    Ok(reaped) => tracing::info!(reaped, "Expired holds released"),
                    Err(e) => tracing::error!(error = %e, "Hold reaping failed"),
                }
                if let Err(e) = SlotRepo::block_past(&pool, Utc::now()).await {
                    tracing::error!(error = %e, "Blocking past slots failed");
                }
            }
        }
    }
}
