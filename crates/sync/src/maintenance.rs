//! Periodic cleanup of completed operations and old health samples.

use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use velora_db::repositories::{HealthRepo, SyncOperationRepo};

use crate::config::SyncConfig;

/// How often the cleanup job runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Run the retention cleanup loop until `cancel` is triggered.
///
/// Completed queue operations and health samples past their retention
/// windows are deleted. Dead-letter operations and conflicts are never
/// touched; they are the audit trail.
pub async fn run(pool: PgPool, config: SyncConfig, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
    tracing::info!(
        completed_retention_secs = config.completed_retention.as_secs(),
        sample_retention_secs = config.sample_retention.as_secs(),
        "Retention cleanup job started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Retention cleanup job stopping");
                break;
            }
            _ = ticker.tick() => {
                match SyncOperationRepo::delete_completed_before(&pool, config.completed_retention).await {
                    Ok(0) => {}
                    Ok(deleted) => tracing::info!(deleted, "Purged completed sync operations"),
                    Err(e) => tracing::error!(error = %e, "Completed-operation cleanup failed"),
                }
                match HealthRepo::delete_older_than(&pool, config.sample_retention).await {
                    Ok(0) => {}
                    Ok(deleted) => tracing::info!(deleted, "Purged old health samples"),
                    Err(e) => tracing::error!(error = %e, "Health sample cleanup failed"),
                }
            }
        }
    }
}
