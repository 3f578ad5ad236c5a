//! Queue worker pool: N concurrent consumers over the operation queue.
//!
//! Claims are disjoint by construction (`FOR UPDATE SKIP LOCKED` inside
//! [`SyncOperationRepo::claim_next`]); each worker drains until the queue
//! has nothing due, then idles on its poll interval.

use std::sync::Arc;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use velora_booksy::ExternalCalendar;
use velora_core::error::CoreError;
use velora_db::repositories::SyncOperationRepo;

use crate::config::SyncConfig;
use crate::{db_err, executor};

/// Pool of queue consumers sharing one database pool and calendar client.
pub struct WorkerPool {
    pool: PgPool,
    calendar: Arc<dyn ExternalCalendar>,
    config: SyncConfig,
}

impl WorkerPool {
    pub fn new(pool: PgPool, calendar: Arc<dyn ExternalCalendar>, config: SyncConfig) -> Self {
        Self { pool, calendar, config }
    }

    /// Run all workers until the cancellation token fires.
    ///
    /// Before starting, rows stuck in_progress from a previous crash are
    /// returned to pending so the queue is resumable.
    pub async fn run(&self, cancel: CancellationToken) {
        match SyncOperationRepo::requeue_stale_in_progress(&self.pool, self.config.stale_requeue_after)
            .await
        {
            Ok(0) => {}
            Ok(requeued) => {
                tracing::warn!(requeued, "Returned stale in-progress operations to the queue")
            }
            Err(e) => tracing::error!(error = %e, "Stale operation requeue failed"),
        }

        tracing::info!(workers = self.config.worker_count, "Sync worker pool started");
        let loops =
            (0..self.config.worker_count).map(|id| self.worker_loop(id, cancel.clone()));
        futures::future::join_all(loops).await;
        tracing::info!("Sync worker pool stopped");
    }

    async fn worker_loop(&self, worker_id: usize, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.worker_poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(worker_id, "Sync worker shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.drain_available(worker_id, &cancel).await {
                        tracing::error!(worker_id, error = %e, "Worker cycle failed");
                    }
                }
            }
        }
    }

    /// Claim and execute operations until nothing is due.
    async fn drain_available(
        &self,
        worker_id: usize,
        cancel: &CancellationToken,
    ) -> Result<(), CoreError> {
        while !cancel.is_cancelled() {
            let Some(op) = SyncOperationRepo::claim_next(&self.pool).await.map_err(db_err)? else {
                break;
            };
            tracing::debug!(
                worker_id,
                op_id = op.id,
                entity_kind = %op.entity_kind,
                entity_id = op.entity_id,
                attempt = op.attempts + 1,
                "Operation claimed"
            );
            executor::execute_claimed(&self.pool, self.calendar.as_ref(), &self.config, &op)
                .await?;
        }
        Ok(())
    }
}
