//! Repository for the `sync_operations` table: the durable propagation queue.
//!
//! The queue state machine lives entirely in rows, never in call stacks:
//! pending -> in_progress -> completed | failed, with failed returning to
//! pending (backoff) until attempts are exhausted, then dead_letter. A
//! crash leaves operations resumable via [`SyncOperationRepo::requeue_stale_in_progress`].

use std::time::Duration;

use sqlx::PgPool;
use velora_core::dedupe::payload_hash;
use velora_core::entity::{ConflictType, EntityKind};
use velora_core::error::CoreError;
use velora_core::types::DbId;

use super::db_internal;
use crate::models::status::OperationStatus;
use crate::models::sync_operation::{EnqueueOp, QueueCounts, SyncOperation};

/// Column list for `sync_operations` queries.
const COLUMNS: &str = "\
    id, op_type, entity_kind, entity_id, external_ref, payload, payload_hash, \
    priority, status_id, attempts, max_attempts, next_retry_at, last_error, \
    created_at, started_at, completed_at";

/// Provides enqueue, claim, completion, and retry/dead-letter transitions.
pub struct SyncOperationRepo;

impl SyncOperationRepo {
    /// Enqueue a propagation operation, idempotently.
    ///
    /// A pending operation with the same payload hash (entity, op type,
    /// payload) inside `dedupe_window` is returned instead of inserting a
    /// duplicate. A partial unique index on pending hashes backs this up
    /// against concurrent enqueuers.
    pub async fn enqueue(
        pool: &PgPool,
        input: &EnqueueOp,
        dedupe_window: Duration,
    ) -> Result<SyncOperation, sqlx::Error> {
        let hash = payload_hash(input.entity_kind, input.entity_id, input.op_type, &input.payload);

        let existing_query = format!(
            "SELECT {COLUMNS} FROM sync_operations \
             WHERE payload_hash = $1 \
               AND status_id = $2 \
               AND created_at > NOW() - make_interval(secs => $3)"
        );
        if let Some(existing) = sqlx::query_as::<_, SyncOperation>(&existing_query)
            .bind(&hash)
            .bind(OperationStatus::Pending.id())
            .bind(dedupe_window.as_secs_f64())
            .fetch_optional(pool)
            .await?
        {
            tracing::debug!(
                op_id = existing.id,
                entity_kind = %input.entity_kind,
                entity_id = input.entity_id,
                "Enqueue deduplicated against pending operation"
            );
            return Ok(existing);
        }

        let insert_query = format!(
            "INSERT INTO sync_operations \
                 (op_type, entity_kind, entity_id, external_ref, payload, \
                  payload_hash, priority, max_attempts) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (payload_hash) WHERE status_id = 1 DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, SyncOperation>(&insert_query)
            .bind(input.op_type.as_str())
            .bind(input.entity_kind.as_str())
            .bind(input.entity_id)
            .bind(&input.external_ref)
            .bind(&input.payload)
            .bind(&hash)
            .bind(input.priority)
            .bind(input.max_attempts)
            .fetch_optional(pool)
            .await?;

        match inserted {
            Some(op) => Ok(op),
            // Lost the race; the winner's row is what we would have created.
            None => {
                let query = format!(
                    "SELECT {COLUMNS} FROM sync_operations \
                     WHERE payload_hash = $1 AND status_id = $2"
                );
                sqlx::query_as::<_, SyncOperation>(&query)
                    .bind(&hash)
                    .bind(OperationStatus::Pending.id())
                    .fetch_one(pool)
                    .await
            }
        }
    }

    /// Atomically claim the next due operation for a worker.
    ///
    /// `UPDATE ... SELECT FOR UPDATE SKIP LOCKED` so concurrent workers
    /// never process the same row. Ordering is priority DESC, then
    /// created_at ASC. An operation is skipped while its entity has an
    /// unresolved conflict, an operation already in flight, or an older
    /// pending operation (FIFO per entity: an old `create` must not
    /// overtake a newer `cancel`, and vice versa).
    pub async fn claim_next(pool: &PgPool) -> Result<Option<SyncOperation>, sqlx::Error> {
        let query = format!(
            "UPDATE sync_operations \
             SET status_id = $1, started_at = NOW() \
             WHERE id = ( \
                 SELECT o.id FROM sync_operations o \
                 WHERE o.status_id = $2 \
                   AND o.next_retry_at <= NOW() \
                   AND NOT EXISTS ( \
                       SELECT 1 FROM sync_operations b \
                       WHERE b.entity_kind = o.entity_kind \
                         AND b.entity_id = o.entity_id \
                         AND (b.status_id = $1 \
                              OR (b.status_id = $2 AND (b.created_at, b.id) < (o.created_at, o.id)))) \
                   AND NOT EXISTS ( \
                       SELECT 1 FROM conflicts c \
                       WHERE c.entity_kind = o.entity_kind \
                         AND c.entity_id = o.entity_id \
                         AND c.resolution IS NULL) \
                 ORDER BY o.priority DESC, o.created_at ASC, o.id ASC \
                 LIMIT 1 \
                 FOR UPDATE OF o SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SyncOperation>(&query)
            .bind(OperationStatus::InProgress.id())
            .bind(OperationStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// Mark a claimed operation as completed.
    pub async fn complete(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE sync_operations \
             SET status_id = $2, completed_at = NOW(), last_error = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(OperationStatus::Completed.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark every queued operation for an entity as completed without
    /// propagation (the `external_wins` resolution path: the external side
    /// is authoritative, so nothing remains to push).
    pub async fn complete_pending_for_entity(
        pool: &PgPool,
        kind: EntityKind,
        entity_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sync_operations \
             SET status_id = $3, completed_at = NOW() \
             WHERE entity_kind = $1 AND entity_id = $2 AND status_id IN ($4, $5)",
        )
        .bind(kind.as_str())
        .bind(entity_id)
        .bind(OperationStatus::Completed.id())
        .bind(OperationStatus::Pending.id())
        .bind(OperationStatus::Failed.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Record a failed attempt.
    ///
    /// With `retry_delay` set and attempts remaining, the operation goes
    /// back to pending, eligible again once `next_retry_at` passes. With
    /// `retry_delay = None` (non-retryable error class) or attempts
    /// exhausted, it dead-letters and, in the same transaction, opens
    /// exactly one `sync_failure` conflict for the entity.
    ///
    /// Returns the updated row so the caller can see whether it
    /// dead-lettered.
    pub async fn fail(
        pool: &PgPool,
        id: DbId,
        error: &str,
        retry_delay: Option<Duration>,
    ) -> Result<SyncOperation, CoreError> {
        let mut tx = pool.begin().await.map_err(db_internal)?;

        let fetch_query =
            format!("SELECT {COLUMNS} FROM sync_operations WHERE id = $1 FOR UPDATE");
        let op = sqlx::query_as::<_, SyncOperation>(&fetch_query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_internal)?
            .ok_or(CoreError::NotFound { entity: "SyncOperation", id })?;

        let attempts = op.attempts + 1;
        let retryable = retry_delay.is_some() && attempts < op.max_attempts;

        let updated = if retryable {
            let delay = retry_delay.unwrap_or_default();
            let query = format!(
                "UPDATE sync_operations \
                 SET status_id = $2, attempts = $3, last_error = $4, \
                     next_retry_at = NOW() + make_interval(secs => $5) \
                 WHERE id = $1 \
                 RETURNING {COLUMNS}"
            );
            sqlx::query_as::<_, SyncOperation>(&query)
                .bind(id)
                .bind(OperationStatus::Pending.id())
                .bind(attempts)
                .bind(error)
                .bind(delay.as_secs_f64())
                .fetch_one(&mut *tx)
                .await
                .map_err(db_internal)?
        } else {
            let query = format!(
                "UPDATE sync_operations \
                 SET status_id = $2, attempts = $3, last_error = $4, completed_at = NOW() \
                 WHERE id = $1 \
                 RETURNING {COLUMNS}"
            );
            let dead = sqlx::query_as::<_, SyncOperation>(&query)
                .bind(id)
                .bind(OperationStatus::DeadLetter.id())
                .bind(attempts.min(op.max_attempts))
                .bind(error)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_internal)?;

            sqlx::query(
                "INSERT INTO conflicts \
                     (entity_kind, entity_id, external_ref, conflict_type, \
                      local_snapshot, external_snapshot) \
                 VALUES ($1, $2, $3, $4, $5, NULL)",
            )
            .bind(dead.entity_kind.as_str())
            .bind(dead.entity_id)
            .bind(&dead.external_ref)
            .bind(ConflictType::SyncFailure.as_str())
            .bind(&dead.payload)
            .execute(&mut *tx)
            .await
            .map_err(db_internal)?;

            tracing::warn!(
                op_id = id,
                entity_kind = %dead.entity_kind,
                entity_id = dead.entity_id,
                attempts,
                error,
                "Sync operation dead-lettered"
            );
            dead
        };

        tx.commit().await.map_err(db_internal)?;
        Ok(updated)
    }

    /// Return in-progress operations older than `stale_after` to pending.
    ///
    /// Run at startup: rows stuck in_progress belong to workers that died
    /// mid-flight. The attempt was already counted against nothing, so
    /// retrying is safe for idempotent external calls.
    pub async fn requeue_stale_in_progress(
        pool: &PgPool,
        stale_after: Duration,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sync_operations \
             SET status_id = $1, started_at = NULL \
             WHERE status_id = $2 \
               AND started_at < NOW() - make_interval(secs => $3)",
        )
        .bind(OperationStatus::Pending.id())
        .bind(OperationStatus::InProgress.id())
        .bind(stale_after.as_secs_f64())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Find an operation by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<SyncOperation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sync_operations WHERE id = $1");
        sqlx::query_as::<_, SyncOperation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All operations for one entity, oldest first (used by tests and the
    /// conflict resolver).
    pub async fn list_for_entity(
        pool: &PgPool,
        kind: EntityKind,
        entity_id: DbId,
    ) -> Result<Vec<SyncOperation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM sync_operations \
             WHERE entity_kind = $1 AND entity_id = $2 \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, SyncOperation>(&query)
            .bind(kind.as_str())
            .bind(entity_id)
            .fetch_all(pool)
            .await
    }

    /// Queue depth broken down by status.
    pub async fn counts_by_status(pool: &PgPool) -> Result<QueueCounts, sqlx::Error> {
        let row: (i64, i64, i64, i64, i64) = sqlx::query_as(
            "SELECT \
                COUNT(*) FILTER (WHERE status_id = 1), \
                COUNT(*) FILTER (WHERE status_id = 2), \
                COUNT(*) FILTER (WHERE status_id = 3), \
                COUNT(*) FILTER (WHERE status_id = 4), \
                COUNT(*) FILTER (WHERE status_id = 5) \
             FROM sync_operations",
        )
        .fetch_one(pool)
        .await?;

        Ok(QueueCounts {
            pending: row.0,
            in_progress: row.1,
            completed: row.2,
            failed: row.3,
            dead_letter: row.4,
        })
    }

    /// Age in seconds of the oldest pending operation, or 0 when the
    /// queue is empty.
    pub async fn oldest_pending_age_secs(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let age: Option<f64> = sqlx::query_scalar(
            "SELECT EXTRACT(EPOCH FROM NOW() - MIN(created_at))::float8 \
             FROM sync_operations WHERE status_id = $1",
        )
        .bind(OperationStatus::Pending.id())
        .fetch_one(pool)
        .await?;
        Ok(age.unwrap_or(0.0).max(0.0) as i64)
    }

    /// Trailing-window outcome stats for the monitor loop.
    ///
    /// Error rate counts dead-letters and operations currently backing off
    /// from a recent failure against completions in the same window.
    pub async fn window_stats(
        pool: &PgPool,
        window: Duration,
    ) -> Result<(i64, i64, Option<f64>), sqlx::Error> {
        let row: (i64, i64, Option<f64>) = sqlx::query_as(
            "SELECT \
                COUNT(*) FILTER (WHERE status_id = 3 \
                    AND completed_at > NOW() - make_interval(secs => $1)), \
                COUNT(*) FILTER (WHERE \
                    (status_id = 5 AND completed_at > NOW() - make_interval(secs => $1)) \
                    OR (status_id IN (1, 4) AND attempts > 0 \
                        AND next_retry_at > NOW() - make_interval(secs => $1))), \
                (AVG(EXTRACT(EPOCH FROM completed_at - started_at)) \
                    FILTER (WHERE status_id = 3 \
                        AND completed_at > NOW() - make_interval(secs => $1)))::float8 * 1000.0 \
             FROM sync_operations",
        )
        .bind(window.as_secs_f64())
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    /// Archive completed operations past the retention window.
    pub async fn delete_completed_before(
        pool: &PgPool,
        older_than: Duration,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM sync_operations \
             WHERE status_id = $1 \
               AND completed_at < NOW() - make_interval(secs => $2)",
        )
        .bind(OperationStatus::Completed.id())
        .bind(older_than.as_secs_f64())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
