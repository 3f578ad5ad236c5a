//! Repository for the `health_samples` table.

use std::time::Duration;

use sqlx::PgPool;
use velora_core::types::DbId;

use crate::models::monitoring::{HealthSample, NewHealthSample};

/// Column list for `health_samples` queries.
const COLUMNS: &str = "\
    id, sampled_at, pending_ops, in_progress_ops, failed_ops, dead_letter_ops, \
    oldest_pending_age_secs, error_rate, avg_push_latency_ms, open_conflicts";

/// Provides persistence for point-in-time monitoring samples.
pub struct HealthRepo;

impl HealthRepo {
    /// Persist one sample.
    pub async fn insert(pool: &PgPool, input: &NewHealthSample) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO health_samples \
                 (pending_ops, in_progress_ops, failed_ops, dead_letter_ops, \
                  oldest_pending_age_secs, error_rate, avg_push_latency_ms, open_conflicts) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id",
        )
        .bind(input.pending_ops)
        .bind(input.in_progress_ops)
        .bind(input.failed_ops)
        .bind(input.dead_letter_ops)
        .bind(input.oldest_pending_age_secs)
        .bind(input.error_rate)
        .bind(input.avg_push_latency_ms)
        .bind(input.open_conflicts)
        .fetch_one(pool)
        .await
    }

    /// Most recent sample, if any.
    pub async fn latest(pool: &PgPool) -> Result<Option<HealthSample>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM health_samples ORDER BY sampled_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, HealthSample>(&query).fetch_optional(pool).await
    }

    /// Samples inside the trailing window, newest first.
    pub async fn window(
        pool: &PgPool,
        window: Duration,
    ) -> Result<Vec<HealthSample>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM health_samples \
             WHERE sampled_at > NOW() - make_interval(secs => $1) \
             ORDER BY sampled_at DESC"
        );
        sqlx::query_as::<_, HealthSample>(&query)
            .bind(window.as_secs_f64())
            .fetch_all(pool)
            .await
    }

    /// Purge samples past the retention window.
    pub async fn delete_older_than(
        pool: &PgPool,
        older_than: Duration,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM health_samples \
             WHERE sampled_at < NOW() - make_interval(secs => $1)",
        )
        .bind(older_than.as_secs_f64())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
