//! Repository for the `alerts` table.
//!
//! At most one active alert exists per rule (partial unique index);
//! re-raising an already-active rule escalates its severity instead of
//! stacking duplicates.

use sqlx::PgPool;
use velora_core::entity::AlertSeverity;
use velora_core::error::CoreError;
use velora_core::types::DbId;

use super::db_internal;
use crate::models::monitoring::Alert;
use crate::models::status::AlertStatus;

/// Column list for `alerts` queries.
const COLUMNS: &str = "\
    id, rule, severity, status_id, message, created_at, \
    acknowledged_by, acknowledged_at, resolved_at";

/// Provides alert raising, escalation, acknowledgement, and clearing.
pub struct AlertRepo;

impl AlertRepo {
    /// Raise an alert for a rule, or escalate the existing active one.
    ///
    /// Severity only ever moves upward here; a `warning` raise against an
    /// active `critical` alert leaves it critical.
    pub async fn raise(
        pool: &PgPool,
        rule: &str,
        severity: AlertSeverity,
        message: &str,
    ) -> Result<Alert, sqlx::Error> {
        let existing_query = format!(
            "SELECT {COLUMNS} FROM alerts WHERE rule = $1 AND status_id = $2"
        );
        let existing = sqlx::query_as::<_, Alert>(&existing_query)
            .bind(rule)
            .bind(AlertStatus::Active.id())
            .fetch_optional(pool)
            .await?;

        if let Some(alert) = existing {
            if severity == AlertSeverity::Critical && alert.severity == AlertSeverity::Warning {
                let query = format!(
                    "UPDATE alerts SET severity = $2, message = $3 \
                     WHERE id = $1 \
                     RETURNING {COLUMNS}"
                );
                let escalated = sqlx::query_as::<_, Alert>(&query)
                    .bind(alert.id)
                    .bind(AlertSeverity::Critical.as_str())
                    .bind(message)
                    .fetch_one(pool)
                    .await?;
                tracing::warn!(alert_id = escalated.id, rule, "Alert escalated to critical");
                return Ok(escalated);
            }
            return Ok(alert);
        }

        let query = format!(
            "INSERT INTO alerts (rule, severity, message) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        let alert = sqlx::query_as::<_, Alert>(&query)
            .bind(rule)
            .bind(severity.as_str())
            .bind(message)
            .fetch_one(pool)
            .await?;

        tracing::warn!(alert_id = alert.id, rule, severity = %severity, "Alert raised");
        Ok(alert)
    }

    /// Acknowledge an active alert. The alert stays visible until the
    /// triggering condition clears.
    pub async fn acknowledge(pool: &PgPool, id: DbId, actor: &str) -> Result<Alert, CoreError> {
        let query = format!(
            "UPDATE alerts \
             SET status_id = $2, acknowledged_by = $3, acknowledged_at = NOW() \
             WHERE id = $1 AND status_id = $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Alert>(&query)
            .bind(id)
            .bind(AlertStatus::Acknowledged.id())
            .bind(actor)
            .bind(AlertStatus::Active.id())
            .fetch_optional(pool)
            .await
            .map_err(db_internal)?
            .ok_or(CoreError::NotFound { entity: "Alert", id })
    }

    /// Resolve every open alert for a rule once its condition clears.
    pub async fn resolve_rule(pool: &PgPool, rule: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE alerts \
             SET status_id = $2, resolved_at = NOW() \
             WHERE rule = $1 AND status_id IN ($3, $4)",
        )
        .bind(rule)
        .bind(AlertStatus::Resolved.id())
        .bind(AlertStatus::Active.id())
        .bind(AlertStatus::Acknowledged.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// List alerts, optionally only the unresolved ones.
    pub async fn list(pool: &PgPool, only_open: bool) -> Result<Vec<Alert>, sqlx::Error> {
        let where_clause = if only_open {
            format!("WHERE status_id <> {}", AlertStatus::Resolved.id())
        } else {
            String::new()
        };
        let query = format!(
            "SELECT {COLUMNS} FROM alerts {where_clause} ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, Alert>(&query).fetch_all(pool).await
    }

    /// Find an alert by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Alert>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM alerts WHERE id = $1");
        sqlx::query_as::<_, Alert>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
