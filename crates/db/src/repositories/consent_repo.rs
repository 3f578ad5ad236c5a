//! Repository for the `consents` table (GDPR gating).

use sqlx::PgPool;

use crate::models::consent::Consent;

/// Column list for `consents` queries.
const COLUMNS: &str = "id, customer_email, granted_at, revoked_at";

/// Provides consent grants, revocations, and the sync-time check.
pub struct ConsentRepo;

impl ConsentRepo {
    /// Record (or refresh) a customer's consent to external data transfer.
    pub async fn grant(pool: &PgPool, customer_email: &str) -> Result<Consent, sqlx::Error> {
        let query = format!(
            "INSERT INTO consents (customer_email) \
             VALUES ($1) \
             ON CONFLICT (customer_email) \
             DO UPDATE SET granted_at = NOW(), revoked_at = NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Consent>(&query)
            .bind(customer_email)
            .fetch_one(pool)
            .await
    }

    /// Revoke a customer's consent. Future sync operations for their data
    /// are skipped, not queued.
    pub async fn revoke(pool: &PgPool, customer_email: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE consents SET revoked_at = NOW() \
             WHERE customer_email = $1 AND revoked_at IS NULL",
        )
        .bind(customer_email)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether the customer currently consents to external data transfer.
    pub async fn has_valid_consent(
        pool: &PgPool,
        customer_email: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (\
                 SELECT 1 FROM consents \
                 WHERE customer_email = $1 AND revoked_at IS NULL)",
        )
        .bind(customer_email)
        .fetch_one(pool)
        .await
    }
}
