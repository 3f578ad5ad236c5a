//! Database-backed consent check.

use async_trait::async_trait;
use sqlx::PgPool;
use velora_booksy::ConsentService;
use velora_db::repositories::ConsentRepo;

/// [`ConsentService`] backed by the `consents` table.
///
/// Fails closed: a database error during the check is treated as absent
/// consent and logged, never propagated into the sync path.
pub struct DbConsentService {
    pool: PgPool,
}

impl DbConsentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConsentService for DbConsentService {
    async fn has_valid_consent(&self, customer_email: &str) -> bool {
        match ConsentRepo::has_valid_consent(&self.pool, customer_email).await {
            Ok(valid) => valid,
            Err(e) => {
                tracing::error!(error = %e, "Consent check failed; treating as absent");
                false
            }
        }
    }
}
