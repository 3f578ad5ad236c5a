//! Consent collaborator interface.

use async_trait::async_trait;

/// Gate for transmitting a customer's personal data externally.
///
/// The sync engine calls this before enqueuing any operation that would
/// carry personal data off-platform. Absence of consent skips the
/// operation entirely: not retried, not dead-lettered, only logged.
#[async_trait]
pub trait ConsentService: Send + Sync {
    async fn has_valid_consent(&self, customer_email: &str) -> bool;
}
