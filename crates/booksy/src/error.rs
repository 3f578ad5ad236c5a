//! Typed error taxonomy for external platform calls.
//!
//! Transport-level failures are classified here, at the collaborator
//! boundary, and never re-interpreted downstream: the queue's retry policy
//! looks only at [`ClientError::is_retryable`] and
//! [`ClientError::retry_after`].

use std::time::Duration;

/// A failure talking to the external scheduling platform.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Credentials invalid or expired. Dead-letters immediately and raises
    /// a critical alert, since no further sync can proceed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The platform asked us to slow down. Retried with backoff, honouring
    /// the provided retry-after when present.
    #[error("Rate limited by external platform")]
    RateLimited { retry_after: Option<Duration> },

    /// The referenced entity does not exist on the external side.
    /// Dead-letters into a conflict for manual inspection.
    #[error("External entity not found: {0}")]
    NotFound(String),

    /// Network trouble, timeout, or a 5xx. Retried with backoff.
    #[error("Transient external error: {0}")]
    Transient(String),
}

impl ClientError {
    /// Whether the queue may retry the operation automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited { .. })
    }

    /// Server-requested minimum delay before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Classify an HTTP response status into the taxonomy.
///
/// `retry_after` comes from the `Retry-After` header when the platform
/// sends one.
pub fn classify_status(
    status: reqwest::StatusCode,
    retry_after: Option<Duration>,
    body: String,
) -> ClientError {
    use reqwest::StatusCode;

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Auth(body),
        StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited { retry_after },
        StatusCode::NOT_FOUND => ClientError::NotFound(body),
        _ => ClientError::Transient(format!("HTTP {status}: {body}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_and_rate_limited_are_retryable() {
        assert!(ClientError::Transient("timeout".into()).is_retryable());
        assert!(ClientError::RateLimited { retry_after: None }.is_retryable());
        assert!(!ClientError::Auth("expired token".into()).is_retryable());
        assert!(!ClientError::NotFound("booking-42".into()).is_retryable());
    }

    #[test]
    fn retry_after_only_surfaces_for_rate_limits() {
        let limited = ClientError::RateLimited { retry_after: Some(Duration::from_secs(30)) };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(ClientError::Transient("x".into()).retry_after(), None);
    }

    #[test]
    fn status_codes_map_to_taxonomy() {
        use reqwest::StatusCode;

        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, None, String::new()),
            ClientError::Auth(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, None, String::new()),
            ClientError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, None, String::new()),
            ClientError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, None, String::new()),
            ClientError::Transient(_)
        ));
    }
}
