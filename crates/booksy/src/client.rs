//! External calendar client: trait plus the production HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use velora_core::types::Timestamp;

use crate::error::{classify_status, ClientError};
use crate::types::{AvailabilityPayload, BookingPayload, ExternalBooking, ExternalService};

/// Operations the sync engine needs from the external scheduling platform.
///
/// Implementations must classify every failure into [`ClientError`]; the
/// retry policy downstream interprets nothing else.
#[async_trait]
pub trait ExternalCalendar: Send + Sync {
    /// Services the business offers on the external platform.
    async fn list_services(&self) -> Result<Vec<ExternalService>, ClientError>;

    /// Bookings changed on the external side since the given instant.
    async fn list_bookings(&self, since: Timestamp) -> Result<Vec<ExternalBooking>, ClientError>;

    /// Create a booking externally; returns the platform's reference.
    async fn create_booking(&self, payload: &BookingPayload) -> Result<String, ClientError>;

    /// Update an existing external booking.
    async fn update_booking(
        &self,
        external_ref: &str,
        payload: &BookingPayload,
    ) -> Result<(), ClientError>;

    /// Cancel an external booking.
    async fn cancel_booking(&self, external_ref: &str) -> Result<(), ClientError>;

    /// Publish or update a bookable time slot externally; returns the
    /// platform's reference for the slot.
    async fn push_availability(
        &self,
        external_ref: Option<&str>,
        payload: &AvailabilityPayload,
    ) -> Result<String, ClientError>;

    /// Fetch (or refresh) an access token. Exposed so the engine can
    /// verify credentials ahead of a full sync pass.
    async fn get_auth_token(&self) -> Result<String, ClientError>;
}

/// Default per-call timeout. The caller enforces this, not the platform:
/// a hung call must fail the operation, never block the worker.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// reqwest-backed [`ExternalCalendar`] implementation.
pub struct BooksyClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl BooksyClient {
    /// Build a client for the given API base URL.
    ///
    /// The per-call timeout is baked into the underlying `reqwest::Client`
    /// so every request, including connect time, is bounded.
    pub fn new(base_url: String, api_key: String, timeout: Option<Duration>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .unwrap_or_default();
        Self { http, base_url, api_key }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    /// Turn a non-success response into a classified error.
    async fn classify(response: reqwest::Response) -> ClientError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        classify_status(status, retry_after, body)
    }

    fn transport(err: reqwest::Error) -> ClientError {
        ClientError::Transient(format!("transport error: {err}"))
    }
}

#[async_trait]
impl ExternalCalendar for BooksyClient {
    async fn list_services(&self) -> Result<Vec<ExternalService>, ClientError> {
        let response = self
            .http
            .get(self.url("/v1/services"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(Self::transport)?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }
        response.json().await.map_err(Self::transport)
    }

    async fn list_bookings(&self, since: Timestamp) -> Result<Vec<ExternalBooking>, ClientError> {
        let response = self
            .http
            .get(self.url("/v1/bookings"))
            .query(&[("since", since.to_rfc3339())])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(Self::transport)?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }
        response.json().await.map_err(Self::transport)
    }

    async fn create_booking(&self, payload: &BookingPayload) -> Result<String, ClientError> {
        let response = self
            .http
            .post(self.url("/v1/bookings"))
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(Self::transport)?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }

        #[derive(serde::Deserialize)]
        struct Created {
            external_ref: String,
        }
        let created: Created = response.json().await.map_err(Self::transport)?;
        tracing::debug!(external_ref = %created.external_ref, "External booking created");
        Ok(created.external_ref)
    }

    async fn update_booking(
        &self,
        external_ref: &str,
        payload: &BookingPayload,
    ) -> Result<(), ClientError> {
        let response = self
            .http
            .put(self.url(&format!("/v1/bookings/{external_ref}")))
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(Self::transport)?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }
        Ok(())
    }

    async fn cancel_booking(&self, external_ref: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(self.url(&format!("/v1/bookings/{external_ref}")))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(Self::transport)?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }
        Ok(())
    }

    async fn push_availability(
        &self,
        external_ref: Option<&str>,
        payload: &AvailabilityPayload,
    ) -> Result<String, ClientError> {
        let request = match external_ref {
            Some(r) => self.http.put(self.url(&format!("/v1/availability/{r}"))),
            None => self.http.post(self.url("/v1/availability")),
        };
        let response = request
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(Self::transport)?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }

        #[derive(serde::Deserialize)]
        struct Pushed {
            external_ref: String,
        }
        let pushed: Pushed = response.json().await.map_err(Self::transport)?;
        Ok(pushed.external_ref)
    }

    async fn get_auth_token(&self) -> Result<String, ClientError> {
        let response = self
            .http
            .post(self.url("/v1/auth/token"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(Self::transport)?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }

        #[derive(serde::Deserialize)]
        struct Token {
            access_token: String,
        }
        let token: Token = response.json().await.map_err(Self::transport)?;
        Ok(token.access_token)
    }
}
