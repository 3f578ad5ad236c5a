//! Shared fixtures for API integration tests: a stub external calendar,
//! router construction mirroring `main.rs`, and HTTP helpers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use velora_api::config::ServerConfig;
use velora_api::routes;
use velora_api::state::AppState;
use velora_booksy::types::{
    AvailabilityPayload, BookingPayload, ExternalBooking, ExternalService,
};
use velora_booksy::{ClientError, ExternalCalendar};
use velora_core::types::Timestamp;
use velora_sync::{DbConsentService, SyncConfig, SyncEngine};

/// In-memory [`ExternalCalendar`] where every call succeeds.
#[derive(Default)]
pub struct StubCalendar {
    counter: AtomicU64,
}

impl StubCalendar {
    fn next_ref(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl ExternalCalendar for StubCalendar {
    async fn list_services(&self) -> Result<Vec<ExternalService>, ClientError> {
        Ok(Vec::new())
    }

    async fn list_bookings(&self, _since: Timestamp) -> Result<Vec<ExternalBooking>, ClientError> {
        Ok(Vec::new())
    }

    async fn create_booking(&self, _payload: &BookingPayload) -> Result<String, ClientError> {
        Ok(self.next_ref("ext"))
    }

    async fn update_booking(
        &self,
        _external_ref: &str,
        _payload: &BookingPayload,
    ) -> Result<(), ClientError> {
        Ok(())
    }

    async fn cancel_booking(&self, _external_ref: &str) -> Result<(), ClientError> {
        Ok(())
    }

    async fn push_availability(
        &self,
        external_ref: Option<&str>,
        _payload: &AvailabilityPayload,
    ) -> Result<String, ClientError> {
        Ok(external_ref.map(str::to_string).unwrap_or_else(|| self.next_ref("svc")))
    }

    async fn get_auth_token(&self) -> Result<String, ClientError> {
        Ok("test-token".to_string())
    }
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
    }
}

/// Build the full application router with all middleware layers, using the
/// given database pool.
///
/// Mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack (CORS, request ID, timeout, tracing,
/// panic recovery) that production uses. The external calendar is a stub;
/// no background loops run.
pub fn build_test_app(pool: PgPool) -> Router {
    let config = test_config();
    let sync_config = SyncConfig::default();

    let engine = Arc::new(SyncEngine::new(
        pool.clone(),
        Arc::new(StubCalendar::default()),
        Arc::new(DbConsentService::new(pool.clone())),
        sync_config.clone(),
    ));

    let state = AppState {
        pool,
        config: Arc::new(config),
        sync_config,
        engine,
    };

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .merge(routes::health::router())
        .merge(routes::webhooks::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

/// Create an available slot starting tomorrow.
pub async fn seed_slot(pool: &PgPool, capacity: i32) -> velora_db::models::slot::Slot {
    let starts_at = chrono::Utc::now() + chrono::Duration::hours(24);
    velora_db::repositories::SlotRepo::create(
        pool,
        &velora_db::models::slot::CreateSlot {
            service_id: 1,
            starts_at,
            ends_at: starts_at + chrono::Duration::hours(1),
            capacity: Some(capacity),
            price_cents: Some(5000),
        },
    )
    .await
    .expect("seed slot")
}

/// Send a GET request to the app.
pub async fn get(app: Router, path: &str) -> Response {
    app.oneshot(
        Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Send a POST request with a JSON body.
pub async fn post_json(app: Router, path: &str, body: serde_json::Value) -> Response {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Send a DELETE request with an optional JSON body.
pub async fn delete_json(app: Router, path: &str, body: Option<serde_json::Value>) -> Response {
    let builder = Request::builder().method(Method::DELETE).uri(path);
    let request = match body {
        Some(json) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

/// Collect a response body into JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
