use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use velora_core::health::{classify, QueueStats, Verdict};
use velora_db::models::monitoring::HealthSample;
use velora_db::repositories::HealthRepo;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the database is reachable.
    pub db_healthy: bool,
    /// Queue verdict from the most recent monitor sample, if one exists.
    pub queue: Option<Verdict>,
    /// The sample the verdict was derived from.
    pub sample: Option<HealthSample>,
}

/// GET /health -- returns service, database, and queue health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = velora_db::health_check(&state.pool).await.is_ok();

    let sample = if db_healthy {
        HealthRepo::latest(&state.pool).await.unwrap_or_default()
    } else {
        None
    };

    let queue = sample.as_ref().map(|s| {
        let stats = QueueStats {
            error_rate: s.error_rate,
            pending_depth: s.pending_ops,
            oldest_pending_age_secs: s.oldest_pending_age_secs,
            open_conflicts: s.open_conflicts,
        };
        classify(&stats, &state.sync_config.thresholds)
    });

    let status = if !db_healthy {
        "degraded"
    } else {
        match queue {
            Some(Verdict::Unhealthy) => "unhealthy",
            Some(Verdict::Degraded) => "degraded",
            _ => "ok",
        }
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        queue,
        sample,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
