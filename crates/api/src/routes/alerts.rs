//! Alert listing and acknowledgement.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use velora_core::types::DbId;
use velora_db::repositories::AlertRepo;

use crate::error::AppResult;
use crate::query::IncludeResolvedParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /api/v1/alerts/{id}/acknowledge`.
#[derive(Debug, Deserialize)]
pub struct AcknowledgeRequest {
    pub actor: String,
}

/// GET /api/v1/alerts
async fn list_alerts(
    State(state): State<AppState>,
    Query(params): Query<IncludeResolvedParams>,
) -> AppResult<impl IntoResponse> {
    let alerts = AlertRepo::list(&state.pool, !params.include_resolved).await?;

    Ok(Json(DataResponse { data: alerts }))
}

/// POST /api/v1/alerts/{id}/acknowledge
///
/// Acknowledge an active alert. The alert stays visible until the
/// triggering condition clears and the monitor resolves it.
async fn acknowledge_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<DbId>,
    Json(input): Json<AcknowledgeRequest>,
) -> AppResult<impl IntoResponse> {
    let alert = AlertRepo::acknowledge(&state.pool, alert_id, &input.actor).await?;

    Ok(Json(DataResponse { data: alert }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/alerts", get(list_alerts))
        .route("/alerts/{id}/acknowledge", post(acknowledge_alert))
}
