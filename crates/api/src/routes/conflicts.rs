//! Conflict inspection and manual resolution.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use velora_core::entity::Resolution;
use velora_core::types::DbId;
use velora_db::repositories::ConflictRepo;
use velora_sync::conflict;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters for `GET /api/v1/conflicts`.
#[derive(Debug, Deserialize)]
pub struct ConflictListParams {
    #[serde(default)]
    pub include_resolved: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Request body for `POST /api/v1/conflicts/{id}/resolve`.
#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolution: Resolution,
    /// Operator identity recorded on the conflict row.
    pub resolved_by: Option<String>,
    /// Required when `resolution` is `merged`.
    pub merged_payload: Option<serde_json::Value>,
}

/// GET /api/v1/conflicts
async fn list_conflicts(
    State(state): State<AppState>,
    Query(params): Query<ConflictListParams>,
) -> AppResult<impl IntoResponse> {
    let conflicts = ConflictRepo::list(
        &state.pool,
        !params.include_resolved,
        params.limit,
        params.offset,
    )
    .await?;

    Ok(Json(DataResponse { data: conflicts }))
}

/// POST /api/v1/conflicts/{id}/resolve
///
/// Apply a resolution policy. Resolution is terminal; resolving an
/// already-resolved conflict fails with 400.
async fn resolve_conflict(
    State(state): State<AppState>,
    Path(conflict_id): Path<DbId>,
    Json(input): Json<ResolveRequest>,
) -> AppResult<impl IntoResponse> {
    let actor = input.resolved_by.as_deref().unwrap_or("api");
    let resolved = conflict::resolve(
        &state.pool,
        &state.sync_config,
        conflict_id,
        input.resolution,
        actor,
        input.merged_payload,
    )
    .await?;

    Ok(Json(DataResponse { data: resolved }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/conflicts", get(list_conflicts))
        .route("/conflicts/{id}/resolve", post(resolve_conflict))
}
