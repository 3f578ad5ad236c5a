//! Availability browsing and the hold lifecycle.
//!
//! Holds reserve one unit of slot capacity for a checkout session and
//! expire on their own; nothing here talks to the external platform.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use velora_core::types::DbId;
use velora_db::models::slot::SlotListQuery;
use velora_db::repositories::{HoldRepo, SlotRepo};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body identifying the checkout session that owns a hold.
#[derive(Debug, Deserialize)]
pub struct HoldRequest {
    pub session_id: String,
}

/// GET /api/v1/slots
///
/// List bookable slots, filterable by service and time range.
async fn list_slots(
    State(state): State<AppState>,
    Query(params): Query<SlotListQuery>,
) -> AppResult<impl IntoResponse> {
    let slots = SlotRepo::list(&state.pool, &params).await?;

    Ok(Json(DataResponse { data: slots }))
}

/// POST /api/v1/slots/{id}/hold
///
/// Place a TTL-bound hold on one capacity unit. A session holds at most
/// one slot; holding a new slot releases the previous one atomically.
async fn acquire_hold(
    State(state): State<AppState>,
    Path(slot_id): Path<DbId>,
    Json(input): Json<HoldRequest>,
) -> AppResult<impl IntoResponse> {
    if input.session_id.trim().is_empty() {
        return Err(AppError::BadRequest("session_id must not be empty".into()));
    }

    let hold = HoldRepo::acquire(
        &state.pool,
        slot_id,
        &input.session_id,
        state.sync_config.hold_ttl,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: hold })))
}

/// POST /api/v1/holds/{id}/extend
///
/// Reset the hold's expiry to a full TTL. Expired holds cannot be
/// extended (410).
async fn extend_hold(
    State(state): State<AppState>,
    Path(hold_id): Path<DbId>,
    Json(input): Json<HoldRequest>,
) -> AppResult<impl IntoResponse> {
    let hold = HoldRepo::extend(
        &state.pool,
        hold_id,
        &input.session_id,
        state.sync_config.hold_ttl,
    )
    .await?;

    Ok(Json(DataResponse { data: hold }))
}

/// DELETE /api/v1/holds/{id}
///
/// Release a hold. Only the owning session may release it.
async fn release_hold(
    State(state): State<AppState>,
    Path(hold_id): Path<DbId>,
    Json(input): Json<HoldRequest>,
) -> AppResult<impl IntoResponse> {
    HoldRepo::release(&state.pool, hold_id, &input.session_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/slots", get(list_slots))
        .route("/slots/{id}/hold", post(acquire_hold))
        .route("/holds/{id}/extend", post(extend_hold))
        .route("/holds/{id}", delete(release_hold))
}
