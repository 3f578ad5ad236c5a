//! Operational endpoints for the sync queue.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use velora_core::types::Timestamp;
use velora_db::models::sync_operation::QueueCounts;
use velora_db::repositories::{ConflictRepo, SyncOperationRepo, SyncStateRepo};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Response payload for `GET /api/v1/sync/status`.
#[derive(Serialize)]
pub struct SyncStatus {
    pub queue: QueueCounts,
    pub oldest_pending_age_secs: i64,
    pub open_conflicts: i64,
    pub last_full_sync_at: Option<Timestamp>,
}

/// GET /api/v1/sync/status
async fn sync_status(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let queue = SyncOperationRepo::counts_by_status(&state.pool).await?;
    let oldest_pending_age_secs = SyncOperationRepo::oldest_pending_age_secs(&state.pool).await?;
    let open_conflicts = ConflictRepo::count_open(&state.pool).await?;
    let last_full_sync_at = SyncStateRepo::last_full_sync_at(&state.pool).await?;

    Ok(Json(DataResponse {
        data: SyncStatus {
            queue,
            oldest_pending_age_secs,
            open_conflicts,
            last_full_sync_at,
        },
    }))
}

/// POST /api/v1/sync/run
///
/// Trigger a full reconciliation pass and wait for its report. The pass
/// runs under the request's own cancellation scope; the background worker
/// pool keeps draining whatever the pass could not finish in its budget.
async fn run_full_sync(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let report = state.engine.run_full_sync(&CancellationToken::new()).await?;

    Ok(Json(DataResponse { data: report }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sync/status", get(sync_status))
        .route("/sync/run", post(run_full_sync))
}
