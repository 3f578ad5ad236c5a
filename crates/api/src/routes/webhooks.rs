//! Receiver for booking events pushed by the external platform.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use velora_booksy::types::WebhookEvent;
use velora_sync::WebhookOutcome;

use crate::error::AppResult;
use crate::state::AppState;

/// POST /webhooks/booksy
///
/// Apply one external booking event. Application is idempotent, so the
/// platform may deliver the same event more than once; a capacity clash
/// records a conflict instead of overwriting local state.
async fn receive_booksy_event(
    State(state): State<AppState>,
    Json(event): Json<WebhookEvent>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.engine.apply_external_booking(&event).await?;

    let body = match outcome {
        WebhookOutcome::Created(booking) => json!({
            "data": { "outcome": "created", "booking": booking }
        }),
        WebhookOutcome::Cancelled(booking) => json!({
            "data": { "outcome": "cancelled", "booking": booking }
        }),
        WebhookOutcome::ConflictRecorded(conflict) => json!({
            "data": { "outcome": "conflict_recorded", "conflict": conflict }
        }),
        WebhookOutcome::Ignored => json!({
            "data": { "outcome": "ignored" }
        }),
    };

    Ok(Json(body))
}

/// Mount webhook routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/booksy", post(receive_booksy_event))
}
