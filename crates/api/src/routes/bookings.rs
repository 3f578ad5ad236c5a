//! Booking confirmation and cancellation.
//!
//! Confirming converts an unexpired hold into a booking in one
//! transaction; propagation to the external platform is queued afterwards
//! and never blocks or rolls back the local write.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, post};
use axum::{Json, Router};
use serde::Deserialize;
use velora_core::entity::EntityKind;
use velora_core::types::DbId;
use velora_db::models::booking::ConfirmBooking;
use velora_db::repositories::BookingRepo;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /api/v1/bookings`.
#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub hold_id: DbId,
    pub session_id: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
}

/// POST /api/v1/bookings
///
/// Confirm a booking from an active hold.
async fn create_booking(
    State(state): State<AppState>,
    Json(input): Json<CreateBookingRequest>,
) -> AppResult<impl IntoResponse> {
    if input.client_name.trim().is_empty() {
        return Err(AppError::BadRequest("client_name must not be empty".into()));
    }
    if !input.client_email.contains('@') {
        return Err(AppError::BadRequest("client_email must be a valid email".into()));
    }

    let booking = BookingRepo::confirm_from_hold(
        &state.pool,
        &ConfirmBooking {
            hold_id: input.hold_id,
            session_id: input.session_id,
            client_name: input.client_name,
            client_email: input.client_email,
            client_phone: input.client_phone,
        },
    )
    .await?;

    enqueue_best_effort(&state, booking.id).await;

    Ok((StatusCode::CREATED, Json(DataResponse { data: booking })))
}

/// DELETE /api/v1/bookings/{id}
///
/// Cancel a booking. The slot reopens if no other confirmed booking
/// remains, and the cancellation is queued for the external platform.
async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let booking = BookingRepo::cancel(&state.pool, booking_id).await?;

    enqueue_best_effort(&state, booking.id).await;

    Ok(Json(DataResponse { data: booking }))
}

/// Queue propagation for a booking without failing the request. The row
/// keeps its dirty flag on error, so the next full sync picks it up.
async fn enqueue_best_effort(state: &AppState, booking_id: DbId) {
    if let Err(err) = state
        .engine
        .run_incremental_sync(EntityKind::Booking, booking_id)
        .await
    {
        tracing::warn!(booking_id, error = %err, "Failed to enqueue booking sync");
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/{id}", delete(cancel_booking))
}
