pub mod alerts;
pub mod bookings;
pub mod conflicts;
pub mod health;
pub mod slots;
pub mod sync;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /slots                          list availability
/// /slots/{id}/hold                place a hold (POST)
/// /holds/{id}/extend              reset a hold's expiry (POST)
/// /holds/{id}                     release a hold (DELETE)
///
/// /bookings                       confirm from hold (POST)
/// /bookings/{id}                  cancel (DELETE)
///
/// /sync/status                    queue depth, last full sync, conflicts
/// /sync/run                       trigger a full reconciliation (POST)
///
/// /conflicts                      list (open by default)
/// /conflicts/{id}/resolve         apply a resolution policy (POST)
///
/// /alerts                         list (open by default)
/// /alerts/{id}/acknowledge        acknowledge (POST)
/// ```
///
/// The webhook receiver (`/webhooks/booksy`) and `GET /health` are mounted
/// at the root, outside this tree.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(slots::router())
        .merge(bookings::router())
        .merge(sync::router())
        .merge(conflicts::router())
        .merge(alerts::router())
}
