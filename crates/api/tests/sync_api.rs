//! Integration tests for the sync, conflict, alert, and webhook endpoints.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use sqlx::PgPool;
use velora_core::entity::{AlertSeverity, ConflictType, EntityKind};
use velora_db::models::conflict::NewConflict;
use velora_db::repositories::{AlertRepo, BookingRepo, ConflictRepo, SlotRepo};

use common::{body_json, get, post_json, seed_slot};

#[sqlx::test(migrations = "../db/migrations")]
async fn sync_status_reports_an_empty_queue(pool: PgPool) {
    let app = common::build_test_app(pool);
    let response = get(app, "/api/v1/sync/status").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["queue"]["pending"], 0);
    assert_eq!(json["data"]["open_conflicts"], 0);
    assert!(json["data"]["last_full_sync_at"].is_null());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn manual_full_sync_pushes_dirty_slots(pool: PgPool) {
    let slot = seed_slot(&pool, 2).await;

    let app = common::build_test_app(pool.clone());
    let response = post_json(app.clone(), "/api/v1/sync/run", json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["processed"], 1);
    assert_eq!(json["data"]["failed"], 0);

    let slot = SlotRepo::find_by_id(&pool, slot.id).await.unwrap().unwrap();
    assert!(slot.external_ref.is_some());

    // The pass recorded its watermark.
    let response = get(app, "/api/v1/sync/status").await;
    let json = body_json(response).await;
    assert!(json["data"]["last_full_sync_at"].is_string());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn conflicts_are_listed_and_resolved_over_http(pool: PgPool) {
    let slot = seed_slot(&pool, 1).await;
    let booking = BookingRepo::create_confirmed_external(
        &pool,
        slot.id,
        "ext-42",
        "Anna Kowalska",
        "anna@example.com",
        5000,
    )
    .await
    .unwrap();
    let conflict = ConflictRepo::create(
        &pool,
        &NewConflict {
            entity_kind: EntityKind::Booking,
            entity_id: booking.id,
            external_ref: Some("ext-42".to_string()),
            conflict_type: ConflictType::SyncFailure,
            local_snapshot: None,
            external_snapshot: None,
        },
    )
    .await
    .unwrap();

    let app = common::build_test_app(pool.clone());

    let response = get(app.clone(), "/api/v1/conflicts").await;
    let json = body_json(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
    assert_eq!(json["data"][0]["id"], conflict.id);

    let response = post_json(
        app.clone(),
        &format!("/api/v1/conflicts/{}/resolve", conflict.id),
        json!({ "resolution": "external_wins", "resolved_by": "ops" }),
    )
    .await;
    // No external snapshot to apply; the policy is rejected up front.
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json(
        app.clone(),
        &format!("/api/v1/conflicts/{}/resolve", conflict.id),
        json!({ "resolution": "platform_wins", "resolved_by": "ops" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["resolution"], "platform_wins");

    // Resolution is terminal.
    let response = post_json(
        app.clone(),
        &format!("/api/v1/conflicts/{}/resolve", conflict.id),
        json!({ "resolution": "platform_wins" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The default listing hides resolved conflicts.
    let response = get(app, "/api/v1/conflicts").await;
    let json = body_json(response).await;
    assert!(json["data"].as_array().unwrap().is_empty());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn alerts_are_acknowledged_over_http(pool: PgPool) {
    let alert = AlertRepo::raise(&pool, "queue_health", AlertSeverity::Warning, "depth 60")
        .await
        .unwrap();

    let app = common::build_test_app(pool);

    let response = get(app.clone(), "/api/v1/alerts").await;
    let json = body_json(response).await;
    assert_eq!(json["data"][0]["rule"], "queue_health");

    let response = post_json(
        app.clone(),
        &format!("/api/v1/alerts/{}/acknowledge", alert.id),
        json!({ "actor": "ops" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["acknowledged_by"], "ops");

    // Already acknowledged; not active any more.
    let response = post_json(
        app,
        &format!("/api/v1/alerts/{}/acknowledge", alert.id),
        json!({ "actor": "ops" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn webhook_event_creates_a_booking_once(pool: PgPool) {
    let slot = seed_slot(&pool, 1).await;
    SlotRepo::mark_synced(&pool, slot.id, Some("svc-1")).await.unwrap();

    let app = common::build_test_app(pool.clone());
    let event = json!({
        "event_type": "booking_created",
        "booking": {
            "external_ref": "bk-77",
            "service_ref": "svc-1",
            "client_name": "Walk-in Client",
            "client_email": "walkin@example.com",
            "starts_at": slot.starts_at,
            "ends_at": slot.ends_at,
            "price_cents": 5000,
            "status": "confirmed",
        },
    });

    let response = post_json(app.clone(), "/webhooks/booksy", event.clone()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["outcome"], "created");
    assert_eq!(json["data"]["booking"]["external_ref"], "bk-77");

    let booking = BookingRepo::find_by_external_ref(&pool, "bk-77").await.unwrap();
    assert!(booking.is_some());

    // Redelivery of the same event is a no-op.
    let response = post_json(app, "/webhooks/booksy", event).await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["outcome"], "ignored");
}
