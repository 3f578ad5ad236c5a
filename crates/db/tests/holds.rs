//! Hold lifecycle and capacity accounting against a real database.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use sqlx::PgPool;
use velora_core::error::CoreError;
use velora_db::models::booking::ConfirmBooking;
use velora_db::models::status::{BookingStatus, SlotStatus};
use velora_db::repositories::{BookingRepo, HoldRepo, SlotRepo};

use common::seed_slot;

const TTL: Duration = Duration::from_secs(300);

fn confirm_input(hold_id: i64, session_id: &str) -> ConfirmBooking {
    ConfirmBooking {
        hold_id,
        session_id: session_id.to_string(),
        client_name: "Anna Kowalska".to_string(),
        client_email: "anna@example.com".to_string(),
        client_phone: None,
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn capacity_counts_bookings_and_unexpired_holds(pool: PgPool) {
    let slot = seed_slot(&pool, 2).await;

    let hold_a = HoldRepo::acquire(&pool, slot.id, "sess-a", TTL).await.unwrap();
    HoldRepo::acquire(&pool, slot.id, "sess-b", TTL).await.unwrap();

    let err = HoldRepo::acquire(&pool, slot.id, "sess-c", TTL).await.unwrap_err();
    assert_matches!(err, CoreError::SlotUnavailable { slot_id } if slot_id == slot.id);

    // Converting a hold into a booking keeps the unit occupied.
    BookingRepo::confirm_from_hold(&pool, &confirm_input(hold_a.id, "sess-a"))
        .await
        .unwrap();
    let err = HoldRepo::acquire(&pool, slot.id, "sess-c", TTL).await.unwrap_err();
    assert_matches!(err, CoreError::SlotUnavailable { .. });
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_sessions_race_for_the_last_unit(pool: PgPool) {
    let slot = seed_slot(&pool, 1).await;

    let (a, b) = tokio::join!(
        HoldRepo::acquire(&pool, slot.id, "sess-a", TTL),
        HoldRepo::acquire(&pool, slot.id, "sess-b", TTL),
    );

    // Exactly one session wins regardless of scheduling.
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    let loser = if a.is_ok() { b } else { a };
    assert_matches!(loser.unwrap_err(), CoreError::SlotUnavailable { .. });
    assert_eq!(HoldRepo::active_count_for_slot(&pool, slot.id).await.unwrap(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn switching_slots_moves_the_session_hold(pool: PgPool) {
    let first = seed_slot(&pool, 1).await;
    let second = seed_slot(&pool, 1).await;

    let old = HoldRepo::acquire(&pool, first.id, "sess-a", TTL).await.unwrap();
    HoldRepo::acquire(&pool, second.id, "sess-a", TTL).await.unwrap();

    assert!(HoldRepo::find_by_id(&pool, old.id).await.unwrap().is_none());
    assert_eq!(HoldRepo::active_count_for_slot(&pool, first.id).await.unwrap(), 0);
    assert_eq!(HoldRepo::active_count_for_slot(&pool, second.id).await.unwrap(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn failed_switch_keeps_the_prior_hold(pool: PgPool) {
    let first = seed_slot(&pool, 1).await;
    let full = seed_slot(&pool, 1).await;
    HoldRepo::acquire(&pool, full.id, "sess-other", TTL).await.unwrap();

    let prior = HoldRepo::acquire(&pool, first.id, "sess-a", TTL).await.unwrap();
    let err = HoldRepo::acquire(&pool, full.id, "sess-a", TTL).await.unwrap_err();
    assert_matches!(err, CoreError::SlotUnavailable { .. });

    // The rolled-back transaction restored the session's prior hold.
    assert!(HoldRepo::find_by_id(&pool, prior.id).await.unwrap().is_some());
    assert_eq!(HoldRepo::active_count_for_slot(&pool, first.id).await.unwrap(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn expired_holds_return_capacity(pool: PgPool) {
    let slot = seed_slot(&pool, 1).await;

    let hold = HoldRepo::acquire(&pool, slot.id, "sess-a", Duration::from_millis(50))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Expired but not yet swept: it no longer counts, extends, or converts.
    assert_eq!(HoldRepo::active_count_for_slot(&pool, slot.id).await.unwrap(), 0);
    let err = HoldRepo::extend(&pool, hold.id, "sess-a", TTL).await.unwrap_err();
    assert_matches!(err, CoreError::HoldExpired { hold_id } if hold_id == hold.id);
    let err = BookingRepo::confirm_from_hold(&pool, &confirm_input(hold.id, "sess-a"))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::HoldExpired { .. });

    // The freed unit is usable again before the sweep runs.
    HoldRepo::acquire(&pool, slot.id, "sess-b", TTL).await.unwrap();

    let swept = HoldRepo::reap_expired(&pool).await.unwrap();
    assert_eq!(swept, 1);
    assert!(HoldRepo::find_by_id(&pool, hold.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn extend_resets_the_expiry(pool: PgPool) {
    let slot = seed_slot(&pool, 1).await;

    let hold = HoldRepo::acquire(&pool, slot.id, "sess-a", Duration::from_secs(5)).await.unwrap();
    let extended = HoldRepo::extend(&pool, hold.id, "sess-a", TTL).await.unwrap();
    assert!(extended.expires_at > hold.expires_at);

    let err = HoldRepo::extend(&pool, hold.id + 1000, "sess-a", TTL).await.unwrap_err();
    assert_matches!(err, CoreError::NotFound { .. });
}

#[sqlx::test(migrations = "./migrations")]
async fn release_requires_the_owning_session(pool: PgPool) {
    let slot = seed_slot(&pool, 1).await;
    let hold = HoldRepo::acquire(&pool, slot.id, "sess-a", TTL).await.unwrap();

    let err = HoldRepo::release(&pool, hold.id, "sess-b").await.unwrap_err();
    assert_matches!(err, CoreError::NotFound { .. });
    assert_eq!(HoldRepo::active_count_for_slot(&pool, slot.id).await.unwrap(), 1);

    HoldRepo::release(&pool, hold.id, "sess-a").await.unwrap();
    assert_eq!(HoldRepo::active_count_for_slot(&pool, slot.id).await.unwrap(), 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn confirm_consumes_the_hold_and_books_the_slot(pool: PgPool) {
    let slot = seed_slot(&pool, 1).await;
    let hold = HoldRepo::acquire(&pool, slot.id, "sess-a", TTL).await.unwrap();

    let booking = BookingRepo::confirm_from_hold(&pool, &confirm_input(hold.id, "sess-a"))
        .await
        .unwrap();
    assert_eq!(booking.status_id, BookingStatus::Confirmed.id());
    assert_eq!(booking.price_cents, 5000);
    assert!(booking.needs_sync);

    assert!(HoldRepo::find_by_id(&pool, hold.id).await.unwrap().is_none());
    let slot = SlotRepo::find_by_id(&pool, slot.id).await.unwrap().unwrap();
    assert_eq!(slot.status_id, SlotStatus::Booked.id());

    // Cancelling the only confirmed booking reopens the slot.
    BookingRepo::cancel(&pool, booking.id).await.unwrap();
    let slot = SlotRepo::find_by_id(&pool, slot.id).await.unwrap().unwrap();
    assert_eq!(slot.status_id, SlotStatus::Available.id());
}
