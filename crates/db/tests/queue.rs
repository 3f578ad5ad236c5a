//! Queue dispatch semantics against a real database: dedupe, ordering,
//! per-entity serialization, retry, and dead-lettering.

mod common;

use std::time::Duration;

use sqlx::PgPool;
use velora_core::entity::{ConflictType, EntityKind, OpType, Resolution};
use velora_db::models::conflict::NewConflict;
use velora_db::models::status::OperationStatus;
use velora_db::repositories::{ConflictRepo, SyncOperationRepo};

use common::enqueue_op;

#[sqlx::test(migrations = "./migrations")]
async fn enqueue_deduplicates_within_the_window(pool: PgPool) {
    let first = enqueue_op(&pool, OpType::Update, 1, 5, "same").await;
    let second = enqueue_op(&pool, OpType::Update, 1, 5, "same").await;
    assert_eq!(first.id, second.id);

    // A different payload is new work, not a duplicate.
    let third = enqueue_op(&pool, OpType::Update, 1, 5, "other").await;
    assert_ne!(first.id, third.id);

    let counts = SyncOperationRepo::counts_by_status(&pool).await.unwrap();
    assert_eq!(counts.pending, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn claim_orders_by_priority_then_fifo(pool: PgPool) {
    let low = enqueue_op(&pool, OpType::Update, 1, 0, "low").await;
    let high = enqueue_op(&pool, OpType::Cancel, 2, 10, "high").await;
    let mid_first = enqueue_op(&pool, OpType::Update, 3, 5, "mid-1").await;
    let mid_second = enqueue_op(&pool, OpType::Update, 4, 5, "mid-2").await;

    let mut claimed = Vec::new();
    while let Some(op) = SyncOperationRepo::claim_next(&pool).await.unwrap() {
        claimed.push(op.id);
    }
    assert_eq!(claimed, vec![high.id, mid_first.id, mid_second.id, low.id]);
}

#[sqlx::test(migrations = "./migrations")]
async fn operations_for_one_entity_run_in_order(pool: PgPool) {
    let create = enqueue_op(&pool, OpType::Create, 7, 5, "create").await;
    let cancel = enqueue_op(&pool, OpType::Cancel, 7, 10, "cancel").await;

    // FIFO per entity beats priority: the cancel must not overtake the
    // create it refers to.
    let claimed = SyncOperationRepo::claim_next(&pool).await.unwrap().unwrap();
    assert_eq!(claimed.id, create.id);

    // While the create is in flight the entity stays serialized.
    assert!(SyncOperationRepo::claim_next(&pool).await.unwrap().is_none());

    SyncOperationRepo::complete(&pool, create.id).await.unwrap();
    let claimed = SyncOperationRepo::claim_next(&pool).await.unwrap().unwrap();
    assert_eq!(claimed.id, cancel.id);
}

#[sqlx::test(migrations = "./migrations")]
async fn open_conflict_blocks_dispatch(pool: PgPool) {
    enqueue_op(&pool, OpType::Update, 9, 5, "blocked").await;
    let conflict = ConflictRepo::create(
        &pool,
        &NewConflict {
            entity_kind: EntityKind::Booking,
            entity_id: 9,
            external_ref: None,
            conflict_type: ConflictType::DataMismatch,
            local_snapshot: None,
            external_snapshot: None,
        },
    )
    .await
    .unwrap();

    assert!(SyncOperationRepo::claim_next(&pool).await.unwrap().is_none());

    ConflictRepo::resolve(&pool, conflict.id, Resolution::PlatformWins, "ops").await.unwrap();
    assert!(SyncOperationRepo::claim_next(&pool).await.unwrap().is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn retryable_failure_backs_off(pool: PgPool) {
    enqueue_op(&pool, OpType::Update, 11, 5, "flaky").await;
    let op = SyncOperationRepo::claim_next(&pool).await.unwrap().unwrap();

    let failed =
        SyncOperationRepo::fail(&pool, op.id, "timeout", Some(Duration::from_secs(60)))
            .await
            .unwrap();
    assert_eq!(failed.status_id, OperationStatus::Pending.id());
    assert_eq!(failed.attempts, 1);
    assert_eq!(failed.last_error.as_deref(), Some("timeout"));

    // Not due yet; the backoff keeps it out of reach.
    assert!(SyncOperationRepo::claim_next(&pool).await.unwrap().is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn exhausted_attempts_dead_letter_with_one_conflict(pool: PgPool) {
    let op = enqueue_op(&pool, OpType::Update, 13, 5, "doomed").await;
    assert_eq!(op.max_attempts, 3);

    for attempt in 1..=3 {
        let claimed = SyncOperationRepo::claim_next(&pool).await.unwrap().unwrap();
        assert_eq!(claimed.id, op.id);
        let failed =
            SyncOperationRepo::fail(&pool, op.id, "still down", Some(Duration::ZERO))
                .await
                .unwrap();
        assert_eq!(failed.attempts, attempt);
    }

    let dead = SyncOperationRepo::find_by_id(&pool, op.id).await.unwrap().unwrap();
    assert_eq!(dead.status_id, OperationStatus::DeadLetter.id());
    assert!(SyncOperationRepo::claim_next(&pool).await.unwrap().is_none());

    let conflict = ConflictRepo::find_open_for_entity(&pool, EntityKind::Booking, 13)
        .await
        .unwrap()
        .expect("dead letter opens a conflict");
    assert_eq!(conflict.conflict_type, ConflictType::SyncFailure);
    assert_eq!(ConflictRepo::count_open(&pool).await.unwrap(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn non_retryable_failure_dead_letters_immediately(pool: PgPool) {
    let op = enqueue_op(&pool, OpType::Update, 17, 5, "rejected").await;
    SyncOperationRepo::claim_next(&pool).await.unwrap().unwrap();

    let failed = SyncOperationRepo::fail(&pool, op.id, "401 unauthorized", None).await.unwrap();
    assert_eq!(failed.status_id, OperationStatus::DeadLetter.id());
    assert_eq!(failed.attempts, 1);
    assert_eq!(ConflictRepo::count_open(&pool).await.unwrap(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn stale_in_progress_operations_requeue(pool: PgPool) {
    let op = enqueue_op(&pool, OpType::Update, 19, 5, "orphaned").await;
    SyncOperationRepo::claim_next(&pool).await.unwrap().unwrap();

    // stale_after of zero treats every in-flight row as abandoned.
    let requeued =
        SyncOperationRepo::requeue_stale_in_progress(&pool, Duration::ZERO).await.unwrap();
    assert_eq!(requeued, 1);

    let reclaimed = SyncOperationRepo::claim_next(&pool).await.unwrap().unwrap();
    assert_eq!(reclaimed.id, op.id);
}

#[sqlx::test(migrations = "./migrations")]
async fn completed_operations_age_out(pool: PgPool) {
    let op = enqueue_op(&pool, OpType::Update, 23, 5, "done").await;
    SyncOperationRepo::claim_next(&pool).await.unwrap().unwrap();
    SyncOperationRepo::complete(&pool, op.id).await.unwrap();

    // Inside the retention window nothing is touched.
    let deleted =
        SyncOperationRepo::delete_completed_before(&pool, Duration::from_secs(3600)).await.unwrap();
    assert_eq!(deleted, 0);

    let deleted =
        SyncOperationRepo::delete_completed_before(&pool, Duration::ZERO).await.unwrap();
    assert_eq!(deleted, 1);
    assert!(SyncOperationRepo::find_by_id(&pool, op.id).await.unwrap().is_none());
}
