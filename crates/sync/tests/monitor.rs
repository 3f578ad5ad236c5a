//! Health sampling against a real database.

mod support;

use sqlx::PgPool;
use velora_core::health::{classify, Verdict};
use velora_db::repositories::HealthRepo;
use velora_sync::Monitor;

use support::test_config;

#[sqlx::test(migrations = "../db/migrations")]
async fn sampling_an_idle_queue_is_healthy(pool: PgPool) {
    let config = test_config();
    let monitor = Monitor::new(pool.clone(), config.clone());

    let stats = monitor.sample().await.unwrap();
    assert_eq!(stats.error_rate, 0.0);
    assert_eq!(stats.pending_depth, 0);
    assert_eq!(stats.open_conflicts, 0);
    assert_eq!(classify(&stats, &config.thresholds), Verdict::Healthy);

    let sample = HealthRepo::latest(&pool).await.unwrap().expect("sample persisted");
    assert_eq!(sample.pending_ops, 0);
    assert_eq!(sample.error_rate, 0.0);
}
