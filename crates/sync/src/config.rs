//! Environment-driven configuration for the sync orchestrator.

use std::time::Duration;

use velora_core::health::HealthThresholds;

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Tunables for the background loops and the queue retry policy.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long an acquired hold reserves capacity.
    pub hold_ttl: Duration,
    /// How often the reaper sweeps expired holds.
    pub reap_interval: Duration,
    /// Concurrent queue consumers.
    pub worker_count: usize,
    /// Idle poll interval for each worker.
    pub worker_poll_interval: Duration,
    /// Wall-clock budget for one full sync pass.
    pub full_sync_budget: Duration,
    /// Batch size when enumerating dirty entities.
    pub full_sync_batch: i64,
    /// Window within which identical enqueues deduplicate.
    pub dedupe_window: Duration,
    /// Caller-enforced timeout on every external call.
    pub call_timeout: Duration,
    /// Attempts before an operation dead-letters.
    pub max_attempts: i32,
    /// Base delay for exponential retry backoff.
    pub backoff_base: Duration,
    /// Upper bound on any retry delay.
    pub backoff_cap: Duration,
    /// In-progress operations older than this are returned to pending at
    /// startup (crashed-worker recovery).
    pub stale_requeue_after: Duration,
    /// Price divergence at or under this many cents is not a conflict.
    pub price_tolerance_cents: i32,
    /// How often the monitor samples queue health.
    pub sample_interval: Duration,
    /// Trailing window for error-rate and latency stats.
    pub stats_window: Duration,
    /// Consecutive agreeing samples before the published verdict flips.
    pub hysteresis_samples: u32,
    /// A degraded condition persisting this long escalates to critical.
    pub escalation_after: Duration,
    /// Retention for completed queue operations.
    pub completed_retention: Duration,
    /// Retention for health samples.
    pub sample_retention: Duration,
    /// Verdict classification thresholds.
    pub thresholds: HealthThresholds,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            hold_ttl: Duration::from_secs(300),
            reap_interval: Duration::from_secs(30),
            worker_count: 3,
            worker_poll_interval: Duration::from_millis(1000),
            full_sync_budget: Duration::from_secs(120),
            full_sync_batch: 500,
            dedupe_window: Duration::from_secs(60),
            call_timeout: Duration::from_secs(15),
            max_attempts: 3,
            backoff_base: Duration::from_millis(1000),
            backoff_cap: Duration::from_secs(300),
            stale_requeue_after: Duration::from_secs(600),
            price_tolerance_cents: 1,
            sample_interval: Duration::from_secs(60),
            stats_window: Duration::from_secs(900),
            hysteresis_samples: 3,
            escalation_after: Duration::from_secs(1800),
            completed_retention: Duration::from_secs(86_400),
            sample_retention: Duration::from_secs(604_800),
            thresholds: HealthThresholds::default(),
        }
    }
}

impl SyncConfig {
    /// Read configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            hold_ttl: Duration::from_secs(env_parse("HOLD_TTL_SECS", d.hold_ttl.as_secs())),
            reap_interval: Duration::from_secs(env_parse(
                "HOLD_REAP_INTERVAL_SECS",
                d.reap_interval.as_secs(),
            )),
            worker_count: env_parse("SYNC_WORKER_COUNT", d.worker_count).max(1),
            worker_poll_interval: Duration::from_millis(env_parse(
                "SYNC_POLL_INTERVAL_MS",
                d.worker_poll_interval.as_millis() as u64,
            )),
            full_sync_budget: Duration::from_secs(env_parse(
                "FULL_SYNC_BUDGET_SECS",
                d.full_sync_budget.as_secs(),
            )),
            full_sync_batch: env_parse("FULL_SYNC_BATCH", d.full_sync_batch),
            dedupe_window: Duration::from_secs(env_parse(
                "SYNC_DEDUPE_WINDOW_SECS",
                d.dedupe_window.as_secs(),
            )),
            call_timeout: Duration::from_secs(env_parse(
                "EXTERNAL_CALL_TIMEOUT_SECS",
                d.call_timeout.as_secs(),
            )),
            max_attempts: env_parse("SYNC_MAX_ATTEMPTS", d.max_attempts).max(1),
            backoff_base: Duration::from_millis(env_parse(
                "SYNC_BACKOFF_BASE_MS",
                d.backoff_base.as_millis() as u64,
            )),
            backoff_cap: Duration::from_secs(env_parse(
                "SYNC_BACKOFF_CAP_SECS",
                d.backoff_cap.as_secs(),
            )),
            stale_requeue_after: Duration::from_secs(env_parse(
                "SYNC_STALE_REQUEUE_SECS",
                d.stale_requeue_after.as_secs(),
            )),
            price_tolerance_cents: env_parse(
                "CONFLICT_PRICE_TOLERANCE_CENTS",
                d.price_tolerance_cents,
            ),
            sample_interval: Duration::from_secs(env_parse(
                "MONITOR_SAMPLE_INTERVAL_SECS",
                d.sample_interval.as_secs(),
            )),
            stats_window: Duration::from_secs(env_parse(
                "MONITOR_STATS_WINDOW_SECS",
                d.stats_window.as_secs(),
            )),
            hysteresis_samples: env_parse("MONITOR_HYSTERESIS_SAMPLES", d.hysteresis_samples)
                .max(1),
            escalation_after: Duration::from_secs(env_parse(
                "MONITOR_ESCALATION_SECS",
                d.escalation_after.as_secs(),
            )),
            completed_retention: Duration::from_secs(env_parse(
                "SYNC_COMPLETED_RETENTION_SECS",
                d.completed_retention.as_secs(),
            )),
            sample_retention: Duration::from_secs(env_parse(
                "HEALTH_SAMPLE_RETENTION_SECS",
                d.sample_retention.as_secs(),
            )),
            thresholds: HealthThresholds {
                degraded_error_rate: env_parse(
                    "HEALTH_DEGRADED_ERROR_RATE",
                    d.thresholds.degraded_error_rate,
                ),
                unhealthy_error_rate: env_parse(
                    "HEALTH_UNHEALTHY_ERROR_RATE",
                    d.thresholds.unhealthy_error_rate,
                ),
                soft_queue_depth: env_parse(
                    "HEALTH_SOFT_QUEUE_DEPTH",
                    d.thresholds.soft_queue_depth,
                ),
                max_pending_age_secs: env_parse(
                    "HEALTH_MAX_PENDING_AGE_SECS",
                    d.thresholds.max_pending_age_secs,
                ),
            },
        }
    }
}
