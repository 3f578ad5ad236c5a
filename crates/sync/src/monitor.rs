//! Queue health sampling and alert evaluation.
//!
//! Each tick captures one [`HealthSample`], classifies it against the
//! thresholds, and feeds the verdict through a [`HysteresisGate`]; alerts
//! only move when the published verdict moves. A warning that lingers past
//! the escalation window becomes critical even without crossing the
//! unhealthy thresholds.
//!
//! [`HealthSample`]: velora_db::models::monitoring::HealthSample

use chrono::Utc;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use velora_core::entity::AlertSeverity;
use velora_core::health::{classify, HysteresisGate, QueueStats, Verdict};
use velora_core::types::Timestamp;
use velora_db::models::monitoring::NewHealthSample;
use velora_db::repositories::{AlertRepo, ConflictRepo, HealthRepo, SyncOperationRepo};

use crate::config::SyncConfig;

/// Alert rule covering overall queue health.
pub const QUEUE_HEALTH_RULE: &str = "queue_health";

/// Health sampler and alert evaluator.
pub struct Monitor {
    pool: PgPool,
    config: SyncConfig,
}

impl Monitor {
    pub fn new(pool: PgPool, config: SyncConfig) -> Self {
        Self { pool, config }
    }

    /// Capture one sample: queue counts, trailing-window error rate and
    /// push latency, open conflict count. Persists it and returns the
    /// aggregate view used for classification.
    pub async fn sample(&self) -> Result<QueueStats, sqlx::Error> {
        let counts = SyncOperationRepo::counts_by_status(&self.pool).await?;
        let oldest = SyncOperationRepo::oldest_pending_age_secs(&self.pool).await?;
        let (succeeded, failures, avg_latency_ms) =
            SyncOperationRepo::window_stats(&self.pool, self.config.stats_window).await?;
        let open_conflicts = ConflictRepo::count_open(&self.pool).await?;

        let total = succeeded + failures;
        let error_rate = if total > 0 { failures as f64 / total as f64 } else { 0.0 };

        HealthRepo::insert(
            &self.pool,
            &NewHealthSample {
                pending_ops: counts.pending,
                in_progress_ops: counts.in_progress,
                failed_ops: counts.failed,
                dead_letter_ops: counts.dead_letter,
                oldest_pending_age_secs: oldest,
                error_rate,
                avg_push_latency_ms: avg_latency_ms,
                open_conflicts,
            },
        )
        .await?;

        Ok(QueueStats {
            error_rate,
            pending_depth: counts.pending,
            oldest_pending_age_secs: oldest,
            open_conflicts,
        })
    }

    /// Run the sampler loop until `cancel` is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut gate = HysteresisGate::new(self.config.hysteresis_samples);
        let mut degraded_since: Option<Timestamp> = None;
        let mut ticker = tokio::time::interval(self.config.sample_interval);
        tracing::info!(
            interval_secs = self.config.sample_interval.as_secs(),
            hysteresis_samples = self.config.hysteresis_samples,
            "Health monitor started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Health monitor stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let stats = match self.sample().await {
                        Ok(stats) => stats,
                        Err(e) => {
                            tracing::error!(error = %e, "Health sampling failed");
                            continue;
                        }
                    };
                    let verdict = classify(&stats, &self.config.thresholds);
                    if let Err(e) = self
                        .evaluate(&mut gate, &mut degraded_since, verdict, &stats)
                        .await
                    {
                        tracing::error!(error = %e, "Alert evaluation failed");
                    }
                }
            }
        }
    }

    async fn evaluate(
        &self,
        gate: &mut HysteresisGate,
        degraded_since: &mut Option<Timestamp>,
        verdict: Verdict,
        stats: &QueueStats,
    ) -> Result<(), sqlx::Error> {
        if let Some(changed) = gate.observe(verdict) {
            match changed {
                Verdict::Healthy => {
                    *degraded_since = None;
                    let resolved = AlertRepo::resolve_rule(&self.pool, QUEUE_HEALTH_RULE).await?;
                    if resolved > 0 {
                        tracing::info!("Queue health recovered; alerts resolved");
                    }
                }
                Verdict::Degraded => {
                    degraded_since.get_or_insert_with(Utc::now);
                    AlertRepo::raise(
                        &self.pool,
                        QUEUE_HEALTH_RULE,
                        AlertSeverity::Warning,
                        &describe(stats),
                    )
                    .await?;
                }
                Verdict::Unhealthy => {
                    degraded_since.get_or_insert_with(Utc::now);
                    AlertRepo::raise(
                        &self.pool,
                        QUEUE_HEALTH_RULE,
                        AlertSeverity::Critical,
                        &describe(stats),
                    )
                    .await?;
                }
            }
            return Ok(());
        }

        if gate.published() == Verdict::Degraded {
            if let Some(since) = *degraded_since {
                let elapsed = Utc::now() - since;
                if elapsed.to_std().map(|d| d >= self.config.escalation_after).unwrap_or(false) {
                    AlertRepo::raise(
                        &self.pool,
                        QUEUE_HEALTH_RULE,
                        AlertSeverity::Critical,
                        &format!("degraded for {}s: {}", elapsed.num_seconds(), describe(stats)),
                    )
                    .await?;
                }
            }
        }
        Ok(())
    }
}

fn describe(stats: &QueueStats) -> String {
    format!(
        "error_rate={:.3} pending={} oldest_age={}s open_conflicts={}",
        stats.error_rate, stats.pending_depth, stats.oldest_pending_age_secs, stats.open_conflicts
    )
}
