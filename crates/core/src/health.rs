//! Health verdict classification and anti-flapping hysteresis.
//!
//! The monitor loop in `velora-sync` feeds one [`QueueStats`] per sampling
//! tick into [`classify`], then through a [`HysteresisGate`] so the
//! published verdict only flips after N consecutive samples agree. The
//! logic is pure so it can be unit tested without a database or clock.

use serde::Serialize;

/// Aggregated view of one monitoring sample.
#[derive(Debug, Clone, Copy)]
pub struct QueueStats {
    /// Fraction of operations that failed over the trailing window (0..=1).
    pub error_rate: f64,
    /// Operations currently waiting in the queue.
    pub pending_depth: i64,
    /// Age of the oldest pending operation, in seconds.
    pub oldest_pending_age_secs: i64,
    /// Conflicts awaiting manual resolution.
    pub open_conflicts: i64,
}

/// Per-component health verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Thresholds for verdict classification.
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    /// Error rate at or above which the queue is degraded (default 5%).
    pub degraded_error_rate: f64,
    /// Error rate at or above which the queue is unhealthy (default 20%).
    pub unhealthy_error_rate: f64,
    /// Soft limit on pending queue depth.
    pub soft_queue_depth: i64,
    /// Maximum acceptable age of the oldest pending operation.
    pub max_pending_age_secs: i64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            degraded_error_rate: 0.05,
            unhealthy_error_rate: 0.20,
            soft_queue_depth: 100,
            max_pending_age_secs: 600,
        }
    }
}

/// Classify a single sample against the thresholds.
///
/// - `Healthy`: error rate below the degraded threshold and queue age under
///   the limit.
/// - `Degraded`: error rate in the degraded band, or pending depth above
///   the soft limit.
/// - `Unhealthy`: error rate at or above the unhealthy threshold, or the
///   oldest pending operation is older than allowed.
pub fn classify(stats: &QueueStats, t: &HealthThresholds) -> Verdict {
    if stats.error_rate >= t.unhealthy_error_rate
        || stats.oldest_pending_age_secs > t.max_pending_age_secs
    {
        return Verdict::Unhealthy;
    }
    if stats.error_rate >= t.degraded_error_rate || stats.pending_depth > t.soft_queue_depth {
        return Verdict::Degraded;
    }
    Verdict::Healthy
}

/// Requires N consecutive agreeing samples before the published verdict
/// changes, so a single bad (or good) sample never flaps an alert.
#[derive(Debug)]
pub struct HysteresisGate {
    window: u32,
    published: Verdict,
    candidate: Verdict,
    streak: u32,
}

impl HysteresisGate {
    /// A new gate starts out `Healthy` and needs `window` consecutive
    /// samples of any other verdict before publishing it.
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
            published: Verdict::Healthy,
            candidate: Verdict::Healthy,
            streak: 0,
        }
    }

    /// Currently published verdict.
    pub fn published(&self) -> Verdict {
        self.published
    }

    /// Feed one sample verdict. Returns `Some(new_verdict)` exactly when
    /// the published verdict changes.
    pub fn observe(&mut self, verdict: Verdict) -> Option<Verdict> {
        if verdict == self.published {
            self.candidate = verdict;
            self.streak = 0;
            return None;
        }

        if verdict == self.candidate {
            self.streak += 1;
        } else {
            self.candidate = verdict;
            self.streak = 1;
        }

        if self.streak >= self.window {
            self.published = verdict;
            self.streak = 0;
            Some(verdict)
        } else {
            None
        }
    }
}
