//! Exponential backoff with jitter for sync operation retries.

use std::time::Duration;

use rand::Rng;

/// Deterministic part of the retry delay: `base * 2^attempts`, capped.
///
/// The exponent is clamped so the multiplication cannot overflow even with
/// absurd attempt counts.
pub fn backoff_delay(attempts: u32, base: Duration, cap: Duration) -> Duration {
    let exp = attempts.min(16);
    let multiplier = 2u64.saturating_pow(exp);
    let delay_ms = base.as_millis() as u64;
    Duration::from_millis(delay_ms.saturating_mul(multiplier)).min(cap)
}

/// Retry delay with up to 25% additive jitter, capped.
///
/// Jitter keeps a burst of operations that failed together from retrying
/// in lockstep against a recovering upstream.
pub fn backoff_with_jitter(attempts: u32, base: Duration, cap: Duration) -> Duration {
    let delay = backoff_delay(attempts, base, cap);
    let jitter_bound = delay.as_millis() as u64 / 4;
    let jitter = if jitter_bound > 0 {
        rand::rng().random_range(0..=jitter_bound)
    } else {
        0
    };
    (delay + Duration::from_millis(jitter)).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_secs(1);
    const CAP: Duration = Duration::from_secs(300);

    #[test]
    fn delay_doubles_per_attempt() {
        assert_eq!(backoff_delay(0, BASE, CAP), Duration::from_secs(1));
        assert_eq!(backoff_delay(1, BASE, CAP), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, BASE, CAP), Duration::from_secs(4));
        assert_eq!(backoff_delay(3, BASE, CAP), Duration::from_secs(8));
    }

    #[test]
    fn delay_is_capped() {
        assert_eq!(backoff_delay(30, BASE, CAP), CAP);
    }

    #[test]
    fn huge_attempt_counts_do_not_overflow() {
        assert_eq!(backoff_delay(u32::MAX, BASE, CAP), CAP);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..100 {
            let delay = backoff_with_jitter(2, BASE, CAP);
            // 4s deterministic, at most +25%.
            assert!(delay >= Duration::from_secs(4));
            assert!(delay <= Duration::from_secs(5));
        }
    }

    #[test]
    fn jittered_delay_never_exceeds_cap() {
        for _ in 0..100 {
            assert!(backoff_with_jitter(20, BASE, CAP) <= CAP);
        }
    }
}
