//! Exponential backoff for batch retries.

use std::time::Duration;

/// Configuration for the backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Maximum number of backoff retries for one batch before falling back
    /// to the poll-interval pause.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Stateless backoff policy: `delay(k) = min(base * 2^k, cap)`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub config: BackoffConfig,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Delay before retry number `attempt` (0-based). Never exceeds `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.config.base_delay.as_millis() as u64;
        let cap_ms = self.config.max_delay.as_millis() as u64;
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(factor).min(cap_ms))
    }

    /// Returns the delay for `attempt` if retries remain, `None` once the
    /// ceiling is reached.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.config.max_retries).then(|| self.delay(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_ms: u64, cap_ms: u64, retries: u32) -> Backoff {
        Backoff::new(BackoffConfig {
            max_retries: retries,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(cap_ms),
        })
    }

    #[test]
    fn doubles_per_attempt() {
        let b = policy(100, 30_000, 5);
        assert_eq!(b.delay(0).as_millis(), 100);
        assert_eq!(b.delay(1).as_millis(), 200);
        assert_eq!(b.delay(2).as_millis(), 400);
        assert_eq!(b.delay(3).as_millis(), 800);
    }

    #[test]
    fn never_exceeds_cap() {
        let b = policy(1_000, 60_000, 5);
        for k in 0..200 {
            let d = b.delay(k);
            let expected = (1_000u128 << k.min(100)).min(60_000);
            assert!(d <= Duration::from_millis(60_000), "k={k} d={d:?}");
            if k < 64 {
                assert_eq!(d.as_millis(), expected);
            }
        }
    }

    #[test]
    fn next_delay_respects_ceiling() {
        let b = policy(100, 1_000, 2);
        assert!(b.next_delay(0).is_some());
        assert!(b.next_delay(1).is_some());
        assert!(b.next_delay(2).is_none());
    }
}
