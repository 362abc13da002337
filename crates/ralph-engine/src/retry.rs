//! Retry policy - exponential backoff with a ceiling
//!
//! Per-iteration transient errors are retried up to `max_retries` times.
//! Rate-limit sleeps go through the same curve but are never counted
//! against the retry budget.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: Duration::from_secs(2),
            cap: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base: Duration, cap: Duration) -> Self {
        Self {
            max_retries,
            base,
            cap,
        }
    }

    /// Delay before attempt `n` (1-based): base * 2^(n-1), capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let delay = self.base.saturating_mul(1u32 << shift);
        delay.min(self.cap)
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts > self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_from_base() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay(1), Duration::from_secs(2));
        assert_eq!(p.delay(2), Duration::from_secs(4));
        assert_eq!(p.delay(3), Duration::from_secs(8));
    }

    #[test]
    fn caps_at_ceiling() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay(6), Duration::from_secs(60));
        assert_eq!(p.delay(30), Duration::from_secs(60));
    }

    #[test]
    fn exhaustion_boundary() {
        let p = RetryPolicy::default();
        assert!(!p.exhausted(3));
        assert!(p.exhausted(4));
    }

    #[test]
    fn zero_attempt_is_base() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay(0), Duration::from_secs(2));
    }
}
