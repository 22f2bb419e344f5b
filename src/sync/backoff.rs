use std::time::Duration;

/// Capped exponential schedule for re-subscribe attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 500,
            max_ms: 30_000,
            max_attempts: 6,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the given attempt (1-based): base * 2^(attempt-1),
    /// capped at `max_ms`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let millis = self
            .base_ms
            .saturating_mul(1_u64 << exp)
            .min(self.max_ms);
        Duration::from_millis(millis)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_attempts
    }
}
