use std::time::Duration;

pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(2);
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Exponential retry schedule for webhook delivery.
///
/// A policy with `retry_count = n` allows `n + 1` attempts in total. The wait
/// before retry `i` (1-indexed) is `base * 2^(i-1)`, so the default policy
/// waits 2s, 4s and 8s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub retry_count: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { base: DEFAULT_BACKOFF_BASE, retry_count: DEFAULT_RETRY_COUNT }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, retry_count: u32) -> Self {
        Self { base, retry_count }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    /// Wait before retry `retry` (1-indexed). Saturates instead of overflowing.
    pub fn interval(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base.saturating_mul(1u32 << exponent)
    }

    pub fn intervals(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.retry_count).map(move |retry| self.interval(retry))
    }
}
