//! Retry with capped exponential backoff.

use std::time::Duration;

use crate::Error;

/// How failed query fetches are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay: Duration::from_millis(1000), max_delay: Duration::from_millis(30_000) }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self { max_retries: 0, ..Default::default() }
    }

    /// `min(base * 2^attempt, max)` where `attempt` counts from 0.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Whether a failure on `attempt` (0-based) should be retried.
    pub fn should_retry(&self, attempt: u32, err: &Error) -> bool {
        attempt < self.max_retries && err.is_transient()
    }
}
