//! Reconnect backoff schedule.

use std::time::Duration;

use serde::Serialize;

/// Outcome of asking the schedule what to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Wait this long, then try again
    Retry(Duration),
    /// Retry budget exhausted
    GiveUp,
}

/// Exponential backoff with plain doubling, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn next_delay(&self, attempt: u32) -> Backoff {
        let attempt = attempt.max(1);
        if attempt > self.max_retries {
            return Backoff::GiveUp;
        }

        // 2^31 * base already overflows any sane cap
        let factor = 1u32 << (attempt - 1).min(31);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay));
        Backoff::Retry(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(3_000),
        }
    }
}
