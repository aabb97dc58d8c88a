//! Settlement polling schedule.

use std::time::Duration;

/// Bounded exponential backoff for settlement checks.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the first settlement check.
    pub initial_delay: Duration,
    /// Maximum delay between checks.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each unsettled check.
    pub multiplier: f64,
    /// Overall time budget for one invoice.
    pub max_wait: Duration,
    /// Maximum number of checks (None = bounded by `max_wait` only).
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(15),
            multiplier: 1.5,
            max_wait: Duration::from_secs(30 * 60),
            max_attempts: None,
        }
    }
}

impl PollPolicy {
    /// Fixed-interval schedule, mostly useful in tests.
    pub const fn fixed(interval: Duration, max_wait: Duration) -> Self {
        Self {
            initial_delay: interval,
            max_delay: interval,
            multiplier: 1.0,
            max_wait,
            max_attempts: None,
        }
    }

    /// Calculate the delay before a given check (0-indexed).
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Whether another check may start after `elapsed` time and `attempt` checks.
    pub fn should_continue(&self, attempt: u32, elapsed: Duration) -> bool {
        if elapsed >= self.max_wait {
            return false;
        }
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }
}
