//! Linear reconnect backoff with a cap and a bounded attempt count

use std::time::Duration;

/// Reconnect pacing: the delay before attempt `n` is `min(n × base, max)`,
/// and at most `max_attempts` consecutive attempts are made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectBackoff {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl ReconnectBackoff {
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max,
            max_attempts,
        }
    }

    /// Delay to wait before the given 1-based attempt, or `None` once the
    /// attempt budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.base.saturating_mul(attempt).min(self.max))
    }

    pub fn is_exhausted(&self, failed_attempts: u32) -> bool {
        failed_attempts >= self.max_attempts
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(
            crate::constants::DEFAULT_RECONNECT_BASE_DELAY,
            crate::constants::DEFAULT_RECONNECT_MAX_DELAY,
            crate::constants::DEFAULT_MAX_RECONNECT_ATTEMPTS,
        )
    }
}
