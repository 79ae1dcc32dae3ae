use std::time::Duration;

/// Backoff used by readers that find a write in progress.
///
/// Writes finish in microseconds, so the defaults poll quickly and give up
/// after a few milliseconds rather than blocking a reader.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts before the reader reports `NotReady`.
    pub max_attempts: u32,
    /// First sleep; doubles on each attempt.
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            base_delay: Duration::from_micros(100),
            max_delay: Duration::from_millis(2),
        }
    }
}

impl RetryConfig {
    /// A single attempt with no sleeping.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}
