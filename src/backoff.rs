//! Exponential backoff between attempts.

use std::time::Duration;

/// Maps a failed attempt number to how long to wait before the next one.
///
/// `delay(attempt) = unit * base^attempt`, so the default policy waits 2s after the first
/// failure, 4s after the second, and so on. The policy holds no state: the same attempt number
/// always gives the same delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: u32,
    unit: Duration,
    max_delay: Option<Duration>,
}

impl BackoffPolicy {
    pub fn new(base: u32, unit: Duration) -> Self {
        Self {
            base,
            unit,
            max_delay: None,
        }
    }

    /// Cap every delay at `max_delay`.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Delay after failed attempt `attempt` (1-based). Saturates instead of overflowing.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.base).saturating_pow(attempt);
        let nanos = self.unit.as_nanos().saturating_mul(u128::from(factor));
        let delay = u64::try_from(nanos)
            .map(Duration::from_nanos)
            .unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// The waits a request that fails every one of `max_attempts` attempts goes through.
    ///
    /// There is one fewer wait than attempts: nothing is waited for before the first attempt or
    /// after the last.
    pub fn schedule(&self, max_attempts: u32) -> Vec<Duration> {
        (1..max_attempts).map(|attempt| self.delay(attempt)).collect()
    }

    /// Total time spent waiting by a request that fails every attempt.
    pub fn total_delay(&self, max_attempts: u32) -> Duration {
        self.schedule(max_attempts)
            .into_iter()
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(1))
    }
}
