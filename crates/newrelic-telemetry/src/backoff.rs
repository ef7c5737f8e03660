//! Exponential backoff between resend attempts.

use crate::config::BackoffConfig;
use std::time::Duration;

/// Tracks retries of one batch and computes the wait before each.
///
/// The first wait is zero. Later waits double from `factor`, capped at
/// `max`, until `max_retries` attempts have been made.
#[derive(Debug, Clone)]
pub struct Backoff {
    factor: Duration,
    max: Duration,
    max_retries: u32,
    attempts: u32,
}

impl Backoff {
    /// Creates a backoff with no attempts recorded.
    pub fn new(factor: Duration, max: Duration, max_retries: u32) -> Self {
        Self {
            factor,
            max,
            max_retries,
            attempts: 0,
        }
    }

    /// Creates a backoff from configuration.
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.factor, config.max, config.max_retries)
    }

    /// Records an attempt and returns how long to wait before it, or `None`
    /// once retries are exhausted.
    pub fn next_wait(&mut self) -> Option<Duration> {
        let n = self.attempts;
        self.attempts = self.attempts.saturating_add(1);

        if n == 0 {
            return Some(Duration::ZERO);
        }
        if n >= self.max_retries {
            return None;
        }

        let multiplier = 1u32.checked_shl(n - 1).unwrap_or(u32::MAX);
        Some(self.factor.saturating_mul(multiplier).min(self.max))
    }

    /// Records an attempt whose wait was chosen elsewhere, such as a
    /// collector's `Retry-After`. Returns false once retries are exhausted.
    pub fn record_attempt(&mut self) -> bool {
        let n = self.attempts;
        self.attempts = self.attempts.saturating_add(1);
        n == 0 || n < self.max_retries
    }

    /// Number of waits handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}
