//! Reconnect backoff

use std::time::Duration;

use chat_common::ReconnectConfig;

/// Exponential backoff with a cap and an attempt limit.
///
/// Delays double from `initial_delay` up to `max_delay`. After
/// `max_attempts` consecutive failures no further delay is handed out.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            initial: config.initial_delay,
            max: config.max_delay,
            max_attempts: config.max_attempts,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the limit is reached
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(self.attempt);
        let delay = self.initial.saturating_mul(factor).min(self.max);
        self.attempt += 1;
        Some(delay)
    }

    /// Attempts handed out since the last reset
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Start over after a successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
