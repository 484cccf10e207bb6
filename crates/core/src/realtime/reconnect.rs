//! Reconnect schedule for the realtime channel.

use std::time::Duration;

use crate::transport::RealtimeConfig;

/// Doubling reconnect delay with a bounded number of attempts.
///
/// The n-th reconnect (counting from zero) waits `base * 2^n`. Once
/// `max_attempts` reconnects have been scheduled without an open connection
/// in between, the schedule is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectBackoff {
    base: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(config: &RealtimeConfig) -> Self {
        Self {
            base: config.reconnect_base_delay(),
            max_attempts: config.max_reconnect_attempts,
            attempt: 0,
        }
    }

    /// Delay before the next reconnect, or `None` when attempts are used up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let delay = self.base.saturating_mul(2u32.saturating_pow(self.attempt));
        self.attempt += 1;
        Some(delay)
    }

    /// Start over after a connection opened successfully.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Reconnects scheduled since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
