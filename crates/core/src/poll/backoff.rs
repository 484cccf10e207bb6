//! Adaptive delay between status polls.

use std::time::Duration;

use crate::transport::PollConfig;

/// Multiplicative poll backoff.
///
/// Every `after_*` call returns the delay to wait before the next poll and
/// updates the schedule for the one after it.
#[derive(Debug, Clone, PartialEq)]
pub struct PollBackoff {
    max: Duration,
    success_multiplier: f64,
    error_multiplier: f64,
    current: Duration,
}

impl PollBackoff {
    pub fn new(config: &PollConfig) -> Self {
        Self {
            max: config.max_interval(),
            success_multiplier: config.success_multiplier,
            error_multiplier: config.error_multiplier,
            current: config.base_interval().min(config.max_interval()),
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// The task is still running.
    pub fn after_progress(&mut self) -> Duration {
        self.advance(self.success_multiplier)
    }

    /// A transient error.
    pub fn after_error(&mut self) -> Duration {
        self.advance(self.error_multiplier)
    }

    /// The backend asked to slow down. A retry hint is honored without
    /// growing the schedule; without one this counts as an error.
    pub fn after_rate_limit(&mut self, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.max(self.current),
            None => self.after_error(),
        }
    }

    /// The schedule never shrinks, even for a multiplier below 1 or NaN.
    fn advance(&mut self, multiplier: f64) -> Duration {
        let delay = self.current;
        let next_ms = (self.current.as_millis() as f64 * multiplier).round() as u64;
        self.current = Duration::from_millis(next_ms).max(delay).min(self.max);
        delay
    }
}
