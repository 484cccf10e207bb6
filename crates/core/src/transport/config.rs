//! Transport configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the generation transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Refresh the credential before opening a realtime connection when it
    /// expires within this many seconds.
    #[serde(default = "default_refresh_margin")]
    pub credential_refresh_margin_secs: u64,
}

/// Upper bound for `credential_refresh_margin_secs` (one day).
pub const MAX_REFRESH_MARGIN_SECS: u64 = 86_400;

impl TransportConfig {
    /// Refresh margin, clamped to [`MAX_REFRESH_MARGIN_SECS`].
    pub fn credential_refresh_margin(&self) -> chrono::Duration {
        let secs = self.credential_refresh_margin_secs.min(MAX_REFRESH_MARGIN_SECS);
        chrono::Duration::seconds(secs as i64)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            realtime: RealtimeConfig::default(),
            credential_refresh_margin_secs: default_refresh_margin(),
        }
    }
}

fn default_refresh_margin() -> u64 {
    60
}

/// Poll channel cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay after the first (immediate) poll (milliseconds).
    #[serde(default = "default_poll_base")]
    pub base_interval_ms: u64,

    /// Upper bound for the poll delay (milliseconds).
    #[serde(default = "default_poll_max")]
    pub max_interval_ms: u64,

    /// Growth factor after a successful, non-terminal poll.
    #[serde(default = "default_success_multiplier")]
    pub success_multiplier: f64,

    /// Growth factor after a transient poll error.
    #[serde(default = "default_error_multiplier")]
    pub error_multiplier: f64,
}

impl PollConfig {
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

fn default_poll_base() -> u64 {
    2000 // 2 seconds
}

fn default_poll_max() -> u64 {
    15000 // 15 seconds
}

fn default_success_multiplier() -> f64 {
    1.2
}

fn default_error_multiplier() -> f64 {
    1.5
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: default_poll_base(),
            max_interval_ms: default_poll_max(),
            success_multiplier: default_success_multiplier(),
            error_multiplier: default_error_multiplier(),
        }
    }
}

/// Realtime channel timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Fall back to polling if the connection has not opened by then
    /// (milliseconds). Must not exceed `silence_timeout_ms`.
    #[serde(default = "default_open_timeout")]
    pub open_timeout_ms: u64,

    /// Fall back to polling if no progress frame arrives this long after
    /// the connection opened (milliseconds).
    #[serde(default = "default_silence_timeout")]
    pub silence_timeout_ms: u64,

    /// First reconnect delay; doubles with every attempt (milliseconds).
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_base_delay_ms: u64,

    /// Reconnect attempts before giving up on the realtime channel.
    #[serde(default = "default_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Keep-alive ping interval on an open connection (seconds).
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
}

impl RealtimeConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms)
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

fn default_open_timeout() -> u64 {
    2500
}

fn default_silence_timeout() -> u64 {
    3500
}

fn default_reconnect_delay() -> u64 {
    1000
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_ping_interval() -> u64 {
    25
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            open_timeout_ms: default_open_timeout(),
            silence_timeout_ms: default_silence_timeout(),
            reconnect_base_delay_ms: default_reconnect_delay(),
            max_reconnect_attempts: default_reconnect_attempts(),
            ping_interval_secs: default_ping_interval(),
        }
    }
}
