//! Realtime wire envelopes.

use serde::{Deserialize, Serialize};

use crate::task::Snapshot;

/// Frame sent by the server on a realtime connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Status update for the connected task.
    ProgressUpdate(Snapshot),
    /// Keep-alive answer.
    Pong,
    /// Any frame type this client does not know.
    #[serde(other)]
    Unknown,
}

impl ServerFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Frame sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Ping,
}

/// WebSocket close codes with a meaning for the transport.
pub mod close_code {
    /// Intentional shutdown; nothing to recover.
    pub const NORMAL: u16 = 1000;
    /// Server rejected the connection (bad or expired credential).
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Application code: task unknown to the server.
    pub const TASK_NOT_FOUND: u16 = 4004;
    /// Application code: credential rejected.
    pub const UNAUTHORIZED: u16 = 4001;
    /// Application code: task belongs to another user.
    pub const FORBIDDEN: u16 = 4003;

    /// Closures that state the task can never be observed on this channel.
    pub fn is_authoritative(code: u16) -> bool {
        matches!(code, POLICY_VIOLATION | UNAUTHORIZED | FORBIDDEN | TASK_NOT_FOUND)
    }
}
