//! Realtime (WebSocket) delivery channel.

mod channel;
mod frame;
mod reconnect;

pub use channel::RealtimeChannel;
pub use frame::{close_code, ClientFrame, ServerFrame};
pub use reconnect::ReconnectBackoff;
