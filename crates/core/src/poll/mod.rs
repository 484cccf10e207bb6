//! HTTP status polling channel.

mod backoff;
mod channel;

pub use backoff::PollBackoff;
pub use channel::PollChannel;
