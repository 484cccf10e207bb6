//! Generation-task transport.
//!
//! Submits a job, follows it over the realtime channel, falls back to
//! polling when realtime is slow or broken, and finalizes every generation
//! exactly once.

mod config;
mod orchestrator;
mod types;

pub use config::{PollConfig, RealtimeConfig, TransportConfig, MAX_REFRESH_MARGIN_SECS};
pub use orchestrator::{GenerationTransport, TransportHandle};
pub use types::*;
