//! Backend clients for the generation API.
//!
//! The transport only depends on the traits in [`types`]; the HTTP and
//! WebSocket implementations live alongside them.

mod http;
mod types;
mod ws;

pub use http::HttpGenerationApi;
pub use types::*;
pub use ws::WsConnector;

use thiserror::Error;

/// Errors constructing a backend client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}
