//! Generation-task transport for the pose studio.
//!
//! Submits AI image generation jobs and follows them to a terminal outcome
//! over a realtime WebSocket channel, falling back to HTTP polling when the
//! realtime channel is slow or broken.

pub mod auth;
pub mod client;
pub mod config;
pub mod metrics;
pub mod poll;
pub mod realtime;
pub mod task;
pub mod testing;
pub mod transport;

pub use auth::{
    create_credential_provider, ensure_fresh, AuthError, Credential, CredentialProvider,
    NoneCredentials, TokenCredentials,
};
pub use client::{
    GenerationRequest, HttpGenerationApi, JobSubmitter, RealtimeConnector, SchemaImage,
    StatusError, StatusSource, SubmitError, WsConnector,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthMethod, Config, ConfigError,
    SanitizedConfig,
};
pub use task::{apply_snapshot, GenerationTask, Snapshot, TaskStatus};
pub use transport::{
    GenerationOutcome, GenerationTransport, GenerationView, TransportConfig, TransportError,
    TransportHandle, TransportPhase,
};
