use async_trait::async_trait;
use thiserror::Error;

use super::types::Credential;

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Session expired")]
    SessionExpired,

    #[error("Credential refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Source of the credential used for API calls and realtime connections.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// The credential currently held, if any.
    async fn current(&self) -> Option<Credential>;

    /// Obtain a new credential.
    ///
    /// `Ok(false)` means the backend declined the refresh (the session is
    /// over); `Err` means the refresh could not be attempted.
    async fn refresh(&self) -> Result<bool, AuthError>;

    /// Name of this credential method
    fn method_name(&self) -> &'static str;
}
