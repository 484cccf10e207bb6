use async_trait::async_trait;

use super::{AuthError, Credential, CredentialProvider};

/// Provider for backends running without authentication.
/// Must be explicitly configured - the system won't default to this
pub struct NoneCredentials;

impl NoneCredentials {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoneCredentials {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for NoneCredentials {
    async fn current(&self) -> Option<Credential> {
        Some(Credential::anonymous())
    }

    async fn refresh(&self) -> Result<bool, AuthError> {
        Ok(true)
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_none_credentials_are_anonymous() {
        let provider = NoneCredentials::new();
        let credential = provider.current().await.unwrap();
        assert!(credential.is_anonymous());
        assert!(credential.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_none_refresh_always_succeeds() {
        let provider = NoneCredentials::default();
        assert!(provider.refresh().await.unwrap());
        assert_eq!(provider.method_name(), "none");
    }
}
