//! Mock credential provider for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::auth::{AuthError, Credential, CredentialProvider};

/// Mock implementation of the CredentialProvider trait.
///
/// `refresh` returns the configured result (default `Ok(true)`); on
/// `Ok(true)` the configured replacement credential, if any, becomes current,
/// and on `Ok(false)` the current credential is cleared.
pub struct MockCredentials {
    credential: Arc<RwLock<Option<Credential>>>,
    refresh_result: Arc<RwLock<Result<bool, AuthError>>>,
    refreshed: Arc<RwLock<Option<Credential>>>,
    refresh_count: Arc<RwLock<usize>>,
}

impl MockCredentials {
    fn from_option(credential: Option<Credential>) -> Self {
        Self {
            credential: Arc::new(RwLock::new(credential)),
            refresh_result: Arc::new(RwLock::new(Ok(true))),
            refreshed: Arc::new(RwLock::new(None)),
            refresh_count: Arc::new(RwLock::new(0)),
        }
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self::from_option(Some(credential))
    }

    /// Provider holding no credential at all.
    pub fn empty() -> Self {
        Self::from_option(None)
    }

    /// Configure the next refreshes.
    pub async fn set_refresh_result(
        &self,
        result: Result<bool, AuthError>,
        refreshed: Option<Credential>,
    ) {
        *self.refresh_result.write().await = result;
        *self.refreshed.write().await = refreshed;
    }

    pub async fn refresh_count(&self) -> usize {
        *self.refresh_count.read().await
    }
}

#[async_trait]
impl CredentialProvider for MockCredentials {
    async fn current(&self) -> Option<Credential> {
        self.credential.read().await.clone()
    }

    async fn refresh(&self) -> Result<bool, AuthError> {
        *self.refresh_count.write().await += 1;

        let result = self.refresh_result.read().await.clone();
        match result {
            Ok(true) => {
                if let Some(credential) = self.refreshed.read().await.clone() {
                    *self.credential.write().await = Some(credential);
                }
            }
            Ok(false) => *self.credential.write().await = None,
            Err(_) => {}
        }
        result
    }

    fn method_name(&self) -> &'static str {
        "mock"
    }
}
