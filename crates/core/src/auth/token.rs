//! Bearer token credentials with optional refresh.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{AuthError, Credential, CredentialProvider};

/// Refresh endpoint response.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    /// Rotated refresh token, when the backend issues one.
    #[serde(default)]
    refresh_token: Option<String>,
    /// Lifetime of the new access token in seconds.
    #[serde(default)]
    expires_in: Option<i64>,
}

struct RefreshEndpoint {
    url: String,
    refresh_token: RwLock<String>,
}

/// Credential provider holding a bearer token.
///
/// When a refresh endpoint is configured, `refresh()` exchanges the refresh
/// token for a new access token and stores it (and a rotated refresh token,
/// if returned).
pub struct TokenCredentials {
    client: Client,
    credential: RwLock<Option<Credential>>,
    refresh: Option<RefreshEndpoint>,
}

impl TokenCredentials {
    /// Create a provider holding a fixed credential and no refresh endpoint.
    pub fn new(credential: Option<Credential>, timeout_secs: u32) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(timeout_secs as u64))
            .build()
            .map_err(|e| AuthError::ConfigurationError(e.to_string()))?;

        Ok(Self {
            client,
            credential: RwLock::new(credential),
            refresh: None,
        })
    }

    /// Enable refreshing through `url` with the given refresh token.
    pub fn with_refresh(mut self, url: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        self.refresh = Some(RefreshEndpoint {
            url: url.into(),
            refresh_token: RwLock::new(refresh_token.into()),
        });
        self
    }
}

#[async_trait]
impl CredentialProvider for TokenCredentials {
    async fn current(&self) -> Option<Credential> {
        self.credential.read().await.clone()
    }

    async fn refresh(&self) -> Result<bool, AuthError> {
        let Some(endpoint) = &self.refresh else {
            debug!("No refresh endpoint configured, cannot refresh credential");
            return Ok(false);
        };

        let refresh_token = endpoint.refresh_token.read().await.clone();
        let response = self
            .client
            .post(&endpoint.url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        let status = response.status();
        if matches!(status.as_u16(), 400 | 401 | 403) {
            warn!("Credential refresh rejected with HTTP {}", status);
            *self.credential.write().await = None;
            return Ok(false);
        }
        if !status.is_success() {
            return Err(AuthError::RefreshFailed(format!("HTTP {}", status)));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| AuthError::RefreshFailed(format!("Failed to parse response: {}", e)))?;

        let expires_at = body.expires_in.map(|secs| Utc::now() + Duration::seconds(secs));
        *self.credential.write().await = Some(Credential::new(body.access_token, expires_at));
        if let Some(rotated) = body.refresh_token {
            *endpoint.refresh_token.write().await = rotated;
        }

        debug!("Credential refreshed, expires at {:?}", expires_at);
        Ok(true)
    }

    fn method_name(&self) -> &'static str {
        "token"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token_current() {
        let provider = TokenCredentials::new(Some(Credential::new("abc", None)), 5).unwrap();
        let credential = provider.current().await.unwrap();
        assert_eq!(credential.access_token, "abc");
        assert_eq!(provider.method_name(), "token");
    }

    #[tokio::test]
    async fn test_refresh_without_endpoint_declines() {
        let provider = TokenCredentials::new(Some(Credential::new("abc", None)), 5).unwrap();
        assert!(!provider.refresh().await.unwrap());
        // The held credential is left alone.
        assert!(provider.current().await.is_some());
    }

    #[tokio::test]
    async fn test_refresh_unreachable_endpoint_errors() {
        let provider = TokenCredentials::new(None, 1)
            .unwrap()
            .with_refresh("http://127.0.0.1:9/api/v1/auth/refresh", "refresh-me");
        let result = provider.refresh().await;
        assert!(matches!(result, Err(AuthError::RefreshFailed(_))));
    }
}
