mod none;
mod token;
mod traits;
mod types;

pub use none::*;
pub use token::*;
pub use traits::*;
pub use types::*;

use tracing::{debug, warn};

use crate::config::{ApiConfig, AuthConfig};

/// Factory function to create a credential provider from config
pub fn create_credential_provider(
    config: &AuthConfig,
    api: &ApiConfig,
) -> Result<Box<dyn CredentialProvider>, AuthError> {
    use crate::config::AuthMethod;

    match config.method {
        AuthMethod::None => Ok(Box::new(NoneCredentials::new())),
        AuthMethod::Token => {
            if config.access_token.is_none() && config.refresh_token.is_none() {
                return Err(AuthError::ConfigurationError(
                    "access_token or refresh_token must be set when using Token auth method"
                        .to_string(),
                ));
            }

            let credential = config
                .access_token
                .clone()
                .map(|token| Credential::new(token, config.expires_at));
            let provider = TokenCredentials::new(credential, api.timeout_secs)?;

            Ok(match &config.refresh_token {
                Some(refresh_token) => {
                    let url = format!(
                        "{}{}",
                        api.base_url.trim_end_matches('/'),
                        config.refresh_path
                    );
                    Box::new(provider.with_refresh(url, refresh_token.clone()))
                }
                None => Box::new(provider),
            })
        }
    }
}

/// Credential-freshness pre-flight.
///
/// Returns the current credential if it stays valid for at least `margin`;
/// otherwise awaits a refresh. Any refresh failure ends the session.
pub async fn ensure_fresh(
    provider: &dyn CredentialProvider,
    margin: chrono::Duration,
) -> Result<Credential, AuthError> {
    match provider.current().await {
        Some(credential) if !credential.expires_within(margin, chrono::Utc::now()) => {
            return Ok(credential);
        }
        Some(_) => debug!("Credential expires within {}s, refreshing", margin.num_seconds()),
        None => debug!("No credential held, refreshing"),
    }

    match provider.refresh().await {
        Ok(true) => provider.current().await.ok_or(AuthError::SessionExpired),
        Ok(false) => Err(AuthError::SessionExpired),
        Err(e) => {
            warn!("Credential refresh failed: {}", e);
            Err(e)
        }
    }
}
