use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transport::TransportConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Backend API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Backend base URL (e.g., "http://localhost:8000")
    pub base_url: String,
    /// WebSocket base URL. Derived from `base_url` when unset.
    #[serde(default)]
    pub ws_url: Option<String>,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

impl ApiConfig {
    /// Base URL for realtime connections, without trailing slash.
    pub fn realtime_base_url(&self) -> String {
        if let Some(ws_url) = &self.ws_url {
            return ws_url.trim_end_matches('/').to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        }
    }
}

fn default_timeout() -> u32 {
    30
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Bearer token (required for `token` unless `refresh_token` is set)
    #[serde(default)]
    pub access_token: Option<String>,
    /// Refresh token exchanged at `refresh_path` when the access token expires
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Known expiry of `access_token`
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
}

fn default_refresh_path() -> String {
    "/api/v1/auth/refresh".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    Token,
}

/// Sanitized config for display (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub api: ApiConfig,
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    pub access_token_configured: bool,
    pub refresh_token_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: match config.auth.method {
                    AuthMethod::None => "none".to_string(),
                    AuthMethod::Token => "token".to_string(),
                },
                access_token_configured: config.auth.access_token.is_some(),
                refresh_token_configured: config.auth.refresh_token.is_some(),
                expires_at: config.auth.expires_at,
            },
            api: config.api.clone(),
            transport: config.transport.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_config() {
        let toml = r#"
[auth]
method = "none"

[api]
base_url = "http://localhost:8000"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(config.auth.method, AuthMethod::None));
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.auth.refresh_path, "/api/v1/auth/refresh");
        assert_eq!(config.transport.poll.base_interval_ms, 2000);
        assert_eq!(config.transport.realtime.open_timeout_ms, 2500);
    }

    #[test]
    fn test_deserialize_missing_auth_fails() {
        let toml = r#"
[api]
base_url = "http://localhost:8000"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_token_auth() {
        let toml = r#"
[auth]
method = "token"
access_token = "abc"
refresh_token = "def"
expires_at = "2030-01-01T00:00:00Z"

[api]
base_url = "https://poses.example.com"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(config.auth.method, AuthMethod::Token));
        assert_eq!(config.auth.access_token.as_deref(), Some("abc"));
        assert!(config.auth.expires_at.is_some());
    }

    #[test]
    fn test_realtime_base_url_derived() {
        let api = ApiConfig {
            base_url: "https://poses.example.com/".to_string(),
            ws_url: None,
            timeout_secs: 30,
        };
        assert_eq!(api.realtime_base_url(), "wss://poses.example.com");

        let api = ApiConfig {
            base_url: "http://localhost:8000".to_string(),
            ws_url: None,
            timeout_secs: 30,
        };
        assert_eq!(api.realtime_base_url(), "ws://localhost:8000");
    }

    #[test]
    fn test_realtime_base_url_explicit() {
        let api = ApiConfig {
            base_url: "http://localhost:8000".to_string(),
            ws_url: Some("ws://realtime.local:9000/".to_string()),
            timeout_secs: 30,
        };
        assert_eq!(api.realtime_base_url(), "ws://realtime.local:9000");
    }

    #[test]
    fn test_sanitized_config_hides_tokens() {
        let toml = r#"
[auth]
method = "token"
access_token = "super-secret"

[api]
base_url = "http://localhost:8000"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        assert_eq!(sanitized.auth.method, "token");
        assert!(sanitized.auth.access_token_configured);
        assert!(!sanitized.auth.refresh_token_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("super-secret"));
    }
}
