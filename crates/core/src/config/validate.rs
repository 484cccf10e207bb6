use super::{types::Config, AuthMethod, ConfigError};
use crate::transport::MAX_REFRESH_MARGIN_SECS;

/// Validate configuration
/// Currently validates:
/// - API URLs use http(s) / ws(s) schemes
/// - Token auth has a token to present or refresh
/// - Watchdog ordering: open timeout <= silence timeout
/// - Poll backoff bounds and multipliers
/// - Reconnect delay and keep-alive interval are non-zero
/// - Credential refresh margin is bounded
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let base_url = &config.api.base_url;
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::ValidationError(format!(
            "api.base_url must start with http:// or https:// (got {})",
            base_url
        )));
    }

    if let Some(ws_url) = &config.api.ws_url {
        if !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://")) {
            return Err(ConfigError::ValidationError(format!(
                "api.ws_url must start with ws:// or wss:// (got {})",
                ws_url
            )));
        }
    }

    if matches!(config.auth.method, AuthMethod::Token)
        && config.auth.access_token.is_none()
        && config.auth.refresh_token.is_none()
    {
        return Err(ConfigError::ValidationError(
            "auth.access_token or auth.refresh_token is required for token auth".to_string(),
        ));
    }

    let realtime = &config.transport.realtime;
    if realtime.open_timeout_ms > realtime.silence_timeout_ms {
        return Err(ConfigError::ValidationError(format!(
            "transport.realtime.open_timeout_ms ({}) must not exceed silence_timeout_ms ({})",
            realtime.open_timeout_ms, realtime.silence_timeout_ms
        )));
    }
    if realtime.reconnect_base_delay_ms == 0 {
        return Err(ConfigError::ValidationError(
            "transport.realtime.reconnect_base_delay_ms cannot be 0".to_string(),
        ));
    }

    if realtime.ping_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "transport.realtime.ping_interval_secs cannot be 0".to_string(),
        ));
    }

    if config.transport.credential_refresh_margin_secs > MAX_REFRESH_MARGIN_SECS {
        return Err(ConfigError::ValidationError(format!(
            "transport.credential_refresh_margin_secs ({}) must not exceed {}",
            config.transport.credential_refresh_margin_secs, MAX_REFRESH_MARGIN_SECS
        )));
    }

    let poll = &config.transport.poll;
    if poll.base_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "transport.poll.base_interval_ms cannot be 0".to_string(),
        ));
    }
    if poll.base_interval_ms > poll.max_interval_ms {
        return Err(ConfigError::ValidationError(format!(
            "transport.poll.base_interval_ms ({}) must not exceed max_interval_ms ({})",
            poll.base_interval_ms, poll.max_interval_ms
        )));
    }
    for (name, multiplier) in [
        ("success_multiplier", poll.success_multiplier),
        ("error_multiplier", poll.error_multiplier),
    ] {
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "transport.poll.{} must be a finite number >= 1.0 (got {})",
                name, multiplier
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, AuthConfig};
    use crate::transport::TransportConfig;

    fn valid_config() -> Config {
        Config {
            auth: AuthConfig {
                method: AuthMethod::None,
                access_token: None,
                refresh_token: None,
                expires_at: None,
                refresh_path: "/api/v1/auth/refresh".to_string(),
            },
            api: ApiConfig {
                base_url: "http://localhost:8000".to_string(),
                ws_url: None,
                timeout_secs: 30,
            },
            transport: TransportConfig::default(),
        }
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_bad_base_url() {
        let mut config = valid_config();
        config.api.base_url = "localhost:8000".to_string();
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_bad_ws_url() {
        let mut config = valid_config();
        config.api.ws_url = Some("http://localhost:8000".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_token_without_tokens() {
        let mut config = valid_config();
        config.auth.method = AuthMethod::Token;
        assert!(validate_config(&config).is_err());

        config.auth.refresh_token = Some("refresh".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_open_timeout_exceeds_silence() {
        let mut config = valid_config();
        config.transport.realtime.open_timeout_ms = 5000;
        config.transport.realtime.silence_timeout_ms = 3000;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("open_timeout_ms"));
    }

    #[test]
    fn test_validate_poll_bounds() {
        let mut config = valid_config();
        config.transport.poll.base_interval_ms = 20_000;
        assert!(validate_config(&config).is_err());

        let mut config = valid_config();
        config.transport.poll.base_interval_ms = 0;
        assert!(validate_config(&config).is_err());

        let mut config = valid_config();
        config.transport.poll.error_multiplier = 0.5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_reconnect_delay() {
        let mut config = valid_config();
        config.transport.realtime.reconnect_base_delay_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_non_finite_multipliers() {
        let mut config = valid_config();
        config.transport.poll.success_multiplier = f64::NAN;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("success_multiplier"));

        let mut config = valid_config();
        config.transport.poll.error_multiplier = f64::INFINITY;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_nan_multiplier_from_toml() {
        let toml = r#"
            [auth]
            method = "none"

            [api]
            base_url = "http://localhost:8000"

            [transport.poll]
            success_multiplier = nan
        "#;
        let config = crate::config::load_config_from_str(toml).unwrap();
        assert!(config.transport.poll.success_multiplier.is_nan());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_ping_interval() {
        let mut config = valid_config();
        config.transport.realtime.ping_interval_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("ping_interval_secs"));
    }

    #[test]
    fn test_validate_refresh_margin_bound() {
        let mut config = valid_config();
        config.transport.credential_refresh_margin_secs = MAX_REFRESH_MARGIN_SECS;
        assert!(validate_config(&config).is_ok());

        config.transport.credential_refresh_margin_secs = u64::MAX;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("credential_refresh_margin_secs"));
    }
}
