use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides.
///
/// Environment variables use the `POSEGEN_` prefix and `__` between
/// sections, e.g. `POSEGEN_API__BASE_URL`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("POSEGEN_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
