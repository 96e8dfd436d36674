//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{Environment, GateConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {message}")]
    Env { var: &'static str, message: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load a TOML file, apply environment overrides, and validate.
pub fn load_config(path: &Path) -> Result<GateConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GateConfig = toml::from_str(&content)?;
    finish(config)
}

/// Build a configuration from defaults plus environment overrides.
pub fn load_from_env() -> Result<GateConfig, ConfigError> {
    finish(GateConfig::default())
}

fn finish(mut config: GateConfig) -> Result<GateConfig, ConfigError> {
    apply_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply overrides from a variable lookup (the process environment in
/// production, a map in tests).
pub fn apply_overrides<F>(config: &mut GateConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = lookup("FESTIVAL_ENV").or_else(|| lookup("APP_ENV"));
    if let Some(value) = env {
        config.environment = value
            .parse::<Environment>()
            .map_err(|message| ConfigError::Env { var: "FESTIVAL_ENV", message })?;
    }

    if let Some(url) = lookup("APP_URL") {
        config.cors.app_url = url.trim_end_matches('/').to_string();
    }

    if let Some(list) = lookup("ALLOWED_ORIGINS") {
        for origin in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let origin = origin.trim_end_matches('/').to_string();
            if !config.cors.allowed_origins.contains(&origin) {
                config.cors.allowed_origins.push(origin);
            }
        }
    }

    if let Some(key) = lookup("IDENTITY_API_KEY") {
        config.identity.api_key = key;
    }

    if let Some(endpoint) = lookup("IDENTITY_ENDPOINT") {
        config.identity.endpoint = endpoint;
    }

    if let Some(addr) = lookup("BIND_ADDRESS") {
        config.listener.bind_address = addr;
    }

    Ok(())
}
