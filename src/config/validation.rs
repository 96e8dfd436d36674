//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and origin shapes.
//! Every problem is reported, not just the first.

use std::fmt;

use url::Url;

use crate::config::schema::{GateConfig, PolicySet};

/// A single semantic problem in a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    check_origin(&mut errors, "cors.app_url", &config.cors.app_url);
    for (i, origin) in config.cors.allowed_origins.iter().enumerate() {
        check_origin(&mut errors, &format!("cors.allowed_origins[{}]", i), origin);
    }
    if let Some(origin) = &config.cors.production_origin {
        check_origin(&mut errors, "cors.production_origin", origin);
    }
    if !config.cors.api_prefix.starts_with('/') {
        errors.push(ValidationError::new("cors.api_prefix", "must start with '/'"));
    }

    check_policies(&mut errors, "rate_limit.strict", &config.rate_limit.strict);
    check_policies(&mut errors, "rate_limit.relaxed", &config.rate_limit.relaxed);
    if config.rate_limit.cleanup_interval_secs == 0 {
        errors.push(ValidationError::new(
            "rate_limit.cleanup_interval_secs",
            "must be greater than 0",
        ));
    }

    if Url::parse(&config.identity.endpoint).is_err() {
        errors.push(ValidationError::new("identity.endpoint", "must be an absolute URL"));
    }
    if config.identity.timeout_secs == 0 {
        errors.push(ValidationError::new("identity.timeout_secs", "must be greater than 0"));
    }
    if config.environment.is_production() && config.identity.api_key.is_empty() {
        errors.push(ValidationError::new(
            "identity.api_key",
            "required in production",
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_origin(errors: &mut Vec<ValidationError>, field: &str, origin: &str) {
    match Url::parse(origin) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.path() == "/" => {}
        Ok(_) => errors.push(ValidationError::new(
            field,
            format!("'{}' must be a bare http(s) origin", origin),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("'{}': {}", origin, e))),
    }
}

fn check_policies(errors: &mut Vec<ValidationError>, prefix: &str, set: &PolicySet) {
    let entries = [
        ("login", set.login),
        ("registration", set.registration),
        ("api", set.api),
        ("password_reset", set.password_reset),
    ];
    for (name, policy) in entries {
        if policy.window_secs == 0 {
            errors.push(ValidationError::new(
                format!("{}.{}.window_secs", prefix, name),
                "must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{Environment, PolicyConfig};

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GateConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GateConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.cors.allowed_origins.push("https://fest.example/path".into());
        config.rate_limit.strict.api = PolicyConfig::new(10, 0);

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "cors.allowed_origins[1]",
                "rate_limit.strict.api.window_secs",
            ]
        );
    }

    #[test]
    fn test_production_requires_api_key() {
        let mut config = GateConfig::default();
        config.environment = Environment::Production;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "identity.api_key");

        config.identity.api_key = "key".into();
        assert!(validate_config(&config).is_ok());
    }
}
