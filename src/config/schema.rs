//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the festival API gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Deployment mode; toggles limiter strictness, HSTS and error verbosity.
    pub environment: Environment,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Cross-origin allow-list.
    pub cors: CorsConfig,

    /// Security response headers and body limits.
    pub security: SecurityConfig,

    /// Rate limiting presets.
    pub rate_limit: RateLimitConfig,

    /// External identity provider.
    pub identity: IdentityConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl GateConfig {
    /// Rate-limit policies for the configured environment.
    pub fn active_policies(&self) -> &PolicySet {
        match self.environment {
            Environment::Production => &self.rate_limit.strict,
            Environment::Development => &self.rate_limit.relaxed,
        }
    }
}

/// Deployment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" | "local" => Ok(Environment::Development),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => f.write_str("development"),
            Environment::Production => f.write_str("production"),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Origin allow-list configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Base application URL; always allow-listed.
    pub app_url: String,

    /// Additional allowed origins. The first entry of the combined list is the
    /// fallback origin returned to unknown preflight callers.
    pub allowed_origins: Vec<String>,

    /// Origin enabled only in production mode.
    pub production_origin: Option<String>,

    /// Path prefix guarded by origin checks.
    pub api_prefix: String,

    /// Preflight cache lifetime in seconds.
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            app_url: "http://localhost:3000".to_string(),
            allowed_origins: vec!["http://127.0.0.1:3000".to_string()],
            production_origin: None,
            api_prefix: "/api".to_string(),
            max_age_secs: 86_400,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
    /// `max-age` of the Strict-Transport-Security header (production only).
    pub hsts_max_age_secs: u64,
    /// Content-Security-Policy source lists.
    pub csp: CspConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 64 * 1024,
            hsts_max_age_secs: 31_536_000,
            csp: CspConfig::default(),
        }
    }
}

/// Source lists assembled into the Content-Security-Policy header.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CspConfig {
    pub script_src: Vec<String>,
    pub style_src: Vec<String>,
    pub font_src: Vec<String>,
    pub img_src: Vec<String>,
    pub connect_src: Vec<String>,
    pub frame_src: Vec<String>,
}

impl Default for CspConfig {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            script_src: list(&[
                "'self'",
                "'unsafe-inline'",
                "'unsafe-eval'",
                "https://apis.google.com",
                "https://www.gstatic.com",
                "https://*.firebaseapp.com",
            ]),
            style_src: list(&["'self'", "'unsafe-inline'", "https://fonts.googleapis.com"]),
            font_src: list(&["'self'", "data:", "https://fonts.gstatic.com"]),
            img_src: list(&["'self'", "data:", "blob:", "https:"]),
            connect_src: list(&[
                "'self'",
                "https://identitytoolkit.googleapis.com",
                "https://securetoken.googleapis.com",
                "https://*.googleapis.com",
                "https://*.firebaseio.com",
            ]),
            frame_src: list(&["'self'", "https://*.firebaseapp.com", "https://accounts.google.com"]),
        }
    }
}

/// A single limiter policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PolicyConfig {
    /// Requests admitted per window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl PolicyConfig {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self { max_requests, window_secs }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Per-purpose policies.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PolicySet {
    pub login: PolicyConfig,
    pub registration: PolicyConfig,
    pub api: PolicyConfig,
    pub password_reset: PolicyConfig,
}

impl PolicySet {
    /// Tight limits used in production.
    pub fn strict() -> Self {
        Self {
            login: PolicyConfig::new(5, 15 * 60),
            registration: PolicyConfig::new(3, 60 * 60),
            api: PolicyConfig::new(100, 60),
            password_reset: PolicyConfig::new(3, 60 * 60),
        }
    }

    /// Effectively unlimited; eases local exercise of the routes.
    pub fn relaxed() -> Self {
        let open = PolicyConfig::new(10_000, 60);
        Self {
            login: open,
            registration: open,
            api: open,
            password_reset: open,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Policies applied in production.
    pub strict: PolicySet,

    /// Policies applied in development.
    pub relaxed: PolicySet,

    /// Interval between expired-window sweeps, in seconds.
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strict: PolicySet::strict(),
            relaxed: PolicySet::relaxed(),
            cleanup_interval_secs: 300,
        }
    }
}

/// External identity provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Account lookup endpoint.
    pub endpoint: String,

    /// Web API key appended as the `key` query parameter.
    pub api_key: String,

    /// Verification call timeout in seconds.
    pub timeout_secs: u64,

    /// TTL of the verified-identity cache; 0 disables caching.
    pub cache_ttl_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://identitytoolkit.googleapis.com/v1/accounts:lookup".to_string(),
            api_key: String::new(),
            timeout_secs: 5,
            cache_ttl_secs: 0,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!("production".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!(" PROD ".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("dev".parse::<Environment>(), Ok(Environment::Development));
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_active_policies_follow_environment() {
        let mut config = GateConfig::default();
        assert_eq!(config.active_policies(), &PolicySet::relaxed());

        config.environment = Environment::Production;
        assert_eq!(config.active_policies(), &PolicySet::strict());
        assert_eq!(config.active_policies().registration.max_requests, 3);
    }

    #[test]
    fn test_minimal_toml() {
        let config: GateConfig = toml::from_str(
            r#"
            environment = "production"

            [cors]
            app_url = "https://fest.example"
            "#,
        )
        .unwrap();

        assert!(config.environment.is_production());
        assert_eq!(config.cors.app_url, "https://fest.example");
        assert_eq!(config.cors.api_prefix, "/api");
        assert_eq!(config.identity.timeout_secs, 5);
    }
}
