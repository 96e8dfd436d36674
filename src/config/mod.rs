//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or defaults
//!     → loader.rs (parse, apply environment overrides)
//!     → validation.rs (semantic checks)
//!     → GateConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; origins and policies are fixed at startup
//! - All fields have defaults to allow minimal configs
//! - Environment mode is resolved here; components receive concrete values

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_from_env, ConfigError};
pub use schema::{
    CorsConfig, CspConfig, Environment, GateConfig, IdentityConfig, ListenerConfig,
    ObservabilityConfig, PolicyConfig, PolicySet, RateLimitConfig, SecurityConfig,
};
