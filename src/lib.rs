//! Request-guarding layer for the festival registration API.

pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod store;

pub use config::schema::GateConfig;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
