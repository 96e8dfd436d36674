//! HTTP surface subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID, request metrics)
//!     → security::edge (origin gate, security headers)
//!     → error.rs (renders any failure below)
//!     → security::rate_limit (per-route purpose)
//!     → extract.rs + auth (validated body, verified caller)
//!     → handlers.rs (document store)
//! ```

pub mod error;
pub mod extract;
pub mod handlers;
pub mod request;
pub mod server;

pub use error::{ApiError, ClassifiedError, ErrorClassifier, FieldIssue};
pub use request::X_REQUEST_ID;
pub use server::{build_router, AppState, HttpServer};
