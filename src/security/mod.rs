//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → edge.rs (preflight, origin allow-list, security headers)
//!     → client_id.rs (caller identifier from forwarding headers)
//!     → rate_limit/ (fixed window per purpose and caller)
//!     → Pass to authentication and route logic
//! ```
//!
//! # Design Decisions
//! - Fail closed: a broken rate-limit store rejects rather than admits
//! - Origin checks apply to the API prefix only; static pages stay public

pub mod client_id;
pub mod edge;
pub mod headers;
pub mod rate_limit;
