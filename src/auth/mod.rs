//! Caller authentication.
//!
//! # Data Flow
//! ```text
//! Authorization: Bearer <token>
//!     → extractor.rs (AuthenticatedUser)
//!     → [cache.rs] (optional short-TTL memo keyed by token digest)
//!     → provider.rs (account lookup at the identity provider, with timeout)
//!     → VerifiedIdentity handed to the route
//! ```

pub mod cache;
pub mod extractor;
pub mod identity;
pub mod provider;

use std::sync::Arc;
use std::time::Duration;

pub use cache::CachingVerifier;
pub use extractor::{bearer_token, AuthenticatedUser};
pub use identity::{AuthError, SharedVerifier, TokenVerifier, VerifiedIdentity};
pub use provider::IdentityToolkitVerifier;

use crate::config::IdentityConfig;

/// Build the configured verifier, wrapping it in a cache when a TTL is set.
pub fn verifier_from_config(config: &IdentityConfig) -> Result<SharedVerifier, url::ParseError> {
    let provider = IdentityToolkitVerifier::new(config)?;
    if config.cache_ttl_secs == 0 {
        return Ok(Arc::new(provider));
    }

    tracing::info!(ttl_secs = config.cache_ttl_secs, "Identity cache enabled");
    Ok(Arc::new(CachingVerifier::new(
        provider,
        Duration::from_secs(config.cache_ttl_secs),
    )))
}
