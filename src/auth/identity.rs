//! Verified identities and verification errors.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity confirmed by the identity provider for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedIdentity {
    pub uid: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub display_name: Option<String>,
}

/// Errors that can occur while verifying a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No token was presented.
    #[error("missing bearer token")]
    MissingToken,

    /// Provider reported the token invalid or matched no account.
    #[error("invalid identity token: {0}")]
    InvalidToken(String),

    /// Provider rejected the token with another error code.
    #[error("identity provider rejected token: {code}")]
    Provider { code: String },

    /// Provider could not be reached or answered with an unexpected status.
    #[error("identity provider unreachable: {0}")]
    Transport(String),

    /// Provider did not answer within the deadline.
    #[error("identity provider timed out after {0} seconds")]
    Timeout(u64),

    /// Provider answered with a body we could not decode.
    #[error("malformed identity provider response: {0}")]
    MalformedResponse(String),
}

impl AuthError {
    /// Stable machine-readable code surfaced to clients.
    pub fn code(&self) -> &str {
        match self {
            AuthError::MissingToken => "MISSING_TOKEN",
            AuthError::InvalidToken(_) => "INVALID_ID_TOKEN",
            AuthError::Provider { code } => code,
            AuthError::Transport(_) | AuthError::Timeout(_) | AuthError::MalformedResponse(_) => {
                "VERIFICATION_FAILED"
            }
        }
    }
}

/// Exchanges a bearer credential for a verified identity.
///
/// Implementations never retry: a bad credential must fail fast, and the
/// caller decides whether a transport failure is worth another attempt.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError>;
}

/// Verifier handle stored in application state.
pub type SharedVerifier = Arc<dyn TokenVerifier>;

#[async_trait]
impl<T: TokenVerifier + ?Sized> TokenVerifier for Arc<T> {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        (**self).verify(token).await
    }
}
