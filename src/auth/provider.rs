//! Identity provider client.
//!
//! Looks tokens up with a single POST to the provider's account-lookup
//! endpoint. Every call is bounded by the configured timeout; a timeout is a
//! verification failure, never retried.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use url::Url;

use crate::auth::identity::{AuthError, TokenVerifier, VerifiedIdentity};
use crate::config::IdentityConfig;
use crate::observability::metrics;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
    error: Option<ProviderError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    message: String,
}

/// Verifier backed by the identity provider's REST lookup endpoint.
#[derive(Clone)]
pub struct IdentityToolkitVerifier {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl IdentityToolkitVerifier {
    /// Create a verifier from configuration. The API key, when set, is sent as
    /// the `key` query parameter.
    pub fn new(config: &IdentityConfig) -> Result<Self, url::ParseError> {
        let mut endpoint = Url::parse(&config.endpoint)?;
        if !config.api_key.is_empty() {
            endpoint.query_pairs_mut().append_pair("key", &config.api_key);
        }

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn lookup(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&LookupRequest { id_token: token })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::Timeout(self.timeout.as_secs())
                } else {
                    AuthError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let parsed: Option<LookupResponse> = serde_json::from_str(&body).ok();
        match parsed {
            Some(LookupResponse {
                error: Some(error), ..
            }) => Err(classify_provider_code(&error.message)),
            Some(_) if !status.is_success() => Err(AuthError::Transport(format!(
                "identity provider returned {}",
                status
            ))),
            Some(LookupResponse { users, .. }) => users
                .into_iter()
                .next()
                .map(|user| VerifiedIdentity {
                    uid: user.local_id,
                    email: user.email,
                    email_verified: user.email_verified,
                    display_name: user.display_name,
                })
                .ok_or_else(|| AuthError::InvalidToken("no matching user".to_string())),
            None if status.is_success() => Err(AuthError::MalformedResponse(truncate(&body))),
            None => Err(AuthError::Transport(format!(
                "identity provider returned {}",
                status
            ))),
        }
    }
}

#[async_trait]
impl TokenVerifier for IdentityToolkitVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            metrics::record_verification("missing");
            return Err(AuthError::MissingToken);
        }

        let result = match timeout(self.timeout, self.lookup(token)).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::Timeout(self.timeout.as_secs())),
        };

        match &result {
            Ok(identity) => {
                metrics::record_verification("verified");
                tracing::debug!(uid = %identity.uid, "Token verified");
            }
            Err(e @ (AuthError::InvalidToken(_) | AuthError::Provider { .. })) => {
                metrics::record_verification("rejected");
                tracing::debug!(error = %e, "Token rejected by identity provider");
            }
            Err(e) => {
                metrics::record_verification("failed");
                tracing::warn!(error = %e, "Token verification failed");
            }
        }

        result
    }
}

impl std::fmt::Debug for IdentityToolkitVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The endpoint carries the API key; only the host is printed.
        f.debug_struct("IdentityToolkitVerifier")
            .field("host", &self.endpoint.host_str())
            .field("timeout_secs", &self.timeout.as_secs())
            .finish()
    }
}

/// Map a provider error message (e.g. `"TOKEN_EXPIRED"` or
/// `"INVALID_ID_TOKEN : details"`) to an auth error.
fn classify_provider_code(message: &str) -> AuthError {
    let code = message
        .split(|c: char| c == ':' || c.is_whitespace())
        .find(|part| !part.is_empty())
        .unwrap_or("UNKNOWN")
        .to_string();

    if code == "INVALID_ID_TOKEN" {
        AuthError::InvalidToken(code)
    } else {
        AuthError::Provider { code }
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_provider_code() {
        assert_eq!(
            classify_provider_code("INVALID_ID_TOKEN"),
            AuthError::InvalidToken("INVALID_ID_TOKEN".into())
        );
        assert_eq!(
            classify_provider_code("INVALID_ID_TOKEN : The token is malformed"),
            AuthError::InvalidToken("INVALID_ID_TOKEN".into())
        );
        assert_eq!(
            classify_provider_code("TOKEN_EXPIRED"),
            AuthError::Provider { code: "TOKEN_EXPIRED".into() }
        );
        assert_eq!(
            classify_provider_code(""),
            AuthError::Provider { code: "UNKNOWN".into() }
        );
    }

    #[test]
    fn test_api_key_appended_to_endpoint() {
        let config = IdentityConfig {
            api_key: "abc".into(),
            ..IdentityConfig::default()
        };
        let verifier = IdentityToolkitVerifier::new(&config).unwrap();
        assert_eq!(verifier.endpoint.query(), Some("key=abc"));
        assert!(!format!("{:?}", verifier).contains("abc"));
    }

    #[tokio::test]
    async fn test_empty_token_fails_without_network() {
        // Unroutable endpoint: any network attempt would surface as Transport.
        let config = IdentityConfig {
            endpoint: "http://192.0.2.1:9/lookup".into(),
            timeout_secs: 1,
            ..IdentityConfig::default()
        };
        let verifier = IdentityToolkitVerifier::new(&config).unwrap();
        assert_eq!(verifier.verify("").await, Err(AuthError::MissingToken));
        assert_eq!(verifier.verify("   ").await, Err(AuthError::MissingToken));
    }
}
