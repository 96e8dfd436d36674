//! Short-TTL cache of verified identities.
//!
//! Keys are SHA-256 digests of the token, so raw credentials are never held.
//! Only successful verifications are cached; the TTL must stay below the
//! token lifetime issued by the provider.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::auth::identity::{AuthError, TokenVerifier, VerifiedIdentity};

/// Entries beyond this count trigger a purge of expired entries on insert.
const PURGE_THRESHOLD: usize = 10_000;

struct CachedIdentity {
    identity: VerifiedIdentity,
    expires_at: Instant,
}

/// Wraps a verifier and memoizes successful verifications.
pub struct CachingVerifier<V> {
    inner: V,
    ttl: Duration,
    entries: DashMap<String, CachedIdentity>,
}

impl<V: TokenVerifier> CachingVerifier<V> {
    pub fn new(inner: V, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn key(token: &str) -> String {
        format!("{:x}", Sha256::digest(token.as_bytes()))
    }

    fn lookup(&self, key: &str, now: Instant) -> Option<VerifiedIdentity> {
        let hit = self.entries.get(key).map(|entry| {
            if entry.expires_at > now {
                Some(entry.identity.clone())
            } else {
                None
            }
        })?;

        if hit.is_none() {
            self.entries.remove(key);
        }
        hit
    }

    fn store(&self, key: String, identity: VerifiedIdentity, now: Instant) {
        if self.entries.len() >= PURGE_THRESHOLD {
            self.entries.retain(|_, entry| entry.expires_at > now);
        }
        self.entries.insert(
            key,
            CachedIdentity {
                identity,
                expires_at: now + self.ttl,
            },
        );
    }
}

#[async_trait]
impl<V: TokenVerifier> TokenVerifier for CachingVerifier<V> {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let key = Self::key(token);
        if let Some(identity) = self.lookup(&key, Instant::now()) {
            tracing::trace!(uid = %identity.uid, "Identity cache hit");
            return Ok(identity);
        }

        let identity = self.inner.verify(token).await?;
        self.store(key, identity.clone(), Instant::now());
        Ok(identity)
    }
}
