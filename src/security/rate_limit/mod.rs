//! Fixed-window rate limiting, one independent policy per purpose.
//!
//! # Data Flow
//! ```text
//! request
//!     → client_id.rs (caller identifier)
//!     → rate_limit_middleware (purpose bound per route)
//!     → RateLimiter::check_purpose → WindowStore::check_and_increment
//!     → admitted: route runs, X-RateLimit-Remaining attached
//!     → rejected: 429 + Retry-After, route never runs
//! ```
//!
//! Rejection is a normal result, not an error. Only a failing backing store
//! produces an `ApiError` (fail closed).

pub mod clock;
pub mod store;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tokio::sync::broadcast;

use crate::config::{PolicyConfig, PolicySet};
use crate::http::error::ApiError;
use crate::observability::metrics;
use crate::security::client_id::resolve_client_id;

pub use clock::{Clock, MockClock, SystemClock};
pub use store::{MemoryWindowStore, RateDecision, RatePolicy, RateStoreError, RateWindowRecord, WindowStore};

pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// What a limited operation is for. Each purpose has its own windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RatePurpose {
    Login,
    Registration,
    Api,
    PasswordReset,
}

impl RatePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatePurpose::Login => "login",
            RatePurpose::Registration => "registration",
            RatePurpose::Api => "api",
            RatePurpose::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for RatePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policies for every purpose, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatePolicies {
    pub login: RatePolicy,
    pub registration: RatePolicy,
    pub api: RatePolicy,
    pub password_reset: RatePolicy,
}

impl RatePolicies {
    /// Same policy for every purpose.
    pub fn uniform(policy: RatePolicy) -> Self {
        Self {
            login: policy,
            registration: policy,
            api: policy,
            password_reset: policy,
        }
    }

    pub fn get(&self, purpose: RatePurpose) -> RatePolicy {
        match purpose {
            RatePurpose::Login => self.login,
            RatePurpose::Registration => self.registration,
            RatePurpose::Api => self.api,
            RatePurpose::PasswordReset => self.password_reset,
        }
    }
}

impl From<PolicyConfig> for RatePolicy {
    fn from(config: PolicyConfig) -> Self {
        RatePolicy::new(config.max_requests, config.window())
    }
}

impl From<&PolicySet> for RatePolicies {
    fn from(set: &PolicySet) -> Self {
        Self {
            login: set.login.into(),
            registration: set.registration.into(),
            api: set.api.into(),
            password_reset: set.password_reset.into(),
        }
    }
}

/// Limiter service shared by all routes.
#[derive(Debug)]
pub struct RateLimiter {
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
    policies: RatePolicies,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn WindowStore>, clock: Arc<dyn Clock>, policies: RatePolicies) -> Self {
        Self {
            store,
            clock,
            policies,
        }
    }

    /// In-process limiter on the system clock.
    pub fn in_memory(policies: RatePolicies) -> Self {
        Self::new(Arc::new(MemoryWindowStore::new()), Arc::new(SystemClock), policies)
    }

    pub fn policies(&self) -> &RatePolicies {
        &self.policies
    }

    /// Check `identifier` against an explicit policy.
    pub async fn check(
        &self,
        identifier: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<RateDecision, RateStoreError> {
        self.check_key(identifier, identifier, RatePolicy::new(max_requests, window))
            .await
    }

    /// Check `identifier` against the policy configured for `purpose`.
    pub async fn check_purpose(
        &self,
        purpose: RatePurpose,
        identifier: &str,
    ) -> Result<RateDecision, RateStoreError> {
        let key = format!("{}:{}", purpose, identifier);
        self.check_key(&key, identifier, self.policies.get(purpose)).await
    }

    async fn check_key(
        &self,
        key: &str,
        identifier: &str,
        policy: RatePolicy,
    ) -> Result<RateDecision, RateStoreError> {
        let now = self.clock.now_millis();
        if policy.max_requests == 0 {
            return Ok(RateDecision::reject(now, policy));
        }
        self.store
            .check_and_increment(key, identifier, now, policy)
            .await
    }

    /// Drop windows that have closed.
    pub async fn sweep(&self) -> Result<usize, RateStoreError> {
        let removed = self.store.sweep_expired(self.clock.now_millis()).await?;
        metrics::record_rate_windows(self.store.len());
        Ok(removed)
    }

    pub fn tracked_windows(&self) -> usize {
        self.store.len()
    }

    /// Sweep on a fixed cadence until shutdown.
    pub async fn run_sweeper(self: Arc<Self>, every: Duration, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = every.as_secs(), "Rate limit sweeper starting");

        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(removed) => tracing::debug!(
                            removed,
                            live = self.tracked_windows(),
                            "Swept expired rate limit windows"
                        ),
                        Err(e) => tracing::warn!(error = %e, "Rate limit sweep failed"),
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Rate limit sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

/// Per-route middleware state: the shared limiter plus the route's purpose.
#[derive(Clone)]
pub struct RateLimitGuard {
    pub limiter: Arc<RateLimiter>,
    pub purpose: RatePurpose,
}

impl RateLimitGuard {
    pub fn new(limiter: Arc<RateLimiter>, purpose: RatePurpose) -> Self {
        Self { limiter, purpose }
    }
}

/// Middleware function for per-purpose rate limiting.
pub async fn rate_limit_middleware(
    State(guard): State<RateLimitGuard>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = resolve_client_id(request.headers());

    let decision = match guard.limiter.check_purpose(guard.purpose, &client).await {
        Ok(decision) => decision,
        Err(e) => return ApiError::from(e).into_response(),
    };

    if !decision.admitted {
        tracing::warn!(client = %client, purpose = %guard.purpose, "Rate limit exceeded");
        metrics::record_rate_limited(guard.purpose.as_str());
        return too_many_requests(&decision);
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    response
}

/// 429 response for a rejected decision.
pub fn too_many_requests(decision: &RateDecision) -> Response {
    let retry_after = retry_after_secs(decision.retry_after);
    let body = json!({
        "message": "Too many requests, please try again later.",
        "retryAfter": retry_after,
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u32));
    response
}

fn retry_after_secs(window: Duration) -> u64 {
    let secs = window.as_secs();
    if window.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_limiter(policy: RatePolicy) -> (RateLimiter, MockClock) {
        let clock = MockClock::new(1_000_000);
        let limiter = RateLimiter::new(
            Arc::new(MemoryWindowStore::new()),
            Arc::new(clock.clone()),
            RatePolicies::uniform(policy),
        );
        (limiter, clock)
    }

    #[tokio::test]
    async fn test_rejects_after_max_then_reopens() {
        for (max, window_ms) in [(1u32, 50u64), (3, 1_000), (10, 60_000)] {
            let window = Duration::from_millis(window_ms);
            let (limiter, clock) = mock_limiter(RatePolicy::new(max, window));

            for i in 0..max {
                let d = limiter.check("203.0.113.7", max, window).await.unwrap();
                assert!(d.admitted, "check {} of {} should pass", i + 1, max);
                assert_eq!(d.remaining, max - i - 1);
            }
            let over = limiter.check("203.0.113.7", max, window).await.unwrap();
            assert!(!over.admitted);
            assert_eq!(over.remaining, 0);

            clock.advance(window + Duration::from_millis(1));
            let fresh = limiter.check("203.0.113.7", max, window).await.unwrap();
            assert!(fresh.admitted);
            assert_eq!(fresh.remaining, max - 1);
        }
    }

    #[tokio::test]
    async fn test_purposes_are_independent() {
        let clock = MockClock::new(0);
        let policies = RatePolicies {
            login: RatePolicy::new(1, Duration::from_secs(60)),
            registration: RatePolicy::new(2, Duration::from_secs(60)),
            api: RatePolicy::new(100, Duration::from_secs(60)),
            password_reset: RatePolicy::new(1, Duration::from_secs(60)),
        };
        let limiter = RateLimiter::new(Arc::new(MemoryWindowStore::new()), Arc::new(clock), policies);

        assert!(limiter.check_purpose(RatePurpose::Login, "c").await.unwrap().admitted);
        assert!(!limiter.check_purpose(RatePurpose::Login, "c").await.unwrap().admitted);

        // Login exhaustion leaves other purposes and callers alone.
        assert!(limiter.check_purpose(RatePurpose::Registration, "c").await.unwrap().admitted);
        assert!(limiter.check_purpose(RatePurpose::Login, "d").await.unwrap().admitted);
        assert_eq!(limiter.tracked_windows(), 3);
    }

    #[tokio::test]
    async fn test_zero_max_always_rejects() {
        let (limiter, _) = mock_limiter(RatePolicy::new(0, Duration::from_secs(1)));
        let d = limiter.check_purpose(RatePurpose::Api, "c").await.unwrap();
        assert!(!d.admitted);
        assert_eq!(limiter.tracked_windows(), 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let (limiter, clock) = mock_limiter(RatePolicy::new(5, Duration::from_secs(10)));
        limiter.check_purpose(RatePurpose::Api, "old").await.unwrap();
        clock.advance(Duration::from_secs(6));
        limiter.check_purpose(RatePurpose::Api, "new").await.unwrap();
        clock.advance(Duration::from_secs(5));

        assert_eq!(limiter.sweep().await.unwrap(), 1);
        assert_eq!(limiter.tracked_windows(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let (limiter, _) = mock_limiter(RatePolicy::new(5, Duration::from_secs(10)));
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(Arc::new(limiter).run_sweeper(Duration::from_millis(10), rx));

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[test]
    fn test_policies_from_config() {
        let policies = RatePolicies::from(&PolicySet::strict());
        assert_eq!(policies.get(RatePurpose::Registration), RatePolicy::new(3, Duration::from_secs(3600)));
        assert_eq!(policies.get(RatePurpose::Api).max_requests, 100);
    }

    #[test]
    fn test_too_many_requests_headers() {
        let (_, decision) = RateWindowRecord::open("c", 0, RatePolicy::new(1, Duration::from_millis(1500)));
        let response = too_many_requests(&decision);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
        assert_eq!(response.headers()[X_RATELIMIT_REMAINING], "0");
    }
}
