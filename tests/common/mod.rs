//! Shared utilities for integration tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;

use festival_gate::auth::{AuthError, SharedVerifier, TokenVerifier, VerifiedIdentity};
use festival_gate::config::{Environment, GateConfig, IdentityConfig};
use festival_gate::http::{build_router, AppState};
use festival_gate::security::rate_limit::{
    RateDecision, RateLimiter, RatePolicies, RatePolicy, RateStoreError, SystemClock, WindowStore,
};
use festival_gate::store::MemoryDocumentStore;

pub const APP_ORIGIN: &str = "http://localhost:3000";

/// Verifier accepting `token-<uid>` and rejecting everything else.
#[derive(Debug, Default)]
pub struct StaticVerifier;

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        match token.strip_prefix("token-") {
            Some(uid) if !uid.is_empty() => Ok(VerifiedIdentity {
                uid: uid.to_string(),
                email: Some(format!("{}@example.edu", uid)),
                email_verified: true,
                display_name: None,
            }),
            _ => Err(AuthError::InvalidToken("INVALID_ID_TOKEN".into())),
        }
    }
}

#[allow(dead_code)]
pub fn test_config(environment: Environment) -> GateConfig {
    let mut config = GateConfig {
        environment,
        ..GateConfig::default()
    };
    config.cors.app_url = APP_ORIGIN.to_string();
    config.identity.api_key = "test-key".to_string();
    config
}

/// Router over a static verifier and a fresh in-memory store.
#[allow(dead_code)]
pub fn test_app(config: GateConfig) -> (Router, Arc<MemoryDocumentStore>) {
    let store = Arc::new(MemoryDocumentStore::new());
    let verifier: SharedVerifier = Arc::new(StaticVerifier);
    let state = AppState::new(config, verifier, store.clone());
    (build_router(state), store)
}

/// Window store whose backend is always unreachable.
#[derive(Debug, Default)]
pub struct UnreachableWindowStore;

#[async_trait]
impl WindowStore for UnreachableWindowStore {
    async fn check_and_increment(
        &self,
        _key: &str,
        _identifier: &str,
        _now: u64,
        _policy: RatePolicy,
    ) -> Result<RateDecision, RateStoreError> {
        Err(RateStoreError::Backend("connection refused by 10.0.0.9:6379".into()))
    }

    async fn sweep_expired(&self, _now: u64) -> Result<usize, RateStoreError> {
        Err(RateStoreError::Backend("connection refused by 10.0.0.9:6379".into()))
    }

    fn len(&self) -> usize {
        0
    }
}

/// Router whose rate limiter sits on [`UnreachableWindowStore`].
#[allow(dead_code)]
pub fn test_app_with_unreachable_limiter(config: GateConfig) -> Router {
    let limiter = RateLimiter::new(
        Arc::new(UnreachableWindowStore),
        Arc::new(SystemClock),
        RatePolicies::from(config.active_policies()),
    );
    let verifier: SharedVerifier = Arc::new(StaticVerifier);
    let state = AppState::with_limiter(
        config,
        verifier,
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(limiter),
    );
    build_router(state)
}

/// Request builder with the allow-listed origin and a forwarded client address.
#[allow(dead_code)]
pub fn api_request(method: &str, path: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("origin", APP_ORIGIN)
        .header("x-forwarded-for", "203.0.113.7");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Send one request through the router; the body is parsed as JSON when possible.
#[allow(dead_code)]
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

/// Canned behavior of the mock identity service, keyed by token.
#[derive(Clone)]
#[allow(dead_code)]
pub enum MockOutcome {
    User { uid: &'static str, email: &'static str },
    NoUsers,
    ProviderError(&'static str),
    Delay(Duration),
}

#[derive(Clone)]
struct MockIdentity {
    calls: Arc<AtomicUsize>,
    outcomes: Arc<HashMap<&'static str, MockOutcome>>,
}

async fn lookup(State(mock): State<MockIdentity>, Json(body): Json<Value>) -> impl IntoResponse {
    mock.calls.fetch_add(1, Ordering::SeqCst);
    let token = body["idToken"].as_str().unwrap_or_default();

    match mock.outcomes.get(token).cloned() {
        Some(MockOutcome::User { uid, email }) => (
            StatusCode::OK,
            Json(json!({ "users": [{ "localId": uid, "email": email, "emailVerified": true }] })),
        ),
        Some(MockOutcome::NoUsers) => (StatusCode::OK, Json(json!({ "kind": "identitytoolkit#GetAccountInfoResponse" }))),
        Some(MockOutcome::Delay(delay)) => {
            tokio::time::sleep(delay).await;
            (StatusCode::OK, Json(json!({ "users": [] })))
        }
        Some(MockOutcome::ProviderError(code)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "code": 400, "message": code } })),
        ),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "code": 400, "message": "INVALID_ID_TOKEN" } })),
        ),
    }
}

/// Start a mock identity lookup endpoint. Returns its config and call counter.
#[allow(dead_code)]
pub async fn start_mock_identity(
    outcomes: Vec<(&'static str, MockOutcome)>,
    timeout_secs: u64,
) -> (IdentityConfig, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mock = MockIdentity {
        calls: calls.clone(),
        outcomes: Arc::new(outcomes.into_iter().collect()),
    };
    let app = Router::new().route("/v1/lookup", post(lookup)).with_state(mock);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let config = IdentityConfig {
        endpoint: format!("http://{}/v1/lookup", addr),
        api_key: "test-key".to_string(),
        timeout_secs,
        cache_ttl_secs: 0,
    };
    (config, calls)
}
