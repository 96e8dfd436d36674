//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared [`AppState`] from configuration
//! - Create the Axum Router with all routes
//! - Wire up middleware (request ID, tracing, timeout, body limit, edge gate,
//!   error classification, per-route rate limits)
//! - Serve until shutdown, running the rate-limit sweeper alongside
//!
//! # Layer order (outermost first)
//! ```text
//! SetRequestId → PropagateRequestId → Trace → BodyLimit → Timeout
//!     → track_requests → edge gate → classify_errors
//!     → [route_layer rate limit] → handler
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::FromRef,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::auth::{verifier_from_config, SharedVerifier};
use crate::config::GateConfig;
use crate::http::error::{classify_errors, ErrorClassifier};
use crate::http::handlers;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, track_requests};
use crate::lifecycle::Shutdown;
use crate::security::edge::{edge_gate_middleware, EdgeGate};
use crate::security::rate_limit::{
    rate_limit_middleware, RateLimitGuard, RateLimiter, RatePolicies, RatePurpose,
};
use crate::store::{DocumentStore, MemoryDocumentStore};

/// Application state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GateConfig>,
    pub limiter: Arc<RateLimiter>,
    pub verifier: SharedVerifier,
    pub store: Arc<dyn DocumentStore>,
    pub gate: Arc<EdgeGate>,
    pub classifier: ErrorClassifier,
}

impl AppState {
    /// Assemble state around the given collaborators. Rate-limit policies
    /// follow the configured environment.
    pub fn new(config: GateConfig, verifier: SharedVerifier, store: Arc<dyn DocumentStore>) -> Self {
        let policies = RatePolicies::from(config.active_policies());
        Self::with_limiter(config, verifier, store, Arc::new(RateLimiter::in_memory(policies)))
    }

    pub fn with_limiter(
        config: GateConfig,
        verifier: SharedVerifier,
        store: Arc<dyn DocumentStore>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let gate = Arc::new(EdgeGate::from_config(&config));
        let classifier = ErrorClassifier::new(config.environment);
        Self {
            config: Arc::new(config),
            limiter,
            verifier,
            store,
            gate,
            classifier,
        }
    }

    /// State with the configured identity provider and an in-memory store.
    pub fn from_config(config: GateConfig) -> Result<Self, url::ParseError> {
        let verifier = verifier_from_config(&config.identity)?;
        Ok(Self::new(config, verifier, Arc::new(MemoryDocumentStore::new())))
    }
}

impl FromRef<AppState> for SharedVerifier {
    fn from_ref(state: &AppState) -> Self {
        state.verifier.clone()
    }
}

/// HTTP server for the festival API.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        let router = build_router(state.clone());
        Self { router, state }
    }

    /// The fully layered router, for in-process calls.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            environment = %self.state.config.environment,
            "HTTP server starting"
        );

        let sweep_every = Duration::from_secs(self.state.config.rate_limit.cleanup_interval_secs);
        let sweeper = tokio::spawn(
            self.state
                .limiter
                .clone()
                .run_sweeper(sweep_every, shutdown.subscribe()),
        );

        let mut stop = shutdown.subscribe();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        if let Err(e) = sweeper.await {
            tracing::warn!(error = %e, "Rate limit sweeper ended abnormally");
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();
    let prefix = config.cors.api_prefix.trim_end_matches('/');
    let limited = |purpose| {
        from_fn_with_state(
            RateLimitGuard::new(state.limiter.clone(), purpose),
            rate_limit_middleware,
        )
    };

    Router::new()
        .route(
            &format!("{}/me", prefix),
            get(handlers::me).route_layer(limited(RatePurpose::Api)),
        )
        .route(
            &format!("{}/register", prefix),
            post(handlers::register_profile).route_layer(limited(RatePurpose::Registration)),
        )
        .route(
            &format!("{}/events/register", prefix),
            post(handlers::register_event).route_layer(limited(RatePurpose::Registration)),
        )
        .route(
            &format!("{}/profile", prefix),
            put(handlers::update_profile).route_layer(limited(RatePurpose::Api)),
        )
        .route("/health", get(handlers::health))
        .with_state(state.clone())
        .layer(from_fn_with_state(state.classifier, classify_errors))
        .layer(from_fn_with_state(state.gate.clone(), edge_gate_middleware))
        .layer(from_fn(track_requests))
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
        .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id_layer())
        .layer(set_request_id_layer())
}
