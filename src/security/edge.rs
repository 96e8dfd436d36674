//! Edge gate: origin allow-listing and response hardening.
//!
//! # States
//! ```text
//! request ─┬─ OPTIONS ────────────────────────→ PreflightResponded (200)
//!          ├─ /api/* with foreign Origin ─────→ OriginBlocked (403)
//!          └─ otherwise ──────────────────────→ Continue
//!                                                 → route logic
//!                                                 → CORS + security headers attached
//! ```

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::config::GateConfig;
use crate::observability::metrics;
use crate::security::headers::{build_csp, SecurityHeaders};

const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Requested-With";

/// Origins permitted to call the API. Fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedOriginSet {
    origins: Vec<String>,
}

impl AllowedOriginSet {
    /// Build from configured defaults, adding `production_extra` only in
    /// production mode. Order is kept; duplicates and trailing slashes dropped.
    pub fn new<I, S>(defaults: I, production_extra: Option<&str>, production: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut origins: Vec<String> = Vec::new();
        let extra = production_extra.filter(|_| production);
        for origin in defaults
            .into_iter()
            .map(|s| s.as_ref().trim_end_matches('/').to_string())
            .chain(extra.map(|s| s.trim_end_matches('/').to_string()))
        {
            if !origin.is_empty() && !origins.contains(&origin) {
                origins.push(origin);
            }
        }
        Self { origins }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        let defaults = std::iter::once(config.cors.app_url.as_str())
            .chain(config.cors.allowed_origins.iter().map(String::as_str));
        Self::new(
            defaults,
            config.cors.production_origin.as_deref(),
            config.environment.is_production(),
        )
    }

    pub fn contains(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == origin)
    }

    /// Origin returned to preflight callers that are not allow-listed.
    pub fn fallback(&self) -> Option<&str> {
        self.origins.first().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.origins.iter().map(String::as_str)
    }
}

/// Outcome of the gate's inbound decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    PreflightResponded,
    OriginBlocked(String),
    Continue,
}

/// Edge gate configuration, read-only after startup.
#[derive(Debug)]
pub struct EdgeGate {
    origins: AllowedOriginSet,
    api_prefix: String,
    max_age: HeaderValue,
    security: SecurityHeaders,
}

impl EdgeGate {
    pub fn new(
        origins: AllowedOriginSet,
        api_prefix: impl Into<String>,
        max_age_secs: u64,
        security: SecurityHeaders,
    ) -> Self {
        Self {
            origins,
            api_prefix: api_prefix.into(),
            max_age: HeaderValue::from(max_age_secs),
            security,
        }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        let origins = AllowedOriginSet::from_config(config);
        let csp = build_csp(&config.security.csp, &config.cors.app_url);
        let hsts = config
            .environment
            .is_production()
            .then_some(config.security.hsts_max_age_secs);

        tracing::info!(
            origins = ?origins.iter().collect::<Vec<_>>(),
            hsts = hsts.is_some(),
            "Edge gate configured"
        );

        Self::new(
            origins,
            config.cors.api_prefix.clone(),
            config.cors.max_age_secs,
            SecurityHeaders::new(&csp, hsts),
        )
    }

    pub fn origins(&self) -> &AllowedOriginSet {
        &self.origins
    }

    /// Classify an inbound request.
    pub fn decide(&self, method: &Method, path: &str, origin: Option<&str>) -> GateDecision {
        if method == Method::OPTIONS {
            return GateDecision::PreflightResponded;
        }

        if let Some(origin) = origin {
            if self.is_api_path(path) && !self.origins.contains(origin) {
                return GateDecision::OriginBlocked(origin.to_string());
            }
        }

        GateDecision::Continue
    }

    fn is_api_path(&self, path: &str) -> bool {
        match path.strip_prefix(self.api_prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    fn preflight(&self, origin: Option<&str>) -> Response {
        let allow_origin = origin
            .filter(|o| self.origins.contains(o))
            .or_else(|| self.origins.fallback());

        let mut response = StatusCode::OK.into_response();
        let headers = response.headers_mut();
        if let Some(value) = allow_origin.and_then(|o| HeaderValue::from_str(o).ok()) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        response
    }

    fn blocked() -> Response {
        (
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "Origin not allowed" })),
        )
            .into_response()
    }

    /// Attach reflected CORS and security headers on the way out.
    pub fn decorate(&self, origin: Option<&str>, headers: &mut HeaderMap) {
        if let Some(origin) = origin.filter(|o| self.origins.contains(o)) {
            if let Ok(value) = HeaderValue::from_str(origin) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                    HeaderValue::from_static("true"),
                );
                headers.insert(header::VARY, HeaderValue::from_static("Origin"));
            }
        }
        self.security.apply(headers);
    }
}

/// Middleware running ahead of every route.
pub async fn edge_gate_middleware(
    State(gate): State<Arc<EdgeGate>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    // An undecodable Origin is kept (lossily) so it can never match the allow-list.
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

    match gate.decide(request.method(), request.uri().path(), origin.as_deref()) {
        GateDecision::PreflightResponded => gate.preflight(origin.as_deref()),
        GateDecision::OriginBlocked(origin) => {
            tracing::warn!(
                origin = %origin,
                path = %request.uri().path(),
                "Blocked request from disallowed origin"
            );
            metrics::record_origin_blocked();
            EdgeGate::blocked()
        }
        GateDecision::Continue => {
            let mut response = next.run(request).await;
            gate.decorate(origin.as_deref(), response.headers_mut());
            response
        }
    }
}
