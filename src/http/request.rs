//! Per-request plumbing shared by every route.
//!
//! # Responsibilities
//! - Request ID generation (UUID v4) and propagation via `x-request-id`
//! - Request count and latency metrics
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Metrics recorded after the edge gate, so blocked and preflight requests count too

use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Layer assigning a UUID v4 `x-request-id` when the client sent none.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

/// Layer copying `x-request-id` onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

/// Middleware recording `gate_requests_total` and latency per request.
pub async fn track_requests(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    tracing::debug!(
        request_id = %request_id,
        method = %method,
        status,
        latency_ms = start.elapsed().as_millis() as u64,
        "Request completed"
    );
    crate::observability::metrics::record_request(method.as_str(), status, start);
    response
}
