//! Per-caller identifier resolution.
//!
//! The identifier keys rate-limit windows. It is derived from proxy headers
//! only: the first `X-Forwarded-For` hop, then `X-Real-IP`, then a constant.

use axum::http::HeaderMap;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Identifier used when no proxy header names the caller.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve a stable identifier for the caller. Pure; never fails.
pub fn resolve_client_id(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    headers
        .get(X_REAL_IP)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}
