//! Security response headers.
//!
//! A fixed hardening bundle, HSTS in production, and a Content-Security-Policy
//! assembled once at startup from the configured source lists.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::CspConfig;

/// Headers attached to every response passing through the edge gate.
const HARDENING: [(&str, &str); 6] = [
    ("x-frame-options", "DENY"),
    ("x-content-type-options", "nosniff"),
    ("x-xss-protection", "1; mode=block"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("permissions-policy", "camera=(), microphone=(), geolocation=()"),
    // Identity-provider sign-in opens a popup that must be able to post back.
    ("cross-origin-opener-policy", "same-origin-allow-popups"),
];

/// Precomputed header set; built once, applied per response.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    fixed: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    /// Build the header set. `hsts_max_age` is `Some` only in production.
    pub fn new(csp: &str, hsts_max_age: Option<u64>) -> Self {
        let mut fixed: Vec<(HeaderName, HeaderValue)> = HARDENING
            .iter()
            .map(|&(name, value)| {
                (
                    HeaderName::from_static(name),
                    HeaderValue::from_static(value),
                )
            })
            .collect();

        if let Some(max_age) = hsts_max_age {
            let value = format!("max-age={}; includeSubDomains", max_age);
            if let Ok(value) = HeaderValue::from_str(&value) {
                fixed.push((HeaderName::from_static("strict-transport-security"), value));
            }
        }

        match HeaderValue::from_str(csp) {
            Ok(value) => fixed.push((HeaderName::from_static("content-security-policy"), value)),
            Err(_) => tracing::error!("Content-Security-Policy contains invalid characters, header omitted"),
        }

        Self { fixed }
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.fixed {
            headers.insert(name.clone(), value.clone());
        }
    }
}

/// Assemble the Content-Security-Policy string. `app_origin` is appended to
/// `connect-src` so the front-end can reach its own API.
pub fn build_csp(config: &CspConfig, app_origin: &str) -> String {
    let mut connect = config.connect_src.clone();
    if !app_origin.is_empty() && !connect.iter().any(|s| s == app_origin) {
        connect.push(app_origin.to_string());
    }

    let directives: [(&str, &[String]); 6] = [
        ("script-src", &config.script_src),
        ("style-src", &config.style_src),
        ("font-src", &config.font_src),
        ("img-src", &config.img_src),
        ("connect-src", &connect),
        ("frame-src", &config.frame_src),
    ];

    let mut policy = vec!["default-src 'self'".to_string()];
    for (name, sources) in directives {
        if !sources.is_empty() {
            policy.push(format!("{} {}", name, sources.join(" ")));
        }
    }
    policy.push("object-src 'none'".to_string());
    policy.push("base-uri 'self'".to_string());
    policy.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csp_includes_provider_and_app_origin() {
        let csp = build_csp(&CspConfig::default(), "https://fest.example");
        assert!(csp.starts_with("default-src 'self'"));
        assert!(csp.contains("https://apis.google.com"));
        assert!(csp.contains("https://fonts.googleapis.com"));
        assert!(csp.contains("frame-src 'self' https://*.firebaseapp.com"));

        let connect = csp
            .split("; ")
            .find(|d| d.starts_with("connect-src"))
            .unwrap();
        assert!(connect.ends_with("https://fest.example"));
    }

    #[test]
    fn test_empty_directive_is_omitted() {
        let config = CspConfig {
            frame_src: Vec::new(),
            ..CspConfig::default()
        };
        assert!(!build_csp(&config, "").contains("frame-src"));
    }

    #[test]
    fn test_hsts_only_when_requested() {
        let mut headers = HeaderMap::new();
        SecurityHeaders::new("default-src 'self'", None).apply(&mut headers);
        assert!(headers.get("strict-transport-security").is_none());
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["cross-origin-opener-policy"], "same-origin-allow-popups");

        let mut headers = HeaderMap::new();
        SecurityHeaders::new("default-src 'self'", Some(600)).apply(&mut headers);
        assert_eq!(headers["strict-transport-security"], "max-age=600; includeSubDomains");
        assert_eq!(headers["content-security-policy"], "default-src 'self'");
    }
}
