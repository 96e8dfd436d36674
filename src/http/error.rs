//! Failure classification.
//!
//! Route logic returns [`ApiError`]. Its `IntoResponse` impl only parks the
//! error in the response extensions; [`classify_errors`] then renders it with
//! the environment-aware [`ErrorClassifier`]. That middleware is the only place
//! a failure body is produced.
//!
//! # Taxonomy
//! ```text
//! Validation        → 422, field list always shown
//! Application       → caller's status / message / code
//! Identity, Auth    → provider code lookup (401/403/404/409)
//! everything else   → 500, generic message; detail only in development
//! ```

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::config::Environment;
use crate::observability::metrics;
use crate::security::rate_limit::RateStoreError;
use crate::store::StoreError;

const GENERIC_MESSAGE: &str = "An unexpected error occurred. Please try again later.";

/// One rejected field of a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub path: Vec<String>,
    pub message: String,
}

impl FieldIssue {
    pub fn new<I, S>(path: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            message: message.into(),
        }
    }

    /// Dotted field name, e.g. `user.name`.
    pub fn field(&self) -> String {
        self.path.join(".")
    }
}

/// Every failure a route can surface.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body rejected by shape or value checks.
    #[error("validation failed ({} issues)", .issues.len())]
    Validation { issues: Vec<FieldIssue> },

    /// Explicit failure declared by route logic.
    #[error("{message}")]
    Application {
        status: StatusCode,
        message: String,
        code: Option<String>,
    },

    /// Identity provider error code raised outside token verification.
    #[error("identity provider error: {code}")]
    Identity { code: String },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    RateStore(#[from] RateStoreError),

    /// Anything else; the message is for logs only.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(issues: Vec<FieldIssue>) -> Self {
        Self::Validation { issues }
    }

    pub fn application(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Application {
            status,
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(self, code: impl Into<String>) -> Self {
        match self {
            Self::Application { status, message, .. } => Self::Application {
                status,
                message,
                code: Some(code.into()),
            },
            other => other,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::application(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::application(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "validation",
            ApiError::Application { .. } => "application",
            ApiError::Identity { .. } | ApiError::Auth(_) => "identity",
            ApiError::Store(_) | ApiError::RateStore(_) | ApiError::Internal(_) => "unclassified",
        }
    }
}

/// Parks the error for [`classify_errors`]; the status is a placeholder.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
        response.extensions_mut().insert(PendingError(Arc::new(self)));
        response
    }
}

/// Response extension carrying an unrendered failure.
#[derive(Clone)]
pub struct PendingError(pub Arc<ApiError>);

/// Known identity-provider codes and their client-facing translation.
const PROVIDER_CODES: &[(&str, u16, &str)] = &[
    ("INVALID_ID_TOKEN", 401, "Invalid or expired authentication token"),
    ("TOKEN_EXPIRED", 401, "Invalid or expired authentication token"),
    ("CREDENTIAL_TOO_OLD_LOGIN_AGAIN", 401, "Please sign in again"),
    ("MISSING_TOKEN", 401, "Authentication required"),
    ("USER_NOT_FOUND", 404, "User not found"),
    ("EMAIL_EXISTS", 409, "Email already in use"),
    ("PERMISSION_DENIED", 403, "Insufficient permissions"),
    ("USER_DISABLED", 403, "This account has been disabled"),
];

fn lookup_provider_code(code: &str) -> Option<(StatusCode, &'static str)> {
    PROVIDER_CODES
        .iter()
        .find(|(known, _, _)| *known == code)
        .and_then(|(_, status, message)| {
            StatusCode::from_u16(*status).ok().map(|s| (s, *message))
        })
}

/// A failure reduced to what the client may see plus what the logs keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub status: StatusCode,
    pub user_message: String,
    pub code: Option<String>,
    pub error_id: String,
    pub issues: Vec<FieldIssue>,
    /// Logged always; serialized only in development.
    pub internal_detail: String,
    pub unclassified: bool,
}

#[derive(Serialize)]
struct FieldErrorBody {
    field: String,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    message: String,
    error_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldErrorBody>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack: Option<Vec<String>>,
}

/// Generate a support-correlation id: `err_<epoch_millis>_<7 chars>`.
pub fn generate_error_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let suffix: String = std::iter::repeat_with(|| {
        let c = fastrand::alphanumeric();
        c.to_ascii_lowercase()
    })
    .take(7)
    .collect();
    format!("err_{}_{}", millis, suffix)
}

/// Environment-aware renderer for [`ApiError`].
#[derive(Debug, Clone, Copy)]
pub struct ErrorClassifier {
    environment: Environment,
}

impl ErrorClassifier {
    pub fn new(environment: Environment) -> Self {
        Self { environment }
    }

    /// Classify a failure. Emits exactly one structured log event.
    pub fn classify(&self, error: &ApiError) -> ClassifiedError {
        let error_id = generate_error_id();
        let internal_detail = error_chain(error).join(": ");

        let (status, user_message, code, issues) = match error {
            ApiError::Validation { issues } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation failed".to_string(),
                None,
                issues.clone(),
            ),
            ApiError::Application {
                status,
                message,
                code,
            } => (*status, message.clone(), code.clone(), Vec::new()),
            ApiError::Identity { code } => match lookup_provider_code(code) {
                Some((status, message)) => (status, message.to_string(), Some(code.clone()), Vec::new()),
                None => unclassified(),
            },
            ApiError::Auth(auth) => match lookup_provider_code(auth.code()) {
                Some((status, message)) => {
                    (status, message.to_string(), Some(auth.code().to_string()), Vec::new())
                }
                None => (
                    StatusCode::UNAUTHORIZED,
                    "Authentication failed".to_string(),
                    Some(auth.code().to_string()),
                    Vec::new(),
                ),
            },
            ApiError::Store(_) | ApiError::RateStore(_) | ApiError::Internal(_) => unclassified(),
        };
        let unclassified = status == StatusCode::INTERNAL_SERVER_ERROR && code.is_none();

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        if status.is_server_error() {
            tracing::error!(
                error_id = %error_id,
                error = %internal_detail,
                error_debug = ?error,
                kind = error.kind(),
                status = status.as_u16(),
                timestamp,
                "Request failed"
            );
        } else {
            tracing::warn!(
                error_id = %error_id,
                error = %internal_detail,
                kind = error.kind(),
                status = status.as_u16(),
                timestamp,
                "Request rejected"
            );
        }
        metrics::record_error(status.as_u16(), error.kind());

        ClassifiedError {
            status,
            user_message,
            code,
            error_id,
            issues,
            internal_detail,
            unclassified,
        }
    }

    /// Render a classified error as the client-facing JSON response.
    pub fn render(&self, classified: ClassifiedError) -> Response {
        let development = !self.environment.is_production();

        let errors = (!classified.issues.is_empty()).then(|| {
            classified
                .issues
                .iter()
                .map(|issue| FieldErrorBody {
                    field: issue.field(),
                    message: issue.message.clone(),
                })
                .collect()
        });

        let (detail, stack) = if classified.unclassified && development {
            (
                Some(classified.internal_detail.clone()),
                Some(
                    classified
                        .internal_detail
                        .split(": ")
                        .map(str::to_string)
                        .collect(),
                ),
            )
        } else {
            (None, None)
        };

        let body = ErrorBody {
            message: classified.user_message,
            error_id: classified.error_id,
            code: classified.code,
            errors,
            detail,
            stack,
        };

        (classified.status, Json(body)).into_response()
    }

    pub fn respond(&self, error: &ApiError) -> Response {
        self.render(self.classify(error))
    }
}

fn unclassified() -> (StatusCode, String, Option<String>, Vec<FieldIssue>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        GENERIC_MESSAGE.to_string(),
        None,
        Vec::new(),
    )
}

fn error_chain(error: &ApiError) -> Vec<String> {
    let mut chain = vec![error.to_string()];
    let mut source = std::error::Error::source(error);
    while let Some(err) = source {
        let message = err.to_string();
        if chain.last() != Some(&message) {
            chain.push(message);
        }
        source = std::error::Error::source(err);
    }
    chain
}

/// Middleware rendering any parked [`ApiError`].
pub async fn classify_errors(
    State(classifier): State<ErrorClassifier>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    match response.extensions_mut().remove::<PendingError>() {
        Some(PendingError(error)) => classifier.respond(&error),
        None => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_error_id_format() {
        let id = generate_error_id();
        let parts: Vec<_> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "err");
        assert!(parts[1].parse::<u64>().is_ok());
        assert_eq!(parts[2].len(), 7);
        assert!(parts[2].chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(generate_error_id(), id);
    }

    #[tokio::test]
    async fn test_validation_lists_fields() {
        let classifier = ErrorClassifier::new(Environment::Production);
        let error = ApiError::validation(vec![FieldIssue::new(["user", "name"], "Name is required")]);

        let response = classifier.respond(&error);
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(
            body["errors"],
            serde_json::json!([{ "field": "user.name", "message": "Name is required" }])
        );
        assert!(body["errorId"].as_str().unwrap().starts_with("err_"));
    }

    #[tokio::test]
    async fn test_unclassified_hides_detail_in_production() {
        let classifier = ErrorClassifier::new(Environment::Production);
        let error = ApiError::internal("database password is hunter2");

        let response = classifier.respond(&error);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        let keys: Vec<_> = body.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["errorId".to_string(), "message".to_string()]);
        assert!(!body.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn test_unclassified_shows_detail_in_development() {
        let classifier = ErrorClassifier::new(Environment::Development);
        let response = classifier.respond(&ApiError::internal("boom"));
        let body = body_json(response).await;
        assert_eq!(body["message"], GENERIC_MESSAGE);
        assert_eq!(body["detail"], "boom");
        assert_eq!(body["stack"], serde_json::json!(["boom"]));
    }

    #[tokio::test]
    async fn test_application_error_keeps_status_and_code() {
        let classifier = ErrorClassifier::new(Environment::Production);
        let error = ApiError::conflict("Already registered for this event").with_code("ALREADY_REGISTERED");

        let classified = classifier.classify(&error);
        assert_eq!(classified.status, StatusCode::CONFLICT);
        assert_eq!(classified.code.as_deref(), Some("ALREADY_REGISTERED"));

        let body = body_json(classifier.render(classified)).await;
        assert_eq!(body["message"], "Already registered for this event");
        assert_eq!(body["code"], "ALREADY_REGISTERED");
    }

    #[test]
    fn test_provider_code_table() {
        let classifier = ErrorClassifier::new(Environment::Production);
        let cases = [
            ("TOKEN_EXPIRED", StatusCode::UNAUTHORIZED),
            ("USER_NOT_FOUND", StatusCode::NOT_FOUND),
            ("EMAIL_EXISTS", StatusCode::CONFLICT),
            ("PERMISSION_DENIED", StatusCode::FORBIDDEN),
            ("SOMETHING_NEW", StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (code, status) in cases {
            let classified = classifier.classify(&ApiError::Identity { code: code.into() });
            assert_eq!(classified.status, status, "code {}", code);
        }
    }

    #[test]
    fn test_auth_errors_map_to_401() {
        let classifier = ErrorClassifier::new(Environment::Production);
        for error in [
            AuthError::MissingToken,
            AuthError::InvalidToken("no matching user".into()),
            AuthError::Timeout(5),
            AuthError::Transport("connection refused".into()),
        ] {
            let classified = classifier.classify(&ApiError::from(error));
            assert_eq!(classified.status, StatusCode::UNAUTHORIZED);
        }

        let expired = classifier.classify(&ApiError::from(AuthError::Provider {
            code: "USER_DISABLED".into(),
        }));
        assert_eq!(expired.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_parked_error_is_placeholder() {
        let response = ApiError::internal("x").into_response();
        assert!(response.extensions().get::<PendingError>().is_some());
    }
}
