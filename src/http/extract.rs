//! Body extraction with field-level validation.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    Json,
};
use serde::de::DeserializeOwned;

use crate::http::error::{ApiError, FieldIssue};

/// A raw request payload that can be checked and turned into its validated
/// form. All issues are reported at once.
pub trait Validate: DeserializeOwned {
    type Output;

    fn validate(self) -> Result<Self::Output, Vec<FieldIssue>>;
}

/// JSON body that passed [`Validate`].
pub struct ValidatedJson<T: Validate>(pub T::Output);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(raw) = Json::<T>::from_request(req, state)
            .await
            .map_err(rejection_to_error)?;
        raw.validate().map(ValidatedJson).map_err(ApiError::validation)
    }
}

fn rejection_to_error(rejection: JsonRejection) -> ApiError {
    match rejection.status() {
        StatusCode::UNSUPPORTED_MEDIA_TYPE => ApiError::application(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Expected a JSON request body",
        ),
        StatusCode::PAYLOAD_TOO_LARGE => {
            ApiError::application(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
        }
        _ => ApiError::validation(vec![FieldIssue::new(["body"], rejection.body_text())]),
    }
}

/// Accumulates issues while a payload is checked.
#[derive(Debug, Default)]
pub struct Checker {
    issues: Vec<FieldIssue>,
}

impl Checker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self, field: &str, message: impl Into<String>) {
        self.issues.push(FieldIssue::new(field.split('.'), message));
    }

    /// Trimmed, non-empty, at most `max` characters.
    pub fn required(&mut self, field: &str, label: &str, value: Option<String>, max: usize) -> String {
        let value = value.map(|v| v.trim().to_string()).unwrap_or_default();
        if value.is_empty() {
            self.issue(field, format!("{} is required", label));
        } else if value.chars().count() > max {
            self.issue(field, format!("{} must be at most {} characters", label, max));
        }
        value
    }

    /// Like [`Checker::required`] but absent is fine.
    pub fn optional(
        &mut self,
        field: &str,
        label: &str,
        value: Option<String>,
        max: usize,
    ) -> Option<String> {
        value.map(|v| self.required(field, label, Some(v), max))
    }

    pub fn finish<T>(self, value: T) -> Result<T, Vec<FieldIssue>> {
        if self.issues.is_empty() {
            Ok(value)
        } else {
            Err(self.issues)
        }
    }
}
