//! Route handlers for the profile and event-registration API.
//!
//! Handlers only see admitted, authenticated callers: the edge gate and the
//! per-route rate limit run first, and `AuthenticatedUser` rejects before any
//! body is read.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthenticatedUser;
use crate::http::error::{ApiError, FieldIssue};
use crate::http::extract::{Checker, Validate, ValidatedJson};
use crate::http::server::AppState;
use crate::store::{Document, StoreError};

pub const USERS: &str = "users";
pub const REGISTRATIONS: &str = "registrations";

const PROFILE_NOT_FOUND: &str = "PROFILE_NOT_FOUND";
const ALREADY_REGISTERED: &str = "ALREADY_REGISTERED";

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn profile_not_found(message: &str) -> ApiError {
    ApiError::not_found(message).with_code(PROFILE_NOT_FOUND)
}

/// Profile body for `POST /api/register`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterProfile {
    name: Option<String>,
    usn: Option<String>,
    college_name: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFields {
    pub name: String,
    pub usn: String,
    pub college_name: String,
    pub phone: String,
}

fn check_phone(checker: &mut Checker, phone: &str) {
    if !phone.is_empty() && (phone.len() != 10 || !phone.chars().all(|c| c.is_ascii_digit())) {
        checker.issue("phone", "Phone must be a 10-digit number");
    }
}

fn check_usn(checker: &mut Checker, usn: &str) {
    if !usn.is_empty() && !usn.chars().all(|c| c.is_ascii_alphanumeric()) {
        checker.issue("usn", "USN must be alphanumeric");
    }
}

impl Validate for RegisterProfile {
    type Output = ProfileFields;

    fn validate(self) -> Result<ProfileFields, Vec<FieldIssue>> {
        let mut checker = Checker::new();
        let name = checker.required("name", "Name", self.name, 100);
        let usn = checker.required("usn", "USN", self.usn, 20);
        check_usn(&mut checker, &usn);
        let college_name = checker.required("collegeName", "College name", self.college_name, 200);
        let phone = checker.required("phone", "Phone", self.phone, 10);
        check_phone(&mut checker, &phone);

        checker.finish(ProfileFields {
            name,
            usn: usn.to_uppercase(),
            college_name,
            phone,
        })
    }
}

/// Partial profile body for `PUT /api/profile`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfile {
    name: Option<String>,
    usn: Option<String>,
    college_name: Option<String>,
    phone: Option<String>,
}

impl Validate for UpdateProfile {
    type Output = Document;

    fn validate(self) -> Result<Document, Vec<FieldIssue>> {
        let mut checker = Checker::new();
        let name = checker.optional("name", "Name", self.name, 100);
        let usn = checker.optional("usn", "USN", self.usn, 20);
        if let Some(usn) = &usn {
            check_usn(&mut checker, usn);
        }
        let college_name = checker.optional("collegeName", "College name", self.college_name, 200);
        let phone = checker.optional("phone", "Phone", self.phone, 10);
        if let Some(phone) = &phone {
            check_phone(&mut checker, phone);
        }

        let mut fields = Document::new();
        let present = [
            ("name", name),
            ("usn", usn.map(|u| u.to_uppercase())),
            ("collegeName", college_name),
            ("phone", phone),
        ];
        for (field, value) in present {
            if let Some(value) = value {
                fields.insert(field.to_string(), Value::String(value));
            }
        }
        if fields.is_empty() {
            checker.issue("body", "At least one field must be provided");
        }
        checker.finish(fields)
    }
}

/// Body for `POST /api/events/register`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterEvent {
    event_id: Option<String>,
    event_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventChoice {
    pub event_id: String,
    pub event_name: Option<String>,
}

impl Validate for RegisterEvent {
    type Output = EventChoice;

    fn validate(self) -> Result<EventChoice, Vec<FieldIssue>> {
        let mut checker = Checker::new();
        let event_id = checker.required("eventId", "Event id", self.event_id, 100);
        if event_id.contains('/') {
            checker.issue("eventId", "Event id must not contain '/'");
        }
        let event_name = checker.optional("eventName", "Event name", self.event_name, 200);
        checker.finish(EventChoice {
            event_id,
            event_name,
        })
    }
}

/// `GET /api/me`
pub async fn me(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .store
        .get(USERS, &user.uid)
        .await?
        .ok_or_else(|| profile_not_found("Profile not found"))?;

    Ok(Json(json!({
        "message": "Profile retrieved",
        "profile": profile,
    })))
}

/// `POST /api/register`: create or merge-update the caller's profile.
pub async fn register_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ValidatedJson(fields): ValidatedJson<RegisterProfile>,
) -> Result<impl IntoResponse, ApiError> {
    let now = now_millis();

    let mut profile = Document::new();
    profile.insert("uid".into(), json!(user.uid));
    profile.insert("email".into(), json!(user.email));
    profile.insert("name".into(), json!(fields.name));
    profile.insert("usn".into(), json!(fields.usn));
    profile.insert("collegeName".into(), json!(fields.college_name));
    profile.insert("phone".into(), json!(fields.phone));
    profile.insert("updatedAt".into(), json!(now));

    let mut on_create = Document::new();
    on_create.insert("createdAt".into(), json!(now));
    on_create.insert("registeredEvents".into(), json!([]));

    let created = state
        .store
        .merge_or_create(USERS, &user.uid, profile, on_create)
        .await?;

    let (status, message) = if created {
        tracing::info!(uid = %user.uid, "Profile created");
        (StatusCode::CREATED, "Profile created")
    } else {
        tracing::info!(uid = %user.uid, "Profile updated");
        (StatusCode::OK, "Profile updated")
    };
    Ok((status, Json(json!({ "message": message, "uid": user.uid }))))
}

/// `POST /api/events/register`: record one registration per (caller, event).
pub async fn register_event(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ValidatedJson(choice): ValidatedJson<RegisterEvent>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .store
        .get(USERS, &user.uid)
        .await?
        .ok_or_else(|| profile_not_found("Complete your profile before registering for events"))?;

    let registration_id = format!("{}_{}", user.uid, choice.event_id);
    let mut registration = Document::new();
    registration.insert("uid".into(), json!(user.uid));
    registration.insert("eventId".into(), json!(choice.event_id));
    registration.insert("eventName".into(), json!(choice.event_name));
    registration.insert("name".into(), profile.get("name").cloned().unwrap_or(Value::Null));
    registration.insert("email".into(), json!(user.email));
    registration.insert("registeredAt".into(), json!(now_millis()));

    if !state
        .store
        .create(REGISTRATIONS, &registration_id, registration)
        .await?
    {
        return Err(ApiError::conflict("Already registered for this event").with_code(ALREADY_REGISTERED));
    }

    let profile_missing = |e: StoreError| match e {
        StoreError::NotFound { .. } => profile_not_found("Profile not found"),
        other => other.into(),
    };
    state
        .store
        .append_unique(USERS, &user.uid, "registeredEvents", json!(choice.event_id))
        .await
        .map_err(profile_missing)?;

    let mut touched = Document::new();
    touched.insert("updatedAt".into(), json!(now_millis()));
    state
        .store
        .update(USERS, &user.uid, touched)
        .await
        .map_err(profile_missing)?;

    tracing::info!(uid = %user.uid, event_id = %choice.event_id, "Event registration recorded");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registered for event",
            "registrationId": registration_id,
        })),
    ))
}

/// `PUT /api/profile`: update fields of an existing profile.
pub async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ValidatedJson(mut fields): ValidatedJson<UpdateProfile>,
) -> Result<impl IntoResponse, ApiError> {
    fields.insert("updatedAt".into(), json!(now_millis()));

    match state.store.update(USERS, &user.uid, fields).await {
        Ok(()) => {}
        Err(StoreError::NotFound { .. }) => return Err(profile_not_found("Profile not found")),
        Err(e) => return Err(e.into()),
    }

    Ok(Json(json!({ "message": "Profile updated" })))
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(json!({ "message": "ok", "status": "healthy" }))
}
