// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Calendar connect, callback, and event routes.
//!
//! The OAuth `state` parameter is `base64url("user_id|timestamp_hex|sig_hex")`
//! where `sig` is HMAC-SHA256 over `user_id|timestamp_hex`.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{CalendarEvent, CalendarSummary, CreatedEvent};
use crate::routes::{current_user, json_body};
use crate::services::google_calendar::EventDraft;
use crate::time_utils::{format_utc_rfc3339, week_window};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    response::Redirect,
    routing::{get, post},
    Extension, Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// Maximum age of an OAuth state parameter (10 minutes).
pub const STATE_MAX_AGE_MS: u128 = 10 * 60 * 1000;

/// Routes Google redirects the browser to. No session token is present.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/calendar/callback", get(callback))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/calendar/connect", get(connect))
        .route("/api/calendar/disconnect", post(disconnect))
        .route("/api/calendar/list", get(list_calendars))
        .route("/api/calendar/select", post(select_calendar))
        .route("/api/calendar/events", get(list_events).post(create_event))
}

fn require_google(state: &AppState) -> Result<()> {
    if state.google_calendar.is_configured() {
        Ok(())
    } else {
        Err(AppError::ServiceUnavailable(
            "Google Calendar is not configured".to_string(),
        ))
    }
}

fn now_millis() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis())
}

// ─── OAuth State ─────────────────────────────────────────────

fn state_mac(payload: &str, secret: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    Some(mac.finalize().into_bytes().to_vec())
}

/// Sign a state parameter binding the OAuth flow to `user_id`.
pub fn sign_state(user_id: i64, secret: &[u8], timestamp_ms: u128) -> Result<String> {
    let payload = format!("{}|{:x}", user_id, timestamp_ms);
    let signature = state_mac(&payload, secret)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("HMAC init failed")))?;

    let signed_state = format!("{}|{}", payload, hex::encode(signature));
    Ok(URL_SAFE_NO_PAD.encode(signed_state.as_bytes()))
}

/// Verify signature and age, returning the user ID the state was issued to.
pub fn verify_state(state: &str, secret: &[u8], now_ms: u128) -> Option<i64> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    let mut parts = state_str.splitn(3, '|');
    let (user_part, timestamp_hex, signature_hex) = (parts.next()?, parts.next()?, parts.next()?);

    let provided = hex::decode(signature_hex).ok()?;
    let expected = state_mac(&format!("{}|{}", user_part, timestamp_hex), secret)?;
    if !bool::from(expected.ct_eq(&provided)) {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    let issued_ms = u128::from_str_radix(timestamp_hex, 16).ok()?;
    if issued_ms > now_ms || now_ms - issued_ms > STATE_MAX_AGE_MS {
        tracing::warn!("OAuth state expired");
        return None;
    }

    user_part.parse().ok()
}

// ─── Connect / Callback / Disconnect ─────────────────────────

#[derive(Serialize)]
pub struct ConnectResponse {
    pub auth_url: String,
}

async fn connect(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ConnectResponse>> {
    require_google(&state)?;

    let oauth_state = sign_state(user.user_id, &state.config.oauth_state_key, now_millis()?)?;
    let auth_url = state
        .google_calendar
        .client()
        .authorization_url(&oauth_state)?;

    tracing::info!(user_id = user.user_id, "Starting Google Calendar OAuth flow");
    Ok(Json(ConnectResponse { auth_url }))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback: verify state, exchange the code, store the tokens.
async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect> {
    require_google(&state)?;

    let user_id = params
        .state
        .as_deref()
        .and_then(|s| verify_state(s, &state.config.oauth_state_key, now_millis().ok()?))
        .ok_or_else(|| AppError::BadRequest("Invalid or expired state parameter".to_string()))?;

    let frontend = state.config.frontend_url.trim_end_matches('/');
    let failed = format!("{}/settings?calendar=error", frontend);

    if let Some(error) = params.error {
        tracing::warn!(user_id, error = %error, "OAuth error from Google");
        return Ok(Redirect::temporary(&failed));
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;

    if let Err(e) = state.google_calendar.complete_oauth(user_id, &code).await {
        tracing::error!(user_id, error = %e, "Google token exchange failed");
        return Ok(Redirect::temporary(&failed));
    }

    Ok(Redirect::temporary(&format!(
        "{}/settings?calendar=connected",
        frontend
    )))
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

async fn disconnect(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<MessageResponse>> {
    let user = current_user(&state, auth.user_id).await?;
    state.google_calendar.disconnect(&user).await?;
    Ok(Json(MessageResponse {
        message: "Google Calendar disconnected".to_string(),
    }))
}

// ─── Calendars ───────────────────────────────────────────────

#[derive(Serialize)]
pub struct CalendarListResponse {
    pub calendars: Vec<CalendarSummary>,
    pub selected: String,
}

async fn list_calendars(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<CalendarListResponse>> {
    require_google(&state)?;
    let user = current_user(&state, auth.user_id).await?;
    let calendars = state.google_calendar.calendars(&user).await?;

    Ok(Json(CalendarListResponse {
        calendars,
        selected: user.calendar_id().to_string(),
    }))
}

#[derive(Deserialize)]
pub struct SelectRequest {
    #[serde(default)]
    calendar_id: String,
}

#[derive(Serialize)]
pub struct SelectResponse {
    pub message: String,
    pub selected: String,
}

async fn select_calendar(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    body: std::result::Result<Json<SelectRequest>, JsonRejection>,
) -> Result<Json<SelectResponse>> {
    let req = json_body(body)?;
    let calendar_id = req.calendar_id.trim().to_string();
    if calendar_id.is_empty() {
        return Err(AppError::BadRequest("calendar_id is required".to_string()));
    }
    require_google(&state)?;

    let user = current_user(&state, auth.user_id).await?;
    let calendars = state.google_calendar.calendars(&user).await?;
    if !calendars.iter().any(|c| c.id == calendar_id) {
        return Err(AppError::BadRequest(format!(
            "Calendar '{}' is not in your calendar list",
            calendar_id
        )));
    }

    state.db.set_selected_calendar(user.id, &calendar_id).await?;
    tracing::info!(user_id = user.id, calendar_id = %calendar_id, "Selected calendar");

    Ok(Json(SelectResponse {
        message: "Calendar selected".to_string(),
        selected: calendar_id,
    }))
}

// ─── Events ──────────────────────────────────────────────────

fn parse_time(name: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| AppError::BadRequest(format!("Invalid '{}': must be RFC3339 datetime", name)))
}

#[derive(Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub events: Vec<CalendarEvent>,
    pub start: String,
    pub end: String,
    pub calendar_id: String,
}

/// Window from the query, defaulting each bound to the current campus week.
pub fn event_window(
    start: Option<&str>,
    end: Option<&str>,
    default: (DateTime<Utc>, DateTime<Utc>),
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start = start.map(|s| parse_time("start", s)).transpose()?.unwrap_or(default.0);
    let end = end.map(|e| parse_time("end", e)).transpose()?.unwrap_or(default.1);
    if end <= start {
        return Err(AppError::BadRequest("'end' must be after 'start'".to_string()));
    }
    Ok((start, end))
}

async fn list_events(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Query(params): Query<EventsQuery>,
) -> Result<Json<EventsResponse>> {
    let default = week_window(Utc::now(), state.config.campus_timezone);
    let (start, end) = event_window(params.start.as_deref(), params.end.as_deref(), default)?;
    require_google(&state)?;

    let user = current_user(&state, auth.user_id).await?;
    let events = state.google_calendar.events(&user, start, end).await?;

    Ok(Json(EventsResponse {
        events,
        start: format_utc_rfc3339(start),
        end: format_utc_rfc3339(end),
        calendar_id: user.calendar_id().to_string(),
    }))
}

#[derive(Deserialize)]
pub struct CreateEventRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    start_time: String,
    #[serde(default)]
    end_time: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

impl CreateEventRequest {
    fn into_draft(self) -> Result<EventDraft> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::BadRequest("title is required".to_string()));
        }
        let start = parse_time("start_time", &self.start_time)?;
        let end = parse_time("end_time", &self.end_time)?;
        if end <= start {
            return Err(AppError::BadRequest(
                "end_time must be after start_time".to_string(),
            ));
        }

        let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Ok(EventDraft {
            title,
            start,
            end,
            description: non_empty(self.description),
            location: non_empty(self.location),
        })
    }
}

#[derive(Serialize)]
pub struct CreateEventResponse {
    pub message: String,
    pub event: CreatedEvent,
}

async fn create_event(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    body: std::result::Result<Json<CreateEventRequest>, JsonRejection>,
) -> Result<Json<CreateEventResponse>> {
    let draft = json_body(body)?.into_draft()?;
    require_google(&state)?;

    let user = current_user(&state, auth.user_id).await?;
    let event = state.google_calendar.create_event(&user, &draft).await?;

    Ok(Json(CreateEventResponse {
        message: "Event created".to_string(),
        event,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &[u8] = b"secret_key";
    const NOW: u128 = 1_760_000_000_000;

    #[test]
    fn test_state_roundtrip() {
        let signed = sign_state(42, SECRET, NOW).unwrap();
        assert_eq!(verify_state(&signed, SECRET, NOW + 1000), Some(42));
    }

    #[test]
    fn test_state_wrong_secret() {
        let signed = sign_state(42, SECRET, NOW).unwrap();
        assert_eq!(verify_state(&signed, b"wrong_key", NOW), None);
    }

    #[test]
    fn test_state_expired() {
        let signed = sign_state(42, SECRET, NOW).unwrap();
        assert_eq!(verify_state(&signed, SECRET, NOW + STATE_MAX_AGE_MS), Some(42));
        assert_eq!(verify_state(&signed, SECRET, NOW + STATE_MAX_AGE_MS + 1), None);
        // Issued in the future
        assert_eq!(verify_state(&signed, SECRET, NOW - 1), None);
    }

    #[test]
    fn test_state_tampered_user() {
        let signed = sign_state(42, SECRET, NOW).unwrap();
        let decoded = String::from_utf8(URL_SAFE_NO_PAD.decode(&signed).unwrap()).unwrap();
        let forged = URL_SAFE_NO_PAD.encode(decoded.replacen("42|", "43|", 1));
        assert_eq!(verify_state(&forged, SECRET, NOW), None);
    }

    #[test]
    fn test_state_malformed() {
        assert_eq!(verify_state("not base64!", SECRET, NOW), None);
        let encoded = URL_SAFE_NO_PAD.encode("invalid|format");
        assert_eq!(verify_state(&encoded, SECRET, NOW), None);
    }

    #[test]
    fn test_event_window() {
        let default = (
            Utc.with_ymd_and_hms(2025, 10, 13, 5, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 10, 20, 5, 0, 0).unwrap(),
        );
        assert_eq!(event_window(None, None, default).unwrap(), default);

        let (start, end) =
            event_window(Some("2025-10-14T00:00:00-05:00"), None, default).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 10, 14, 5, 0, 0).unwrap());
        assert_eq!(end, default.1);

        assert!(event_window(Some("tomorrow"), None, default).is_err());
        assert!(event_window(Some("2025-10-21T00:00:00Z"), None, default).is_err());
    }

    #[test]
    fn test_create_event_validation() {
        let req = |title: &str, start: &str, end: &str| CreateEventRequest {
            title: title.to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            description: Some("  ".to_string()),
            location: None,
        };

        let draft = req("Study", "2025-10-14T15:00:00Z", "2025-10-14T16:00:00Z")
            .into_draft()
            .unwrap();
        assert_eq!(draft.title, "Study");
        assert!(draft.description.is_none());

        assert!(req(" ", "2025-10-14T15:00:00Z", "2025-10-14T16:00:00Z")
            .into_draft()
            .is_err());
        assert!(req("Study", "2025-10-14T16:00:00Z", "2025-10-14T15:00:00Z")
            .into_draft()
            .is_err());
        assert!(req("Study", "10/14 3pm", "2025-10-14T16:00:00Z")
            .into_draft()
            .is_err());
    }
}
