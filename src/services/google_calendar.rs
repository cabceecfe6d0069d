// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Calendar API client and per-user service.
//!
//! Handles:
//! - OAuth authorization URL, code exchange and token revocation
//! - Access token refresh shortly before expiry
//! - Calendar list, event listing and event insertion

use crate::config::Config;
use crate::db::Database;
use crate::error::AppError;
use crate::models::{CalendarEvent, CalendarSummary, CreatedEvent, User};
use crate::services::check_response_json;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

const SERVICE: &str = "google_calendar";
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
const API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Scopes requested at connect time.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/calendar.readonly",
    "https://www.googleapis.com/auth/calendar.events",
];

/// Upper bound on events fetched per listing.
const MAX_EVENTS: u32 = 250;

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Google Calendar API client.
#[derive(Clone)]
pub struct GoogleCalendarClient {
    http: reqwest::Client,
    /// `(client_id, client_secret)`, None when unconfigured
    credentials: Option<(String, String)>,
    redirect_uri: String,
    time_zone: Tz,
}

impl GoogleCalendarClient {
    pub fn new(config: &Config) -> Self {
        let credentials = match (&config.google_client_id, &config.google_client_secret) {
            (Some(id), Some(secret)) => Some((id.clone(), secret.clone())),
            _ => None,
        };

        Self {
            http: reqwest::Client::new(),
            credentials,
            redirect_uri: config.google_redirect_uri(),
            time_zone: config.campus_timezone,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    fn credentials(&self) -> Result<(&str, &str), AppError> {
        self.credentials
            .as_ref()
            .map(|(id, secret)| (id.as_str(), secret.as_str()))
            .ok_or_else(|| {
                AppError::ServiceUnavailable("Google Calendar is not configured".to_string())
            })
    }

    /// Consent screen URL carrying the signed `state`.
    pub fn authorization_url(&self, state: &str) -> Result<String, AppError> {
        let (client_id, _) = self.credentials()?;
        let scope = SCOPES.join(" ");

        let url = reqwest::Url::parse_with_params(
            AUTH_URL,
            &[
                ("client_id", client_id),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("include_granted_scopes", "true"),
                ("state", state),
            ],
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid authorization URL: {}", e)))?;

        Ok(url.into())
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AppError> {
        let (client_id, client_secret) = self.credentials()?;

        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::upstream(SERVICE, format!("Token exchange failed: {}", e)))?;

        check_response_json(SERVICE, response).await
    }

    /// Refresh an expired access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        let (client_id, client_secret) = self.credentials()?;

        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| {
                AppError::upstream(SERVICE, format!("Token refresh request failed: {}", e))
            })?;

        check_response_json(SERVICE, response).await
    }

    /// Revoke a token at Google. Revoking either token ends the grant.
    pub async fn revoke(&self, token: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(REVOKE_URL)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| AppError::upstream(SERVICE, format!("Revocation request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::upstream(
                SERVICE,
                format!("HTTP {}: {}", status, body),
            ));
        }
        tracing::info!("Google token revoked");
        Ok(())
    }

    pub async fn list_calendars(
        &self,
        access_token: &str,
    ) -> Result<Vec<CalendarSummary>, AppError> {
        let url = format!("{}/users/me/calendarList", API_BASE);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::upstream(SERVICE, e.to_string()))?;

        let list: CalendarListResponse = check_response_json(SERVICE, response).await?;
        Ok(list.items.into_iter().map(CalendarSummary::from).collect())
    }

    /// Single events of `calendar_id` overlapping `[start, end)`, in start order.
    pub async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, AppError> {
        let url = format!(
            "{}/calendars/{}/events",
            API_BASE,
            urlencoding::encode(calendar_id)
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("timeMin", start.to_rfc3339()),
                ("timeMax", end.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("maxResults", MAX_EVENTS.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::upstream(SERVICE, e.to_string()))?;

        let events: EventsResponse = check_response_json(SERVICE, response).await?;
        Ok(events.items.into_iter().map(CalendarEvent::from).collect())
    }

    pub async fn insert_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> Result<CreatedEvent, AppError> {
        let url = format!(
            "{}/calendars/{}/events",
            API_BASE,
            urlencoding::encode(calendar_id)
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&event_body(draft, self.time_zone))
            .send()
            .await
            .map_err(|e| AppError::upstream(SERVICE, e.to_string()))?;

        let event: GoogleEvent = check_response_json(SERVICE, response).await?;
        let event = CalendarEvent::from(event);
        Ok(CreatedEvent {
            id: event.id,
            html_link: event.html_link,
            summary: event.summary,
            start: event.start,
            end: event.end,
        })
    }
}

/// Event to create, already validated.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub description: Option<String>,
    pub location: Option<String>,
}

/// Insert body with times expressed in the campus timezone.
pub fn event_body(draft: &EventDraft, tz: Tz) -> serde_json::Value {
    let mut body = serde_json::json!({
        "summary": draft.title,
        "start": {
            "dateTime": draft.start.with_timezone(&tz).to_rfc3339(),
            "timeZone": tz.name(),
        },
        "end": {
            "dateTime": draft.end.with_timezone(&tz).to_rfc3339(),
            "timeZone": tz.name(),
        },
    });
    if let Some(description) = &draft.description {
        body["description"] = serde_json::Value::String(description.clone());
    }
    if let Some(location) = &draft.location {
        body["location"] = serde_json::Value::String(location.clone());
    }
    body
}

/// Token endpoint response. `refresh_token` only comes with consent.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    pub fn expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| now + Duration::seconds(secs))
    }
}

#[derive(Deserialize)]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<GoogleCalendarEntry>,
}

#[derive(Deserialize)]
struct GoogleCalendarEntry {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    primary: bool,
    #[serde(rename = "timeZone", default)]
    time_zone: Option<String>,
}

impl From<GoogleCalendarEntry> for CalendarSummary {
    fn from(entry: GoogleCalendarEntry) -> Self {
        CalendarSummary {
            summary: entry.summary.unwrap_or_else(|| entry.id.clone()),
            id: entry.id,
            primary: entry.primary,
            time_zone: entry.time_zone,
        }
    }
}

#[derive(Deserialize)]
struct EventsResponse {
    #[serde(default)]
    items: Vec<GoogleEvent>,
}

#[derive(Deserialize)]
struct GoogleEvent {
    #[serde(default)]
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    start: EventTime,
    #[serde(default)]
    end: EventTime,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "htmlLink", default)]
    html_link: Option<String>,
}

/// Either `dateTime` (timed) or `date` (all-day).
#[derive(Default, Deserialize)]
struct EventTime {
    #[serde(rename = "dateTime", default)]
    date_time: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

impl From<GoogleEvent> for CalendarEvent {
    fn from(event: GoogleEvent) -> Self {
        let all_day = event.start.date_time.is_none() && event.start.date.is_some();
        CalendarEvent {
            id: event.id,
            summary: event.summary.unwrap_or_else(|| "(No title)".to_string()),
            start: event.start.date_time.or(event.start.date).unwrap_or_default(),
            end: event.end.date_time.or(event.end.date).unwrap_or_default(),
            all_day,
            location: event.location,
            description: event.description,
            html_link: event.html_link,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GoogleCalendarService - per-user token lifecycle and API calls
// ─────────────────────────────────────────────────────────────────────────────

/// Google Calendar operations on behalf of a stored user.
#[derive(Clone)]
pub struct GoogleCalendarService {
    client: GoogleCalendarClient,
    db: Database,
}

impl GoogleCalendarService {
    pub fn new(client: GoogleCalendarClient, db: Database) -> Self {
        Self { client, db }
    }

    pub fn client(&self) -> &GoogleCalendarClient {
        &self.client
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_configured()
    }

    /// Exchange the callback code and store the resulting tokens.
    pub async fn complete_oauth(&self, user_id: i64, code: &str) -> Result<(), AppError> {
        let tokens = self.client.exchange_code(code).await?;
        let expiry = tokens.expiry(Utc::now());

        self.db
            .set_google_tokens(
                user_id,
                &tokens.access_token,
                tokens.refresh_token.as_deref(),
                expiry,
            )
            .await?;

        tracing::info!(
            user_id,
            has_refresh_token = tokens.refresh_token.is_some(),
            "Google Calendar connected"
        );
        Ok(())
    }

    /// Access token valid for at least the refresh margin.
    ///
    /// Tokens without a recorded expiry are used as-is. A refreshed token is
    /// written back before it is returned.
    pub async fn valid_access_token(&self, user: &User) -> Result<String, AppError> {
        let access_token = user
            .google_access_token
            .as_deref()
            .ok_or(AppError::NotLinked("Google Calendar"))?;

        let now = Utc::now();
        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);
        let expiring = user
            .google_token_expiry
            .is_some_and(|expiry| now + margin >= expiry);

        if !expiring {
            return Ok(access_token.to_string());
        }

        let Some(refresh_token) = user.google_refresh_token.as_deref() else {
            tracing::warn!(user_id = user.id, "Google token expiring and no refresh token stored");
            return Ok(access_token.to_string());
        };

        tracing::info!(user_id = user.id, "Google access token expiring, refreshing");
        let refreshed = self.client.refresh_token(refresh_token).await?;
        self.db
            .update_google_access_token(user.id, &refreshed.access_token, refreshed.expiry(now))
            .await?;

        Ok(refreshed.access_token)
    }

    pub async fn calendars(&self, user: &User) -> Result<Vec<CalendarSummary>, AppError> {
        let token = self.valid_access_token(user).await?;
        self.client.list_calendars(&token).await
    }

    /// Events of the user's selected calendar in `[start, end)`.
    pub async fn events(
        &self,
        user: &User,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, AppError> {
        let token = self.valid_access_token(user).await?;
        self.client
            .list_events(&token, user.calendar_id(), start, end)
            .await
    }

    pub async fn create_event(
        &self,
        user: &User,
        draft: &EventDraft,
    ) -> Result<CreatedEvent, AppError> {
        let token = self.valid_access_token(user).await?;
        let created = self
            .client
            .insert_event(&token, user.calendar_id(), draft)
            .await?;
        tracing::info!(user_id = user.id, event_id = %created.id, "Calendar event created");
        Ok(created)
    }

    /// Revoke at Google, then forget the stored credentials.
    ///
    /// Revocation failures are logged; local credentials are always cleared.
    pub async fn disconnect(&self, user: &User) -> Result<(), AppError> {
        self.revoke_best_effort(user).await;
        self.db.clear_google_tokens(user.id).await?;
        tracing::info!(user_id = user.id, "Google Calendar disconnected");
        Ok(())
    }

    /// Revoke the user's grant, logging instead of failing.
    pub async fn revoke_best_effort(&self, user: &User) {
        let token = user
            .google_refresh_token
            .as_deref()
            .or(user.google_access_token.as_deref());
        if let Some(token) = token {
            if let Err(e) = self.client.revoke(token).await {
                tracing::warn!(user_id = user.id, error = %e, "Failed to revoke Google token");
            }
        }
    }
}
