// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User model for storage and API.

use chrono::{DateTime, Utc};
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// User record stored in the `users` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    /// Unique handle
    pub username: String,
    /// Unique email address
    pub email: String,
    /// Argon2id PHC string
    pub password_hash: String,
    pub created_at: DateTime<Utc>,

    // Google Calendar link
    pub google_access_token: Option<String>,
    pub google_refresh_token: Option<String>,
    pub google_token_expiry: Option<DateTime<Utc>>,
    pub selected_calendar_id: Option<String>,

    // Plaid link
    pub plaid_access_token: Option<String>,
    pub plaid_item_id: Option<String>,
    pub plaid_institution: Option<String>,
}

impl User {
    pub fn google_calendar_connected(&self) -> bool {
        self.google_access_token.is_some()
    }

    pub fn bank_linked(&self) -> bool {
        self.plaid_access_token.is_some()
    }

    /// Calendar used for reads and event creation.
    pub fn calendar_id(&self) -> &str {
        self.selected_calendar_id.as_deref().unwrap_or("primary")
    }

    pub fn to_response(&self) -> UserResponse {
        UserResponse {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            created_at: self.created_at.to_rfc3339(),
            google_calendar_connected: self.google_calendar_connected(),
            selected_calendar_id: self.calendar_id().to_string(),
            bank_linked: self.bank_linked(),
        }
    }
}

/// Public view of a user. Never carries credentials.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: String,
    pub google_calendar_connected: bool,
    pub selected_calendar_id: String,
    pub bank_linked: bool,
}
