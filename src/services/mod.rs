// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod assistant;
pub mod canvas;
pub mod extract;
pub mod google_calendar;
pub mod openai;
pub mod password;
pub mod pinecone;
pub mod plaid;
pub mod syllabus;
pub mod triage;

pub use assistant::Assistant;
pub use canvas::CanvasClient;
pub use google_calendar::{GoogleCalendarClient, GoogleCalendarService};
pub use openai::{ChatMessage, OpenAiClient};
pub use pinecone::PineconeClient;
pub use plaid::PlaidClient;
pub use syllabus::SyllabusService;

use crate::error::AppError;
use serde::Deserialize;

/// Check response status and parse the JSON body.
///
/// 401 and 403 become the token-rejected upstream error so callers can tell
/// revoked credentials apart from other failures.
pub(crate) async fn check_response_json<T: for<'de> Deserialize<'de>>(
    service: &'static str,
    response: reqwest::Response,
) -> Result<T, AppError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            tracing::warn!(service, status = status.as_u16(), body = %body, "Upstream rejected credentials");
            return Err(AppError::upstream(service, AppError::UPSTREAM_TOKEN_REJECTED));
        }

        if status.as_u16() == 429 {
            tracing::warn!(service, "Upstream rate limit hit (429)");
        }

        return Err(AppError::upstream(service, format!("HTTP {}: {}", status, body)));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::upstream(service, format!("JSON parse error: {}", e)))
}
