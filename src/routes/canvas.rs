// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{FeedEvent, KeyDate};
use crate::routes::json_body;
use crate::services::canvas::{course_codes, group_by_course, parse_feed, to_key_dates};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/canvas/import", post(import))
}

#[derive(Deserialize)]
pub struct ImportRequest {
    #[serde(default)]
    calendar_url: String,
    #[serde(default)]
    save: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub events: Vec<FeedEvent>,
    pub key_dates: Vec<KeyDate>,
    pub courses: Vec<String>,
    pub count: usize,
    /// Syllabi created, zero unless `save` was set
    pub saved: usize,
}

async fn import(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: std::result::Result<Json<ImportRequest>, JsonRejection>,
) -> Result<Json<ImportResponse>> {
    let req = json_body(body)?;
    let url = state.canvas.validate_url(&req.calendar_url)?;

    let feed = state.canvas.fetch_feed(&url).await?;
    let events = parse_feed(&feed);
    let tz = state.config.campus_timezone;

    let saved = if req.save {
        let syllabi = group_by_course(&events, tz);
        state.db.insert_syllabi(user.user_id, &syllabi).await?.len()
    } else {
        0
    };

    tracing::info!(
        user_id = user.user_id,
        events = events.len(),
        saved,
        "Imported Canvas calendar feed"
    );

    Ok(Json(ImportResponse {
        key_dates: to_key_dates(&events, tz),
        courses: course_codes(&events),
        count: events.len(),
        saved,
        events,
    }))
}
