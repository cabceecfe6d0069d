// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile and account deletion routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::UserResponse;
use crate::routes::current_user;
use crate::AppState;
use axum::{
    extract::State,
    routing::{delete, get},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/account", delete(delete_account))
}

// ─── User Profile ────────────────────────────────────────────

async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let user = current_user(&state, user.user_id).await?;
    Ok(Json(user.to_response()))
}

// ─── Account Deletion ────────────────────────────────────────

/// Response for account deletion.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DeleteAccountResponse {
    pub success: bool,
    pub message: String,
}

/// Delete the user's account and every syllabus they own.
///
/// Rows go in one transaction. Vectors and the Google grant are removed
/// afterwards; failures there are logged and do not fail the request.
async fn delete_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DeleteAccountResponse>> {
    tracing::info!(user_id = user.user_id, "User-initiated account deletion");

    let profile = current_user(&state, user.user_id).await?;
    let vector_ids: Vec<String> = state
        .db
        .list_syllabi(user.user_id)
        .await?
        .into_iter()
        .flat_map(|s| s.vector_ids)
        .collect();

    if !state.db.delete_user(user.user_id).await? {
        return Err(AppError::NotFound(format!("User {}", user.user_id)));
    }

    state.pinecone.delete_best_effort(&vector_ids).await;
    if profile.google_calendar_connected() && state.google_calendar.is_configured() {
        state.google_calendar.revoke_best_effort(&profile).await;
    }

    Ok(Json(DeleteAccountResponse {
        success: true,
        message: "Account and all associated data deleted.".to_string(),
    }))
}
