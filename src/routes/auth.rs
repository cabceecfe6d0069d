// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account registration, login, and token verification.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, decode_jwt};
use crate::models::{User, UserResponse};
use crate::routes::json_body;
use crate::services::password::{hash_password_blocking, verify_password_blocking};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/verify", post(verify))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(default)]
    #[validate(length(min = 3, message = "Username must be at least 3 characters"))]
    username: String,
    #[serde(default)]
    #[validate(contains(pattern = "@", message = "Invalid email address"))]
    email: String,
    #[serde(default)]
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    token: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub message: String,
    pub user: UserResponse,
    pub token: String,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub user: UserResponse,
    pub token: String,
}

fn session_token(user: &User, signing_key: &[u8]) -> Result<String> {
    create_jwt(user.id, signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))
}

async fn register(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    let mut req = json_body(body)?;
    req.username = req.username.trim().to_string();
    req.email = req.email.trim().to_string();

    if req.username.is_empty() || req.email.is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest(
            "Username, email, and password are required".to_string(),
        ));
    }
    req.validate()?;

    let hash = hash_password_blocking(req.password).await?;
    let user = state
        .db
        .create_user(&req.username, &req.email, &hash)
        .await?;

    tracing::info!(user_id = user.id, username = %user.username, "User registered");

    let token = session_token(&user, &state.config.jwt_signing_key)?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            message: "User registered successfully".to_string(),
            user: user.to_response(),
            token,
        }),
    ))
}

async fn login(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>> {
    let req = json_body(body)?;
    let login = req.username.trim();

    if login.is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest(
            "Username and password are required".to_string(),
        ));
    }

    let Some(user) = state.db.find_user_by_login(login).await? else {
        tracing::info!("Login failed: unknown user");
        return Err(AppError::Unauthorized);
    };

    if !verify_password_blocking(req.password, user.password_hash.clone()).await? {
        tracing::info!(user_id = user.id, "Login failed: wrong password");
        return Err(AppError::Unauthorized);
    }

    tracing::info!(user_id = user.id, "User logged in");

    let token = session_token(&user, &state.config.jwt_signing_key)?;
    Ok(Json(SessionResponse {
        message: "Login successful".to_string(),
        user: user.to_response(),
        token,
    }))
}

async fn verify(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>> {
    let req = json_body(body)?;
    let token = req.token.trim();
    if token.is_empty() {
        return Err(AppError::BadRequest("Token is required".to_string()));
    }

    let user_id = decode_jwt(token, &state.config.jwt_signing_key)?;
    let user = state
        .db
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

    Ok(Json(VerifyResponse {
        valid: true,
        user: user.to_response(),
        token: token.to_string(),
    }))
}
