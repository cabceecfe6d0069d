// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API authentication, CORS and health tests.
//!
//! These tests verify that:
//! 1. Protected routes reject requests without valid tokens
//! 2. Header and cookie sessions are both accepted
//! 3. CORS preflight requests return correct headers

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use revos_server::config::Config;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

mod common;
use common::{create_test_app, create_user, empty_request, send};

/// Token with arbitrary expiry, signed with the test key.
fn jwt_with_exp(user_id: i64, exp: usize) -> String {
    #[derive(Serialize)]
    struct Claims {
        sub: String,
        exp: usize,
        iat: usize,
    }

    let claims = Claims {
        sub: user_id.to_string(),
        exp,
        iat: 0,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(&Config::test_default().jwt_signing_key),
    )
    .unwrap()
}

#[tokio::test]
async fn test_protected_route_without_token() {
    let (app, _) = create_test_app().await;

    let (status, body) = send(&app, empty_request("GET", "/api/syllabus/list", None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_protected_route_with_invalid_token() {
    let (app, _) = create_test_app().await;

    let (status, body) = send(
        &app,
        empty_request("GET", "/api/syllabus/list", Some("invalid.token.here")),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn test_protected_route_with_expired_token() {
    let (app, state) = create_test_app().await;
    let (user_id, _) = create_user(&state, "expired").await;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize;

    let token = jwt_with_exp(user_id, now - 3600);
    let (status, body) = send(&app, empty_request("GET", "/api/me", Some(&token))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn test_protected_route_with_valid_token() {
    let (app, state) = create_test_app().await;
    let (user_id, token) = create_user(&state, "valid").await;

    let (status, body) = send(&app, empty_request("GET", "/api/me", Some(&token))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], user_id);
    assert_eq!(body["username"], "valid");
    assert_eq!(body["selected_calendar_id"], "primary");
}

#[tokio::test]
async fn test_session_cookie_accepted() {
    let (app, state) = create_test_app().await;
    let (_, token) = create_user(&state, "cookie").await;

    let request = Request::builder()
        .method("GET")
        .uri("/api/me")
        .header(header::COOKIE, format!("revos_token={}", token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "cookie");
}

#[tokio::test]
async fn test_token_for_deleted_user_is_not_found() {
    let (app, _) = create_test_app().await;
    let token = common::create_test_jwt(999);

    let (status, _) = send(&app, empty_request("GET", "/api/me", Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_preflight() {
    let (app, _) = create_test_app().await;

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/syllabus/list")
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app, request).await.unwrap();

    // OPTIONS should return 200 (CORS preflight success)
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:5173"
    );
    assert!(headers.contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
        "true"
    );
}

#[tokio::test]
async fn test_health_degraded_without_integrations() {
    let (app, _) = create_test_app().await;

    for uri in ["/health", "/api/health"] {
        let response = tower::ServiceExt::oneshot(app.clone(), empty_request("GET", uri, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["database"], true);
        assert_eq!(body["openai"], false);
        assert_eq!(body["plaid"], false);
    }
}
