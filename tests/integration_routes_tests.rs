// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Calendar, Canvas and Plaid routes up to the point where they would call out.

use axum::http::{header, StatusCode};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use revos_server::config::Config;
use revos_server::db::Database;
use revos_server::routes::create_router;
use revos_server::AppState;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

mod common;
use common::{create_test_app, create_user, empty_request, json_request, send};

/// App with Google and Plaid credentials set. Nothing here reaches either API.
async fn create_linked_app() -> (axum::Router, Arc<AppState>) {
    let config = Config {
        google_client_id: Some("client-id.apps.googleusercontent.com".to_string()),
        google_client_secret: Some("google-secret".to_string()),
        plaid_client_id: Some("plaid-client".to_string()),
        plaid_secret: Some("plaid-secret".to_string()),
        ..Config::test_default()
    };
    let db = Database::new_in_memory().await.unwrap();
    let state = Arc::new(AppState::new(config, db).unwrap());
    (create_router(state.clone()), state)
}

async fn oauth_state(app: &axum::Router, token: &str) -> String {
    let (status, body) = send(app, empty_request("GET", "/api/calendar/connect", Some(token))).await;
    assert_eq!(status, StatusCode::OK);

    let auth_url = reqwest::Url::parse(body["auth_url"].as_str().unwrap()).unwrap();
    assert_eq!(auth_url.host_str(), Some("accounts.google.com"));
    auth_url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

#[tokio::test]
async fn test_calendar_unconfigured() {
    let (app, state) = create_test_app().await;
    let (_, token) = create_user(&state, "alice").await;

    let (status, _) = send(&app, empty_request("GET", "/api/calendar/connect", Some(&token))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send(&app, empty_request("GET", "/api/calendar/list", Some(&token))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_calendar_callback_error_redirects() {
    let (app, state) = create_linked_app().await;
    let (_, token) = create_user(&state, "alice").await;
    let oauth_state = oauth_state(&app, &token).await;

    let response = app
        .clone()
        .oneshot(empty_request(
            "GET",
            &format!("/api/calendar/callback?state={}&error=access_denied", oauth_state),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "http://localhost:5173/settings?calendar=error"
    );
}

#[tokio::test]
async fn test_calendar_callback_rejects_bad_state() {
    let (app, state) = create_linked_app().await;
    let (_, token) = create_user(&state, "alice").await;
    let oauth_state = oauth_state(&app, &token).await;

    // Swap the user id while keeping the signature
    let decoded = String::from_utf8(URL_SAFE_NO_PAD.decode(&oauth_state).unwrap()).unwrap();
    let (_, rest) = decoded.split_once('|').unwrap();
    let forged = URL_SAFE_NO_PAD.encode(format!("999|{}", rest));

    for uri in [
        format!("/api/calendar/callback?code=abc&state={}", forged),
        "/api/calendar/callback?code=abc&state=garbage".to_string(),
        "/api/calendar/callback?code=abc".to_string(),
    ] {
        let (status, body) = send(&app, empty_request("GET", &uri, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "uri: {uri}");
        assert_eq!(body["error"], "bad_request");
    }

    // Valid state but no code
    let (status, _) = send(
        &app,
        empty_request("GET", &format!("/api/calendar/callback?state={}", oauth_state), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_calendar_requires_link() {
    let (app, state) = create_linked_app().await;
    let (_, token) = create_user(&state, "alice").await;

    let (status, body) = send(&app, empty_request("GET", "/api/calendar/events", Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "not_linked");

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/calendar/events",
            Some(&token),
            json!({
                "title": "Study session",
                "start_time": "2025-10-14T15:00:00-05:00",
                "end_time": "2025-10-14T16:00:00-05:00"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "not_linked");

    // Disconnect without a link still clears cleanly
    let (status, _) = send(&app, empty_request("POST", "/api/calendar/disconnect", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_calendar_input_validation() {
    let (app, state) = create_linked_app().await;
    let (_, token) = create_user(&state, "alice").await;

    let (status, _) = send(
        &app,
        json_request("POST", "/api/calendar/select", Some(&token), json!({"calendar_id": " "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        empty_request("GET", "/api/calendar/events?start=yesterday", Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/calendar/events",
            Some(&token),
            json!({
                "title": "Backwards",
                "start_time": "2025-10-14T16:00:00Z",
                "end_time": "2025-10-14T15:00:00Z"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_canvas_import_rejects_bad_urls() {
    let (app, state) = create_test_app().await;
    let (_, token) = create_user(&state, "alice").await;

    for url in [
        "",
        "not a url",
        "ftp://canvas.tamu.edu/feeds/calendars/user_1.ics",
        "file:///etc/passwd",
        "https://canvas.tamu.edu/courses/1/assignments",
    ] {
        let (status, _) = send(
            &app,
            json_request("POST", "/api/canvas/import", Some(&token), json!({"calendar_url": url})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "url: {url}");
    }
}

#[tokio::test]
async fn test_canvas_import_refuses_internal_hosts() {
    let (app, state) = create_test_app().await;
    let (_, token) = create_user(&state, "alice").await;

    for url in [
        "http://169.254.169.254/latest/meta-data/",
        "http://169.254.169.254/feeds/calendars/user_1.ics",
        "http://127.0.0.1:5000/api/health",
        "http://127.0.0.1:5000/feeds/calendars/user_1.ics",
        "http://localhost/feeds/calendars/user_1.ics",
        "http://10.1.2.3/feeds/calendars/user_1.ics",
        "http://[::1]:8080/feeds/calendars/user_1.ics",
    ] {
        let (status, body) = send(
            &app,
            json_request("POST", "/api/canvas/import", Some(&token), json!({"calendar_url": url})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "url: {url}");
        assert_eq!(body["error"], "bad_request");
    }
}

#[tokio::test]
async fn test_plaid_unconfigured() {
    let (app, state) = create_test_app().await;
    let (_, token) = create_user(&state, "alice").await;

    for (method, uri) in [
        ("POST", "/api/plaid/link-token"),
        ("GET", "/api/plaid/accounts"),
        ("GET", "/api/plaid/insights"),
    ] {
        let (status, _) = send(&app, empty_request(method, uri, Some(&token))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "uri: {uri}");
    }
}

#[tokio::test]
async fn test_plaid_not_linked() {
    let (app, state) = create_linked_app().await;
    let (_, token) = create_user(&state, "alice").await;

    for uri in [
        "/api/plaid/accounts",
        "/api/plaid/transactions",
        "/api/plaid/insights",
        "/api/plaid/recurring",
    ] {
        let (status, body) = send(&app, empty_request("GET", uri, Some(&token))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "uri: {uri}");
        assert_eq!(body["error"], "not_linked");
    }

    let (status, _) = send(
        &app,
        json_request("POST", "/api/plaid/exchange", Some(&token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_plaid_transaction_query_validation() {
    let (app, state) = create_linked_app().await;
    let (_, token) = create_user(&state, "alice").await;

    for query in [
        "limit=0",
        "limit=501",
        "start_date=2025-13-01",
        "start_date=2025-10-10&end_date=2025-10-01",
    ] {
        let (status, body) = send(
            &app,
            empty_request("GET", &format!("/api/plaid/transactions?{}", query), Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "query: {query}");
        assert_eq!(body["error"], "bad_request");
    }
}
