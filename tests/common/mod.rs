// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use revos_server::config::Config;
use revos_server::db::Database;
use revos_server::middleware::auth::create_jwt;
use revos_server::models::{KeyDate, NewSyllabus};
use revos_server::routes::create_router;
use revos_server::AppState;
use axum::{routing::post, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Create a test app on a private in-memory database.
/// All integrations are unconfigured.
#[allow(dead_code)]
pub async fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_app_with(Config::test_default()).await
}

#[allow(dead_code)]
pub async fn create_app_with(config: Config) -> (axum::Router, Arc<AppState>) {
    let db = Database::new_in_memory()
        .await
        .expect("Failed to open in-memory database");
    let state = Arc::new(AppState::new(config, db).expect("Failed to build state"));
    (create_router(state.clone()), state)
}

/// Create a test app whose chat model is served at `openai_base_url`.
#[allow(dead_code)]
pub async fn create_llm_app(openai_base_url: &str) -> (axum::Router, Arc<AppState>) {
    create_app_with(Config {
        openai_api_key: Some("sk-test".to_string()),
        openai_base_url: openai_base_url.to_string(),
        ..Config::test_default()
    })
    .await
}

/// Serve `router` on an ephemeral local port and return its base URL.
#[allow(dead_code)]
pub async fn spawn_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// What the stand-in model returns for an extraction prompt.
#[allow(dead_code)]
pub const MODEL_SYLLABUS_REPLY: &str = r#"Here is the syllabus:
{"course": "CSCE 120: Program Design and Concepts",
 "instructor": "Dr. Leyk",
 "semester": "Fall 2025",
 "keyDates": [
   {"date": "October 17, 2025", "event": "Midterm Exam 1", "type": "exam"},
   {"date": "September 12, 2025", "event": "Homework 1 due", "type": "homework"},
   {"date": "September 19, 2025", "event": "Lab 2", "type": "lab"}
 ],
 "topics": ["Pointers", "Classes"],
 "gradingBreakdown": [{"category": "Exams", "weight": 45}, {"category": "Homework", "weight": 55}]}"#;

/// Stand-in chat model. Extraction prompts get [`MODEL_SYLLABUS_REPLY`];
/// every other conversation is echoed back, one message per line.
#[allow(dead_code)]
pub async fn spawn_chat_model() -> String {
    async fn chat_completions(Json(request): Json<Value>) -> Json<Value> {
        let transcript = request["messages"]
            .as_array()
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(|m| m["content"].as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();
        let content = if transcript.contains("SYLLABUS TEXT:") {
            MODEL_SYLLABUS_REPLY.to_string()
        } else {
            transcript
        };
        Json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    spawn_server(axum::Router::new().route("/chat/completions", post(chat_completions))).await
}

/// Create a session token for `user_id` with the test signing key.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: i64) -> String {
    create_jwt(user_id, &Config::test_default().jwt_signing_key).unwrap()
}

/// Insert a user directly, skipping password hashing.
#[allow(dead_code)]
pub async fn create_user(state: &AppState, username: &str) -> (i64, String) {
    let user = state
        .db
        .create_user(username, &format!("{}@tamu.edu", username), "not-a-real-hash")
        .await
        .unwrap();
    (user.id, create_test_jwt(user.id))
}

#[allow(dead_code)]
pub fn key_date(date: &str, event: &str, kind: &str) -> KeyDate {
    KeyDate {
        date: date.to_string(),
        event: event.to_string(),
        kind: kind.to_string(),
        note: None,
    }
}

#[allow(dead_code)]
pub fn new_syllabus(course: &str) -> NewSyllabus {
    NewSyllabus {
        course_id: course.replace(' ', "_").to_lowercase(),
        course_name: course.to_string(),
        semester: Some("Fall 2025".to_string()),
        key_dates: vec![key_date("Oct 17", "Midterm Exam 1", "exam")],
        topics: vec!["Pointers".to_string()],
        ..Default::default()
    }
}

/// Build a JSON request, optionally authenticated.
#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Build a body-less request, optionally authenticated.
#[allow(dead_code)]
pub fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

/// Send a request and decode the JSON response body (Null when empty).
#[allow(dead_code)]
pub async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}
