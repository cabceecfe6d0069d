// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Canvas feed parsing through to stored syllabi.

use axum::{http::StatusCode, routing::get, Router};
use revos_server::config::Config;
use revos_server::models::FeedEventKind;
use revos_server::services::canvas::{
    course_codes, group_by_course, parse_feed, to_key_dates, IMPORTED_SEMESTER, MAX_FEED_BYTES,
    UNSORTED_COURSE,
};
use serde_json::json;

mod common;
use common::{
    create_app_with, create_test_app, create_user, empty_request, json_request, send, spawn_server,
};

/// Serve a feed at a Canvas-style path and return its URL.
async fn serve_feed(body: String) -> String {
    let router = Router::new().route("/feeds/calendars/user_42.ics", get(move || async move { body }));
    format!("{}/feeds/calendars/user_42.ics", spawn_server(router).await)
}

const FEED: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Instructure//Canvas//EN\r\n\
BEGIN:VEVENT\r\n\
SUMMARY:Homework 4 [CSCE-120-501]\r\n\
DTSTART:20251017T045900Z\r\n\
DESCRIPTION:Linked lists\\, part 2\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
SUMMARY:Midterm Exam [MATH 151]\r\n\
DTSTART;TZID=America/Chicago:20251020T190000\r\n\
LOCATION:ZACH 350\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
SUMMARY:Office hours\r\n\
DTSTART;VALUE=DATE:20251021\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
SUMMARY:Lab safety quiz\r\n\
DTSTART;VALUE=DATE:20251022\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

#[test]
fn test_feed_to_key_dates() {
    let events = parse_feed(FEED);
    assert_eq!(events.len(), 4);
    assert_eq!(events[0].kind, FeedEventKind::Homework);
    assert_eq!(events[0].description.as_deref(), Some("Linked lists, part 2"));
    assert_eq!(events[1].kind, FeedEventKind::Exam);
    assert_eq!(events[1].start.as_deref(), Some("2025-10-21T00:00:00Z"));
    assert_eq!(events[2].kind, FeedEventKind::Other);

    assert_eq!(course_codes(&events), vec!["CSCE 120", "MATH 151"]);

    let key_dates = to_key_dates(&events, chrono_tz::America::Chicago);
    assert_eq!(key_dates.len(), 3);
    // 04:59Z is still the previous evening on campus
    assert!(key_dates[0].date.starts_with("2025-10-16"));
    assert_eq!(key_dates[1].note.as_deref(), Some("ZACH 350"));
}

#[tokio::test]
async fn test_grouped_import_is_stored_per_course() {
    let (_, state) = create_test_app().await;
    let (user_id, _) = create_user(&state, "canvas").await;

    let events = parse_feed(FEED);
    let grouped = group_by_course(&events, chrono_tz::America::Chicago);
    let saved = state.db.insert_syllabi(user_id, &grouped).await.unwrap();
    assert_eq!(saved.len(), 3);

    let stored = state.db.list_syllabi(user_id).await.unwrap();
    let names: Vec<&str> = stored.iter().map(|s| s.course_name.as_str()).collect();
    assert!(names.contains(&"CSCE 120"));
    assert!(names.contains(&"MATH 151"));
    assert!(names.contains(&UNSORTED_COURSE));
    assert!(stored
        .iter()
        .all(|s| s.semester.as_deref() == Some(IMPORTED_SEMESTER)));
}

#[tokio::test]
async fn test_import_route_fetches_and_saves() {
    let feed_url = serve_feed(FEED.to_string()).await;
    let (app, state) = create_app_with(Config {
        canvas_allow_private_hosts: true,
        ..Config::test_default()
    })
    .await;
    let (_, token) = create_user(&state, "canvas").await;

    let (status, body) = send(
        &app,
        json_request("POST", "/api/canvas/import", Some(&token), json!({"calendar_url": feed_url})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 4);
    assert_eq!(body["saved"], 0);
    assert_eq!(body["courses"], json!(["CSCE 120", "MATH 151"]));
    assert_eq!(body["keyDates"].as_array().unwrap().len(), 3);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/canvas/import",
            Some(&token),
            json!({"calendar_url": feed_url, "save": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["saved"], 3);

    let (status, body) = send(&app, empty_request("GET", "/api/syllabus/list", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);
}

#[tokio::test]
async fn test_import_route_rejects_oversized_feed() {
    let mut huge = String::from("BEGIN:VCALENDAR\r\n");
    huge.push_str(&"X".repeat(MAX_FEED_BYTES));
    let feed_url = serve_feed(huge).await;
    let (app, state) = create_app_with(Config {
        canvas_allow_private_hosts: true,
        ..Config::test_default()
    })
    .await;
    let (_, token) = create_user(&state, "canvas").await;

    let (status, body) = send(
        &app,
        json_request("POST", "/api/canvas/import", Some(&token), json!({"calendar_url": feed_url})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "upstream_error");
}

#[tokio::test]
async fn test_import_route_rejects_non_calendar_body() {
    let feed_url = serve_feed("<html>Sign in</html>".to_string()).await;
    let (app, state) = create_app_with(Config {
        canvas_allow_private_hosts: true,
        ..Config::test_default()
    })
    .await;
    let (_, token) = create_user(&state, "canvas").await;

    let (status, _) = send(
        &app,
        json_request("POST", "/api/canvas/import", Some(&token), json!({"calendar_url": feed_url})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}
