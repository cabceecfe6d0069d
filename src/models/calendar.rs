// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Calendar models: Google Calendar events and imported feed events.

use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Event read from the user's Google Calendar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    /// RFC 3339 datetime, or `YYYY-MM-DD` for all-day events
    pub start: String,
    pub end: String,
    pub all_day: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
}

/// Entry from the user's calendar list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CalendarSummary {
    pub id: String,
    pub summary: String,
    pub primary: bool,
    #[serde(rename = "timeZone", skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// Result of inserting an event.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CreatedEvent {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    pub summary: String,
    pub start: String,
    pub end: String,
}

/// Classification of an imported feed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum FeedEventKind {
    Homework,
    Exam,
    Quiz,
    Lab,
    Project,
    Other,
}

impl FeedEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedEventKind::Homework => "homework",
            FeedEventKind::Exam => "exam",
            FeedEventKind::Quiz => "quiz",
            FeedEventKind::Lab => "lab",
            FeedEventKind::Project => "project",
            FeedEventKind::Other => "other",
        }
    }
}

/// One `VEVENT` from an iCalendar feed after parsing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct FeedEvent {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// ISO date or datetime
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub kind: FeedEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_code: Option<String>,
}
