// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Triaged assignment model.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Kind of graded work a key date refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum AssignmentCategory {
    Exam,
    Homework,
    Lab,
    Project,
    Activity,
    Reading,
    Submission,
}

impl AssignmentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentCategory::Exam => "exam",
            AssignmentCategory::Homework => "homework",
            AssignmentCategory::Lab => "lab",
            AssignmentCategory::Project => "project",
            AssignmentCategory::Activity => "activity",
            AssignmentCategory::Reading => "reading",
            AssignmentCategory::Submission => "submission",
        }
    }
}

impl fmt::Display for AssignmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency bucket. Ordering puts `High` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key date resolved to a calendar day and ranked.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TriagedAssignment {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub syllabus_id: i64,
    pub course_id: String,
    pub course_name: String,
    pub title: String,
    /// Date text as written in the source
    pub date_text: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub due_date: NaiveDate,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub days_until: i64,
    pub category: AssignmentCategory,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
