// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Syllabus model: a parsed course record owned by one user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A dated event extracted from a syllabus or an imported calendar feed.
///
/// Entries are free-form: `date` is whatever text the source used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct KeyDate {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub event: String,
    /// exam, quiz, homework, lab, project, other
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

fn default_kind() -> String {
    "other".to_string()
}

/// One weighted grading category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct GradingCategory {
    #[validate(length(min = 1, message = "category must not be empty"))]
    pub category: String,
    #[validate(range(min = 0.0, max = 100.0, message = "weight must be between 0 and 100"))]
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl GradingCategory {
    pub fn weight_in_range(&self) -> bool {
        (0.0..=100.0).contains(&self.weight)
    }
}

/// Stored syllabus as returned by the API.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Syllabus {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub user_id: i64,
    pub course_id: String,
    pub course_name: String,
    pub instructor: Option<String>,
    pub semester: Option<String>,
    #[serde(rename = "keyDates")]
    pub key_dates: Vec<KeyDate>,
    pub topics: Vec<String>,
    #[serde(rename = "gradingBreakdown")]
    pub grading_breakdown: Vec<GradingCategory>,
    pub vector_ids: Vec<String>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to insert a syllabus.
#[derive(Debug, Clone, Default)]
pub struct NewSyllabus {
    pub course_id: String,
    pub course_name: String,
    pub instructor: Option<String>,
    pub semester: Option<String>,
    pub key_dates: Vec<KeyDate>,
    pub topics: Vec<String>,
    pub grading_breakdown: Vec<GradingCategory>,
    pub vector_ids: Vec<String>,
}

/// Normalized output of the language-model syllabus parser.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedSyllabus {
    pub course: String,
    pub instructor: String,
    pub semester: String,
    #[serde(rename = "keyDates")]
    pub key_dates: Vec<KeyDate>,
    pub topics: Vec<String>,
    #[serde(rename = "gradingBreakdown")]
    pub grading_breakdown: Vec<GradingCategory>,
}

pub const UNKNOWN_COURSE: &str = "Unknown Course";
pub const UNKNOWN_INSTRUCTOR: &str = "Unknown Instructor";
pub const UNKNOWN_SEMESTER: &str = "Unknown Semester";

impl Default for ParsedSyllabus {
    fn default() -> Self {
        Self {
            course: UNKNOWN_COURSE.to_string(),
            instructor: UNKNOWN_INSTRUCTOR.to_string(),
            semester: UNKNOWN_SEMESTER.to_string(),
            key_dates: Vec::new(),
            topics: Vec::new(),
            grading_breakdown: Vec::new(),
        }
    }
}

impl ParsedSyllabus {
    /// Number of exam entries among the key dates.
    pub fn exam_count(&self) -> usize {
        self.key_dates.iter().filter(|d| d.kind == "exam").count()
    }

    /// Number of homework, project and lab entries among the key dates.
    pub fn assignment_count(&self) -> usize {
        self.key_dates
            .iter()
            .filter(|d| matches!(d.kind.as_str(), "homework" | "project" | "lab"))
            .count()
    }

    /// Storage identifier derived from the course title.
    pub fn course_id(&self) -> String {
        course_id_for(&self.course)
    }
}

/// `"CSCE 120: Program-Design"` → `"csce_120:_program_design"`.
pub fn course_id_for(course: &str) -> String {
    course.replace([' ', '-'], "_").to_lowercase()
}
