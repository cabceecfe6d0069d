// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Assignment classification and deadline triage.
//!
//! Classification is a fixed ordered rule table over the lowercase title; the
//! first matching rule wins.

use crate::models::{AssignmentCategory, Priority, Syllabus, TriagedAssignment};
use crate::time_utils::{days_until, parse_key_date, year_in};
use chrono::{Datelike, NaiveDate};

/// Ordered title rules. Earlier rules shadow later ones.
const TITLE_RULES: &[(AssignmentCategory, &[&str])] = &[
    (
        AssignmentCategory::Exam,
        &["exam", "midterm", "final", "quiz", "test"],
    ),
    (AssignmentCategory::Lab, &["lab"]),
    (
        AssignmentCategory::Project,
        &["project", "milestone", "presentation", "pitch"],
    ),
    (AssignmentCategory::Reading, &["reading", "chapter"]),
    (
        AssignmentCategory::Activity,
        &["activity", "participation", "engagement", "attendance", "honors"],
    ),
    (
        AssignmentCategory::Submission,
        &["submission", "submit", "artifact", "deliverable"],
    ),
    (
        AssignmentCategory::Homework,
        &["homework", "hw", "assignment", "problem set"],
    ),
];

/// Map a declared key-date type to a category, if recognized.
fn declared_category(declared: &str) -> Option<AssignmentCategory> {
    let category = match declared.trim().to_lowercase().as_str() {
        "exam" | "quiz" | "test" | "midterm" | "final" => AssignmentCategory::Exam,
        "homework" | "hw" | "assignment" => AssignmentCategory::Homework,
        "lab" => AssignmentCategory::Lab,
        "project" | "milestone" => AssignmentCategory::Project,
        "activity" | "participation" => AssignmentCategory::Activity,
        "reading" => AssignmentCategory::Reading,
        "submission" => AssignmentCategory::Submission,
        _ => return None,
    };
    Some(category)
}

/// Classify an assignment by its declared type, falling back to its title.
pub fn classify(title: &str, declared_type: Option<&str>) -> AssignmentCategory {
    if let Some(category) = declared_type.and_then(declared_category) {
        return category;
    }

    let title = title.to_lowercase();
    TITLE_RULES
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| title.contains(n)))
        .map(|(category, _)| *category)
        .unwrap_or(AssignmentCategory::Homework)
}

/// Urgency from category and days left. Overdue work is high priority.
pub fn priority_for(category: AssignmentCategory, days_until: i64) -> Priority {
    if category == AssignmentCategory::Exam || days_until <= 3 {
        Priority::High
    } else if days_until <= 7 {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// Key dates across `syllabi` that fall in `[today, today + window_days]`,
/// ordered by due date then priority.
pub fn triage(syllabi: &[Syllabus], today: NaiveDate, window_days: u32) -> Vec<TriagedAssignment> {
    let window_days = i64::from(window_days);
    let mut out = Vec::new();

    for syllabus in syllabi {
        let fallback_year = syllabus
            .semester
            .as_deref()
            .and_then(year_in)
            .unwrap_or_else(|| today.year());

        for key_date in &syllabus.key_dates {
            let Some(due_date) = parse_key_date(&key_date.date, fallback_year) else {
                continue;
            };
            let days = days_until(due_date, today);
            if !(0..=window_days).contains(&days) {
                continue;
            }

            let category = classify(&key_date.event, Some(&key_date.kind));
            out.push(TriagedAssignment {
                syllabus_id: syllabus.id,
                course_id: syllabus.course_id.clone(),
                course_name: syllabus.course_name.clone(),
                title: key_date.event.clone(),
                date_text: key_date.date.clone(),
                due_date,
                days_until: days,
                category,
                priority: priority_for(category, days),
                note: key_date.note.clone(),
            });
        }
    }

    out.sort_by(|a, b| {
        a.due_date
            .cmp(&b.due_date)
            .then(a.priority.cmp(&b.priority))
            .then_with(|| a.course_name.cmp(&b.course_name))
    });
    out
}

/// Markdown bullet list of triaged work, one line per item.
pub fn format_assignments(assignments: &[TriagedAssignment]) -> String {
    if assignments.is_empty() {
        return "No upcoming assignments found.".to_string();
    }
    assignments
        .iter()
        .map(|a| {
            format!(
                "- [{}] {}: {} ({}, due {} / {} day(s))",
                a.priority,
                a.course_name,
                a.title,
                a.category,
                a.due_date.format("%a %b %-d"),
                a.days_until
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
