// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! "Rev" assistant: question answering and generated study material.
//!
//! Prompt builders are plain functions over stored data; [`Assistant`] adds
//! retrieval and the model call.

use crate::db::Database;
use crate::error::AppError;
use crate::models::syllabus::course_id_for;
use crate::models::{CalendarEvent, SpendingInsights, Syllabus, TriagedAssignment};
use crate::services::openai::{ChatMessage, OpenAiClient};
use crate::services::pinecone::{owner_filter, PineconeClient, VectorMatch};
use crate::services::triage::format_assignments;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

pub const PERSONA: &str = "You are Rev, the Texas A&M mascot and a friendly study assistant. \
Help students with academic questions using the provided syllabus information. \
Be accurate, encouraging, and concise. If the information is not in the provided context, say so.";

/// Chunks retrieved per question.
pub const ASK_TOP_K: u32 = 5;
const ASK_MAX_TOKENS: u32 = 500;
const WORKSHEET_MAX_TOKENS: u32 = 2000;
const STUDY_PLAN_MAX_TOKENS: u32 = 1500;
const RECOMMENDATIONS_MAX_TOKENS: u32 = 1000;
const WEEKLY_MAX_TOKENS: u32 = 1200;
const TEMPERATURE: f32 = 0.7;

/// Upper bound on context characters built from stored syllabi.
const CONTEXT_CHARS: usize = 6000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

/// Retrieved chunk cited in an answer.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_name: Option<String>,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub response: String,
    pub sources: Vec<Source>,
}

/// Inputs to the weekly review.
pub struct WeeklyDigest<'a> {
    pub syllabi: &'a [Syllabus],
    pub assignments: &'a [TriagedAssignment],
    pub events: &'a [CalendarEvent],
    pub spending: Option<&'a SpendingInsights>,
}

/// Course scope of a question.
///
/// A course code such as `CSCE 120` matches the stored
/// `CSCE 120: Program Design and Concepts`, as does any case-insensitive
/// piece of the course name.
#[derive(Debug, Clone)]
pub struct CourseFilter {
    id_prefix: String,
    name: String,
}

impl CourseFilter {
    /// `None` for a blank filter.
    pub fn new(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        Some(Self {
            id_prefix: course_id_for(raw),
            name: raw.to_lowercase(),
        })
    }

    pub fn matches(&self, course_id: &str, course_name: &str) -> bool {
        let id_match = course_id
            .strip_prefix(&self.id_prefix)
            .is_some_and(|rest| !rest.starts_with(|c: char| c.is_ascii_alphanumeric()));
        id_match || course_name.to_lowercase().contains(&self.name)
    }
}

/// Items in scope, or every item when none is.
fn scoped<T>(items: Vec<T>, in_scope: impl Fn(&T) -> bool) -> Vec<T> {
    if !items.iter().any(&in_scope) {
        return items;
    }
    items.into_iter().filter(|item| in_scope(item)).collect()
}

/// Compact plain-text view of stored syllabi, truncated to a fixed budget.
pub fn syllabus_context(syllabi: &[Syllabus]) -> String {
    if syllabi.is_empty() {
        return "No syllabi uploaded yet.".to_string();
    }

    let mut out = String::new();
    for s in syllabi {
        let _ = writeln!(
            out,
            "Course: {} | Instructor: {} | Semester: {}",
            s.course_name,
            s.instructor.as_deref().unwrap_or("Unknown"),
            s.semester.as_deref().unwrap_or("Unknown"),
        );
        for kd in &s.key_dates {
            let _ = writeln!(out, "• {} on {} ({})", kd.event, kd.date, kd.kind);
        }
        if !s.topics.is_empty() {
            let _ = writeln!(out, "Topics: {}", s.topics.join(", "));
        }
        if !s.grading_breakdown.is_empty() {
            let grading: Vec<String> = s
                .grading_breakdown
                .iter()
                .map(|g| format!("{} {}%", g.category, g.weight))
                .collect();
            let _ = writeln!(out, "Grading: {}", grading.join(", "));
        }
        out.push('\n');
    }

    if out.chars().count() > CONTEXT_CHARS {
        out = out.chars().take(CONTEXT_CHARS).collect();
    }
    out
}

/// Bullet list of retrieved chunk texts.
pub fn match_context(matches: &[VectorMatch]) -> String {
    let lines: Vec<String> = matches
        .iter()
        .filter_map(|m| m.metadata.as_ref().and_then(|md| md.text.as_deref()))
        .map(|text| format!("• {}", text))
        .collect();
    if lines.is_empty() {
        "No info found".to_string()
    } else {
        lines.join("\n")
    }
}

pub fn ask_messages(query: &str, context: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(PERSONA),
        ChatMessage::system(format!("Info:\n{}", context)),
        ChatMessage::user(query),
    ]
}

pub fn worksheet_messages(
    topic: &str,
    syllabus: Option<&Syllabus>,
    num_questions: u8,
    difficulty: Difficulty,
) -> Vec<ChatMessage> {
    let course = match syllabus {
        Some(s) => format!(
            "The worksheet is for {}. Course topics: {}.",
            s.course_name,
            if s.topics.is_empty() {
                "not listed".to_string()
            } else {
                s.topics.join(", ")
            }
        ),
        None => "No specific course was selected.".to_string(),
    };

    let prompt = format!(
        "Create a {difficulty} practice worksheet on \"{topic}\" with exactly {num_questions} questions.\n\
         {course}\n\n\
         Format it in markdown with a title, numbered questions mixing conceptual and applied problems, \
         and an \"Answer Key\" section at the end with a short explanation for each answer.",
        difficulty = difficulty.as_str(),
    );

    vec![ChatMessage::system(PERSONA), ChatMessage::user(prompt)]
}

pub fn study_plan_messages(
    syllabi: &[Syllabus],
    assignments: &[TriagedAssignment],
    days: u32,
    hours_per_day: f32,
) -> Vec<ChatMessage> {
    let prompt = format!(
        "Build a day-by-day study plan for the next {days} day(s) with about {hours_per_day} hour(s) of study per day.\n\n\
         Upcoming deadlines:\n{}\n\n\
         Courses:\n{}\n\
         Prioritize exams and items due soonest. Give each day a heading, time blocks, and a concrete goal. \
         Use markdown.",
        format_assignments(assignments),
        syllabus_context(syllabi),
    );

    vec![ChatMessage::system(PERSONA), ChatMessage::user(prompt)]
}

pub fn recommendation_messages(
    syllabi: &[Syllabus],
    interests: &[String],
    query: Option<&str>,
) -> Vec<ChatMessage> {
    let courses: Vec<&str> = syllabi.iter().map(|s| s.course_name.as_str()).collect();
    let courses = if courses.is_empty() {
        "none uploaded".to_string()
    } else {
        courses.join(", ")
    };
    let interests = if interests.is_empty() {
        "not specified".to_string()
    } else {
        interests.join(", ")
    };

    let mut prompt = format!(
        "Recommend Texas A&M campus resources for this student.\n\
         Courses: {courses}\nInterests: {interests}\n\n\
         Include tutoring and help sessions relevant to their courses, student organizations that match \
         their interests, and good study spots on campus. Use markdown sections with short bullet points."
    );
    if let Some(query) = query {
        let _ = write!(prompt, "\n\nThe student also asked: {}", query);
    }

    vec![ChatMessage::system(PERSONA), ChatMessage::user(prompt)]
}

/// Plain-text digest of the coming week, used as the model's context.
pub fn digest_context(digest: &WeeklyDigest<'_>) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "## Assignments due this week");
    let _ = writeln!(out, "{}", format_assignments(digest.assignments));

    let _ = writeln!(out, "\n## Calendar events");
    if digest.events.is_empty() {
        let _ = writeln!(out, "No calendar events.");
    }
    for event in digest.events {
        let _ = write!(out, "- {} ({} to {})", event.summary, event.start, event.end);
        if let Some(location) = &event.location {
            let _ = write!(out, " at {}", location);
        }
        out.push('\n');
    }

    let _ = writeln!(out, "\n## Spending (last 7 days)");
    match digest.spending {
        Some(spending) => {
            let _ = writeln!(
                out,
                "Total ${:.2} over {} transaction(s).",
                spending.total_spending, spending.transaction_count
            );
            for category in &spending.top_categories {
                let _ = writeln!(out, "- {}: ${:.2}", category.category, category.amount);
            }
        }
        None => {
            let _ = writeln!(out, "No bank account linked.");
        }
    }
    out
}

pub fn weekly_messages(digest: &WeeklyDigest<'_>) -> Vec<ChatMessage> {
    let prompt = format!(
        "Write this student's weekly review in markdown. Summarize what is due, flag conflicts between \
         deadlines and events, suggest when to study for each course, and add one budgeting tip if \
         spending data is present.\n\n{}\n\nCourses:\n{}",
        digest_context(digest),
        syllabus_context(digest.syllabi),
    );
    vec![ChatMessage::system(PERSONA), ChatMessage::user(prompt)]
}

/// Assistant over the LLM, the vector index, and stored syllabi.
#[derive(Clone)]
pub struct Assistant {
    openai: OpenAiClient,
    pinecone: PineconeClient,
    db: Database,
}

impl Assistant {
    pub fn new(openai: OpenAiClient, pinecone: PineconeClient, db: Database) -> Self {
        Self {
            openai,
            pinecone,
            db,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.openai.is_configured()
    }

    /// Answer a question from the caller's indexed chunks, or from their
    /// stored syllabi when the index is unavailable or has nothing.
    pub async fn ask(
        &self,
        user_id: i64,
        query: &str,
        course_filter: Option<&str>,
    ) -> Result<Answer, AppError> {
        if !self.openai.is_configured() {
            return Err(AppError::ServiceUnavailable(
                "OpenAI is not configured".to_string(),
            ));
        }
        let filter = course_filter.and_then(CourseFilter::new);
        // A course filter re-ranks a wider candidate set.
        let top_k = if filter.is_some() { ASK_TOP_K * 4 } else { ASK_TOP_K };

        let mut matches = if self.pinecone.is_configured() {
            let embedding = self.openai.embed(query).await?;
            self.pinecone
                .query(&embedding, top_k, owner_filter(user_id, None))
                .await?
        } else {
            Vec::new()
        };
        if let Some(filter) = &filter {
            matches = scoped(matches, |m| {
                m.metadata.as_ref().is_some_and(|meta| {
                    filter.matches(
                        meta.course_id.as_deref().unwrap_or(""),
                        meta.course_name.as_deref().unwrap_or(""),
                    )
                })
            });
        }
        matches.truncate(ASK_TOP_K as usize);

        let context = if matches.is_empty() {
            let mut syllabi: Vec<Syllabus> = self.db.list_syllabi(user_id).await?;
            if let Some(filter) = &filter {
                syllabi = scoped(syllabi, |s| filter.matches(&s.course_id, &s.course_name));
            }
            tracing::debug!(user_id, syllabi = syllabi.len(), "Answering from stored syllabi");
            syllabus_context(&syllabi)
        } else {
            match_context(&matches)
        };

        let response = self
            .openai
            .chat(&ask_messages(query, &context), ASK_MAX_TOKENS, TEMPERATURE)
            .await?;

        let sources = matches
            .into_iter()
            .map(|m| {
                let metadata = m.metadata.unwrap_or_default();
                Source {
                    course_id: metadata.course_id,
                    course_name: metadata.course_name,
                    score: m.score,
                }
            })
            .collect();

        tracing::info!(user_id, course = ?course_filter, "Answered question");
        Ok(Answer { response, sources })
    }

    pub async fn worksheet(
        &self,
        topic: &str,
        syllabus: Option<&Syllabus>,
        num_questions: u8,
        difficulty: Difficulty,
    ) -> Result<String, AppError> {
        let messages = worksheet_messages(topic, syllabus, num_questions, difficulty);
        self.openai
            .chat(&messages, WORKSHEET_MAX_TOKENS, TEMPERATURE)
            .await
    }

    pub async fn study_plan(
        &self,
        syllabi: &[Syllabus],
        assignments: &[TriagedAssignment],
        days: u32,
        hours_per_day: f32,
    ) -> Result<String, AppError> {
        let messages = study_plan_messages(syllabi, assignments, days, hours_per_day);
        self.openai
            .chat(&messages, STUDY_PLAN_MAX_TOKENS, TEMPERATURE)
            .await
    }

    pub async fn recommendations(
        &self,
        syllabi: &[Syllabus],
        interests: &[String],
        query: Option<&str>,
    ) -> Result<String, AppError> {
        let messages = recommendation_messages(syllabi, interests, query);
        self.openai
            .chat(&messages, RECOMMENDATIONS_MAX_TOKENS, TEMPERATURE)
            .await
    }

    pub async fn weekly_review(&self, digest: &WeeklyDigest<'_>) -> Result<String, AppError> {
        self.openai
            .chat(&weekly_messages(digest), WEEKLY_MAX_TOKENS, TEMPERATURE)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssignmentCategory, GradingCategory, KeyDate, Priority};
    use crate::services::pinecone::MatchMetadata;
    use chrono::{NaiveDate, Utc};

    fn syllabus() -> Syllabus {
        Syllabus {
            id: 1,
            user_id: 1,
            course_id: "csce_120".to_string(),
            course_name: "CSCE 120".to_string(),
            instructor: Some("Dr. Leyk".to_string()),
            semester: Some("Fall 2025".to_string()),
            key_dates: vec![KeyDate {
                date: "October 17, 2025".to_string(),
                event: "Exam 2".to_string(),
                kind: "exam".to_string(),
                note: None,
            }],
            topics: vec!["Pointers".to_string(), "Classes".to_string()],
            grading_breakdown: vec![GradingCategory {
                category: "Exams".to_string(),
                weight: 45.0,
                note: None,
            }],
            vector_ids: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_syllabus_context() {
        let context = syllabus_context(&[syllabus()]);
        assert!(context.contains("Course: CSCE 120 | Instructor: Dr. Leyk"));
        assert!(context.contains("• Exam 2 on October 17, 2025 (exam)"));
        assert!(context.contains("Topics: Pointers, Classes"));
        assert!(context.contains("Exams 45%"));

        assert_eq!(syllabus_context(&[]), "No syllabi uploaded yet.");
    }

    #[test]
    fn test_course_filter_matches_code_and_name() {
        let filter = CourseFilter::new("CSCE 120").unwrap();
        let title = "CSCE 120: Program Design and Concepts";
        assert!(filter.matches(&course_id_for(title), title));
        assert!(filter.matches("csce_120", "CSCE 120"));
        assert!(filter.matches("csce_120_501", ""));
        assert!(!filter.matches("csce_1201", "Special Topics"));
        assert!(!filter.matches("math_151", "MATH 151: Engineering Mathematics I"));

        let by_name = CourseFilter::new("program design").unwrap();
        assert!(by_name.matches(&course_id_for(title), title));

        assert!(CourseFilter::new("   ").is_none());
    }

    #[test]
    fn test_scoped_falls_back_to_everything() {
        let filter = CourseFilter::new("CSCE 120").unwrap();
        let courses = vec![
            ("csce_120:_program_design", "CSCE 120: Program Design"),
            ("math_151", "MATH 151"),
        ];

        let hit = scoped(courses.clone(), |(id, name)| filter.matches(id, name));
        assert_eq!(hit, vec![courses[0]]);

        let other = CourseFilter::new("HIST 105").unwrap();
        let miss = scoped(courses.clone(), |(id, name)| other.matches(id, name));
        assert_eq!(miss, courses);
    }

    #[test]
    fn test_match_context_skips_missing_text() {
        let matches = vec![
            VectorMatch {
                id: "a_0".to_string(),
                score: 0.9,
                metadata: Some(MatchMetadata {
                    text: Some("CSCE 120: Exam 2 on Oct 17".to_string()),
                    ..Default::default()
                }),
            },
            VectorMatch {
                id: "a_1".to_string(),
                score: 0.4,
                metadata: None,
            },
        ];
        assert_eq!(match_context(&matches), "• CSCE 120: Exam 2 on Oct 17");
        assert_eq!(match_context(&[]), "No info found");
    }

    #[test]
    fn test_ask_messages_shape() {
        let messages = ask_messages("When is exam 2?", "• Exam 2 on Oct 17");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert!(messages[1].content.starts_with("Info:\n"));
        assert_eq!(messages[2].role, "user");
    }

    #[test]
    fn test_worksheet_prompt() {
        let s = syllabus();
        let messages = worksheet_messages("recursion", Some(&s), 8, Difficulty::Hard);
        let prompt = &messages[1].content;
        assert!(prompt.contains("hard practice worksheet on \"recursion\" with exactly 8 questions"));
        assert!(prompt.contains("CSCE 120"));
        assert!(prompt.contains("Answer Key"));
    }

    #[test]
    fn test_difficulty_parsing() {
        let d: Difficulty = serde_json::from_str("\"easy\"").unwrap();
        assert_eq!(d, Difficulty::Easy);
        assert_eq!(Difficulty::default(), Difficulty::Medium);
        assert!(serde_json::from_str::<Difficulty>("\"impossible\"").is_err());
    }

    #[test]
    fn test_digest_context() {
        let syllabi = [syllabus()];
        let assignments = [TriagedAssignment {
            syllabus_id: 1,
            course_id: "csce_120".to_string(),
            course_name: "CSCE 120".to_string(),
            title: "Exam 2".to_string(),
            date_text: "October 17, 2025".to_string(),
            due_date: NaiveDate::from_ymd_opt(2025, 10, 17).unwrap(),
            days_until: 3,
            category: AssignmentCategory::Exam,
            priority: Priority::High,
            note: None,
        }];
        let digest = WeeklyDigest {
            syllabi: &syllabi,
            assignments: &assignments,
            events: &[],
            spending: None,
        };

        let context = digest_context(&digest);
        assert!(context.contains("[high] CSCE 120: Exam 2"));
        assert!(context.contains("No calendar events."));
        assert!(context.contains("No bank account linked."));
    }
}
