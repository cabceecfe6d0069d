// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Syllabus ingestion: language-model parsing, chunk embedding, and storage.

use crate::db::Database;
use crate::error::AppError;
use crate::models::syllabus::{UNKNOWN_COURSE, UNKNOWN_INSTRUCTOR, UNKNOWN_SEMESTER};
use crate::models::{GradingCategory, KeyDate, NewSyllabus, ParsedSyllabus, Syllabus};
use crate::services::openai::{ChatMessage, OpenAiClient};
use crate::services::pinecone::{ChunkMetadata, PineconeClient, Vector};
use serde_json::Value;
use std::collections::HashSet;

/// Characters of document text sent to the parser.
pub const MAX_PROMPT_CHARS: usize = 10_000;
const PARSE_MAX_TOKENS: u32 = 5000;
/// Characters of chunk text kept in vector metadata.
const METADATA_TEXT_CHARS: usize = 500;

const PARSE_INSTRUCTIONS: &str = r#"You are an expert syllabus parser. Extract everything important from the syllabus below. Do not skip anything and do not invent anything.

COURSE INFORMATION
- course: full course number and title (e.g. "CSCE 120: Program Design and Concepts")
- instructor: primary instructor name, or "Multiple Instructors"
- semester: semester and year (e.g. "Fall 2025")

KEY DATES (be exhaustive)
Include every exam, midterm, final, quiz, homework due date, lab, project milestone, and administrative deadline.
Turn "Week of Sep 22" into "Approximately September 22, 2025" when the year is known.
Each entry has:
- date: the calendar date as precisely as the syllabus states it
- event: full description, including the assignment number
- type: one of exam|quiz|homework|lab|project|other
- note: extra context (optional)

GRADING BREAKDOWN
Every weighted component, with section-specific variations as separate entries:
- category: exact name from the syllabus
- weight: number from 0 to 100
- note: conditions (optional)

TOPICS
Every topic from the topics/outline section, plus key concepts from the learning outcomes.

RESPONSE FORMAT (valid JSON only):
{"course": "...", "instructor": "...", "semester": "...",
 "keyDates": [{"date": "...", "event": "...", "type": "...", "note": "..."}],
 "topics": ["..."],
 "gradingBreakdown": [{"category": "...", "weight": 0, "note": "..."}]}

Return ONLY the JSON object. No markdown. No explanations."#;

/// Build the extraction prompt for a document's text.
pub fn build_parse_prompt(text: &str) -> String {
    let excerpt: String = text.chars().take(MAX_PROMPT_CHARS).collect();
    format!("{}\n\nSYLLABUS TEXT:\n{}", PARSE_INSTRUCTIONS, excerpt)
}

/// The outermost `{...}` span of a model reply.
pub fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

/// Parse a model reply into a normalized syllabus.
///
/// Never fails: a reply without usable JSON yields the placeholder record.
pub fn parse_reply(reply: &str) -> ParsedSyllabus {
    let Some(json) = extract_json_object(reply) else {
        tracing::warn!(reply_chars = reply.len(), "No JSON object in parser reply");
        return ParsedSyllabus::default();
    };

    match serde_json::from_str::<Value>(json) {
        Ok(value) => normalize(&value),
        Err(e) => {
            tracing::warn!(error = %e, "Parser reply is not valid JSON");
            ParsedSyllabus::default()
        }
    }
}

/// Lenient conversion of the model's JSON into a `ParsedSyllabus`.
pub fn normalize(value: &Value) -> ParsedSyllabus {
    let text_field = |name: &str, fallback: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(fallback)
            .to_string()
    };

    let key_dates = value
        .get("keyDates")
        .and_then(Value::as_array)
        .map(|items| dedup_key_dates(items.iter().filter_map(key_date_from).collect()))
        .unwrap_or_default();

    let topics = value
        .get("topics")
        .and_then(Value::as_array)
        .map(|items| dedup_topics(items.iter().filter_map(scalar_text).collect()))
        .unwrap_or_default();

    let grading_breakdown = value
        .get("gradingBreakdown")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(grading_from).collect())
        .unwrap_or_default();

    ParsedSyllabus {
        course: text_field("course", UNKNOWN_COURSE),
        instructor: text_field("instructor", UNKNOWN_INSTRUCTOR),
        semester: text_field("semester", UNKNOWN_SEMESTER),
        key_dates,
        topics,
        grading_breakdown,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn key_date_from(value: &Value) -> Option<KeyDate> {
    let field = |name: &str| value.get(name).and_then(scalar_text).filter(|s| !s.is_empty());

    let date = field("date").unwrap_or_default();
    let event = field("event").unwrap_or_default();
    if date.is_empty() && event.is_empty() {
        return None;
    }

    Some(KeyDate {
        date,
        event,
        kind: field("type")
            .map(|t| t.to_lowercase())
            .unwrap_or_else(|| "other".to_string()),
        note: field("note"),
    })
}

/// `20`, `20.5`, `"20%"`, `" 20 % "` → weight. Weights outside `[0,100]` are dropped.
fn grading_from(value: &Value) -> Option<GradingCategory> {
    let category = value.get("category").and_then(scalar_text)?;
    if category.is_empty() {
        return None;
    }

    let weight = match value.get("weight")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok()?,
        _ => return None,
    };

    let entry = GradingCategory {
        category,
        weight,
        note: value
            .get("note")
            .and_then(scalar_text)
            .filter(|s| !s.is_empty()),
    };
    entry.weight_in_range().then_some(entry)
}

/// Case-insensitive dedup keeping the first spelling; blanks dropped.
pub fn dedup_topics(topics: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    topics
        .into_iter()
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .collect()
}

/// Dedup by lowercase `(date, event)`, keeping the first entry.
pub fn dedup_key_dates(dates: Vec<KeyDate>) -> Vec<KeyDate> {
    let mut seen = HashSet::new();
    dates
        .into_iter()
        .filter(|d| seen.insert((d.date.to_lowercase(), d.event.to_lowercase())))
        .collect()
}

/// Text chunks embedded for retrieval.
pub fn build_chunks(course: &str, semester: &str, parsed: &SyllabusContent<'_>) -> Vec<String> {
    let mut chunks = vec![format!("Course: {} ({})", course, semester)];

    chunks.extend(
        parsed
            .key_dates
            .iter()
            .map(|d| match &d.note {
                Some(note) => format!("{}: {} on {} ({})", course, d.event, d.date, note),
                None => format!("{}: {} on {}", course, d.event, d.date),
            }),
    );

    if !parsed.topics.is_empty() {
        chunks.push(format!("{} topics: {}", course, parsed.topics.join(", ")));
    }

    if !parsed.grading_breakdown.is_empty() {
        let grading: Vec<String> = parsed
            .grading_breakdown
            .iter()
            .map(|g| format!("{} {}%", g.category, g.weight))
            .collect();
        chunks.push(format!("{} grading: {}", course, grading.join(", ")));
    }

    chunks
}

/// Borrowed view over the parts of a syllabus that become chunks.
pub struct SyllabusContent<'a> {
    pub key_dates: &'a [KeyDate],
    pub topics: &'a [String],
    pub grading_breakdown: &'a [GradingCategory],
}

impl<'a> From<&'a ParsedSyllabus> for SyllabusContent<'a> {
    fn from(parsed: &'a ParsedSyllabus) -> Self {
        Self {
            key_dates: &parsed.key_dates,
            topics: &parsed.topics,
            grading_breakdown: &parsed.grading_breakdown,
        }
    }
}

/// Syllabus pipeline over the LLM, vector index, and database.
#[derive(Clone)]
pub struct SyllabusService {
    openai: OpenAiClient,
    pinecone: PineconeClient,
    db: Database,
}

impl SyllabusService {
    pub fn new(openai: OpenAiClient, pinecone: PineconeClient, db: Database) -> Self {
        Self {
            openai,
            pinecone,
            db,
        }
    }

    /// Ask the language model to structure a syllabus.
    pub async fn parse(&self, text: &str) -> Result<ParsedSyllabus, AppError> {
        let prompt = build_parse_prompt(text);
        let reply = self
            .openai
            .chat(&[ChatMessage::user(prompt)], PARSE_MAX_TOKENS, 0.0)
            .await?;

        let parsed = parse_reply(&reply);
        tracing::info!(
            course = %parsed.course,
            key_dates = parsed.key_dates.len(),
            topics = parsed.topics.len(),
            grading = parsed.grading_breakdown.len(),
            exams = parsed.exam_count(),
            assignments = parsed.assignment_count(),
            "Parsed syllabus"
        );
        Ok(parsed)
    }

    /// Embed and index the syllabus (when the index is configured), then insert it.
    pub async fn store(&self, user_id: i64, parsed: &ParsedSyllabus) -> Result<Syllabus, AppError> {
        let course_id = parsed.course_id();
        let chunks = build_chunks(&parsed.course, &parsed.semester, &parsed.into());
        let vector_ids = self
            .index_chunks(user_id, &course_id, &parsed.course, chunks)
            .await?;

        let new = NewSyllabus {
            course_id,
            course_name: parsed.course.clone(),
            instructor: Some(parsed.instructor.clone()),
            semester: Some(parsed.semester.clone()),
            key_dates: parsed.key_dates.clone(),
            topics: parsed.topics.clone(),
            grading_breakdown: parsed.grading_breakdown.clone(),
            vector_ids,
        };

        match self.db.insert_syllabus(user_id, &new).await {
            Ok(saved) => {
                tracing::info!(
                    user_id,
                    syllabus_id = saved.id,
                    vectors = saved.vector_ids.len(),
                    "Stored syllabus"
                );
                Ok(saved)
            }
            Err(e) => {
                self.pinecone.delete_best_effort(&new.vector_ids).await;
                Err(e)
            }
        }
    }

    /// Embed chunks and upsert them. Returns the vector ids, empty when the
    /// index is not configured.
    pub async fn index_chunks(
        &self,
        user_id: i64,
        course_id: &str,
        course_name: &str,
        chunks: Vec<String>,
    ) -> Result<Vec<String>, AppError> {
        if !self.pinecone.is_configured() || chunks.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self.openai.embed_batch(&chunks).await?;
        let prefix = uuid::Uuid::new_v4();

        let vectors: Vec<Vector> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, values))| Vector {
                id: format!("{}_{}", prefix, i),
                values,
                metadata: ChunkMetadata {
                    user_id,
                    course_id: course_id.to_string(),
                    course_name: course_name.to_string(),
                    text: text.chars().take(METADATA_TEXT_CHARS).collect(),
                },
            })
            .collect();

        self.pinecone.upsert(&vectors).await?;
        Ok(vectors.into_iter().map(|v| v.id).collect())
    }

    /// Delete an owned syllabus and, best-effort, its vectors.
    pub async fn remove(&self, user_id: i64, syllabus_id: i64) -> Result<Syllabus, AppError> {
        let deleted = self
            .db
            .delete_syllabus(user_id, syllabus_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Syllabus {}", syllabus_id)))?;

        self.pinecone.delete_best_effort(&deleted.vector_ids).await;
        tracing::info!(user_id, syllabus_id, "Deleted syllabus");
        Ok(deleted)
    }
}
