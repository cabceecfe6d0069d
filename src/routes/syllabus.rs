// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Syllabus upload, listing, and editing routes.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{GradingCategory, KeyDate, Syllabus};
use crate::routes::json_body;
use crate::services::extract::{extract_text, DocumentKind};
use crate::AppState;
use axum::{
    extract::{
        rejection::JsonRejection, DefaultBodyLimit, FromRequest, Multipart, Path, Request, State,
    },
    http::header,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Upload body limit (16 MiB).
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/syllabus/upload",
            post(upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/syllabus/list", get(list))
        .route("/api/syllabus/{id}", get(fetch).delete(remove))
        .route("/api/syllabus/{id}/grading", put(update_grading))
}

// ─── Upload ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawTextUpload {
    #[serde(default)]
    raw_text: Option<String>,
}

/// Parsed syllabus as returned right after upload.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UploadedSyllabus {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: i64,
    pub course: String,
    pub instructor: String,
    pub semester: String,
    #[serde(rename = "keyDates")]
    pub key_dates: Vec<KeyDate>,
    pub topics: Vec<String>,
    #[serde(rename = "gradingBreakdown")]
    pub grading_breakdown: Vec<GradingCategory>,
    pub exams: usize,
    pub assignments: usize,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub data: UploadedSyllabus,
}

/// Read the document text from a multipart `file` field or a JSON `raw_text`.
async fn read_upload(state: &Arc<AppState>, request: Request) -> Result<String> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if !is_multipart {
        let body: std::result::Result<Json<RawTextUpload>, JsonRejection> =
            Json::from_request(request, state).await;
        let text = json_body(body)?.raw_text.unwrap_or_default();
        if text.trim().is_empty() {
            return Err(AppError::BadRequest(
                "No file or raw_text provided".to_string(),
            ));
        }
        return Ok(text);
    }

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().trim().to_string();
        if filename.is_empty() {
            return Err(AppError::BadRequest("No file selected".to_string()));
        }
        let kind = DocumentKind::from_filename(&filename).ok_or_else(|| {
            AppError::BadRequest("Unsupported file type. Use pdf, docx, doc, or txt".to_string())
        })?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        tracing::debug!(filename = %filename, size = bytes.len(), "Received syllabus file");

        return tokio::task::spawn_blocking(move || extract_text(&bytes, kind))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Extraction task failed: {}", e)))?;
    }

    Err(AppError::BadRequest("No file provided".to_string()))
}

/// Upload a syllabus, parse it with the language model, and store it.
async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    request: Request,
) -> Result<Json<UploadResponse>> {
    let text = read_upload(&state, request).await?;

    if !state.openai.is_configured() {
        return Err(AppError::ServiceUnavailable(
            "OpenAI is not configured".to_string(),
        ));
    }

    let parsed = state.syllabus_service.parse(&text).await?;
    let saved = state.syllabus_service.store(user.user_id, &parsed).await?;

    Ok(Json(UploadResponse {
        message: "Syllabus uploaded and parsed successfully".to_string(),
        data: UploadedSyllabus {
            id: saved.id,
            exams: parsed.exam_count(),
            assignments: parsed.assignment_count(),
            course: parsed.course,
            instructor: parsed.instructor,
            semester: parsed.semester,
            key_dates: parsed.key_dates,
            topics: parsed.topics,
            grading_breakdown: parsed.grading_breakdown,
        },
    }))
}

// ─── Read / Delete ───────────────────────────────────────────

#[derive(Serialize)]
pub struct SyllabusListResponse {
    pub syllabi: Vec<Syllabus>,
    pub count: usize,
}

async fn list(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SyllabusListResponse>> {
    let syllabi = state.db.list_syllabi(user.user_id).await?;
    Ok(Json(SyllabusListResponse {
        count: syllabi.len(),
        syllabi,
    }))
}

async fn fetch(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<Syllabus>> {
    state
        .db
        .get_syllabus(user.user_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Syllabus {}", id)))
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

async fn remove(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    let deleted = state.syllabus_service.remove(user.user_id, id).await?;
    Ok(Json(MessageResponse {
        message: format!("Syllabus '{}' deleted", deleted.course_name),
    }))
}

// ─── Grading ─────────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct GradingUpdate {
    #[serde(rename = "gradingBreakdown")]
    #[validate(nested)]
    pub grading_breakdown: Vec<GradingCategory>,
}

async fn update_grading(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    body: std::result::Result<Json<GradingUpdate>, JsonRejection>,
) -> Result<Json<Syllabus>> {
    let mut update = json_body(body)?;
    update.validate()?;

    for entry in &mut update.grading_breakdown {
        entry.category = entry.category.trim().to_string();
        if entry.category.is_empty() {
            return Err(AppError::BadRequest(
                "Grading category must not be empty".to_string(),
            ));
        }
    }

    let updated = state
        .db
        .update_grading(user.user_id, id, &update.grading_breakdown)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Syllabus {}", id)))?;

    tracing::info!(
        user_id = user.user_id,
        syllabus_id = id,
        categories = updated.grading_breakdown.len(),
        "Updated grading breakdown"
    );
    Ok(Json(updated))
}
