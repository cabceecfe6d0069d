// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Natural-language endpoints: questions, worksheets, plans, and digests.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{CalendarEvent, SpendingInsights, Syllabus, TriagedAssignment};
use crate::routes::{current_user, json_body};
use crate::services::assistant::{Difficulty, Source, WeeklyDigest};
use crate::services::plaid::analyze_spending;
use crate::services::triage::triage;
use crate::time_utils::{local_date, rolling_window, trailing_days};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Length of the weekly advisor's look-ahead and spending look-back.
const WEEK_DAYS: u32 = 7;
/// Transactions fetched for the weekly spending summary.
const WEEKLY_TRANSACTION_LIMIT: u32 = 250;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/ask-rev", post(ask_rev))
        .route("/api/worksheet", post(worksheet))
        .route("/api/study-plan", post(study_plan))
        .route("/api/recommendations", post(recommendations))
        .route("/api/weekly-advisor", get(weekly_advisor))
}

fn require_llm(state: &AppState) -> Result<()> {
    if state.assistant.is_configured() {
        Ok(())
    } else {
        Err(AppError::ServiceUnavailable(
            "OpenAI is not configured".to_string(),
        ))
    }
}

/// Syllabi in scope: one owned syllabus when an id is given, else all.
async fn syllabi_in_scope(
    state: &AppState,
    user_id: i64,
    syllabus_id: Option<i64>,
) -> Result<Vec<Syllabus>> {
    match syllabus_id {
        Some(id) => {
            let syllabus = state
                .db
                .get_syllabus(user_id, id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Syllabus {}", id)))?;
            Ok(vec![syllabus])
        }
        None => state.db.list_syllabi(user_id).await,
    }
}

// ─── Ask Rev ─────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    course_filter: Option<String>,
}

#[derive(Serialize)]
pub struct AskResponse {
    pub response: String,
    pub query: String,
    pub sources: Vec<Source>,
}

async fn ask_rev(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: std::result::Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>> {
    let req = json_body(body)?;
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err(AppError::BadRequest("Query is required".to_string()));
    }
    let course_filter = req
        .course_filter
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let answer = state
        .assistant
        .ask(user.user_id, &query, course_filter)
        .await?;

    Ok(Json(AskResponse {
        response: answer.response,
        query,
        sources: answer.sources,
    }))
}

// ─── Worksheet ───────────────────────────────────────────────

fn default_num_questions() -> u8 {
    5
}

#[derive(Deserialize, Validate)]
pub struct WorksheetRequest {
    #[serde(default)]
    topic: String,
    #[serde(default)]
    syllabus_id: Option<i64>,
    #[serde(default = "default_num_questions")]
    #[validate(range(min = 1, max = 20, message = "num_questions must be between 1 and 20"))]
    num_questions: u8,
    #[serde(default)]
    difficulty: Difficulty,
}

#[derive(Serialize)]
pub struct WorksheetResponse {
    pub worksheet: String,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    pub num_questions: u8,
    pub difficulty: Difficulty,
}

async fn worksheet(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: std::result::Result<Json<WorksheetRequest>, JsonRejection>,
) -> Result<Json<WorksheetResponse>> {
    let req = json_body(body)?;
    req.validate()?;
    let topic = req.topic.trim().to_string();
    if topic.is_empty() {
        return Err(AppError::BadRequest("Topic is required".to_string()));
    }
    require_llm(&state)?;

    let syllabus = match req.syllabus_id {
        Some(id) => syllabi_in_scope(&state, user.user_id, Some(id))
            .await?
            .into_iter()
            .next(),
        None => None,
    };

    let worksheet = state
        .assistant
        .worksheet(&topic, syllabus.as_ref(), req.num_questions, req.difficulty)
        .await?;

    tracing::info!(
        user_id = user.user_id,
        num_questions = req.num_questions,
        difficulty = req.difficulty.as_str(),
        "Generated worksheet"
    );

    Ok(Json(WorksheetResponse {
        worksheet,
        topic,
        course: syllabus.map(|s| s.course_name),
        num_questions: req.num_questions,
        difficulty: req.difficulty,
    }))
}

// ─── Study Plan ──────────────────────────────────────────────

fn default_days() -> u32 {
    7
}

fn default_hours_per_day() -> f32 {
    2.0
}

#[derive(Deserialize, Validate)]
pub struct StudyPlanRequest {
    #[serde(default)]
    syllabus_id: Option<i64>,
    #[serde(default = "default_days")]
    #[validate(range(min = 1, max = 30, message = "days must be between 1 and 30"))]
    days: u32,
    #[serde(default = "default_hours_per_day")]
    #[validate(range(
        min = 0.5,
        max = 12.0,
        message = "hours_per_day must be between 0.5 and 12"
    ))]
    hours_per_day: f32,
}

#[derive(Serialize)]
pub struct StudyPlanResponse {
    #[serde(rename = "studyPlan")]
    pub study_plan: String,
    pub assignments: Vec<TriagedAssignment>,
    pub days: u32,
}

async fn study_plan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: std::result::Result<Json<StudyPlanRequest>, JsonRejection>,
) -> Result<Json<StudyPlanResponse>> {
    let req = json_body(body)?;
    req.validate()?;
    require_llm(&state)?;

    let syllabi = syllabi_in_scope(&state, user.user_id, req.syllabus_id).await?;
    let today = local_date(Utc::now(), state.config.campus_timezone);
    let assignments = triage(&syllabi, today, req.days);

    let study_plan = state
        .assistant
        .study_plan(&syllabi, &assignments, req.days, req.hours_per_day)
        .await?;

    tracing::info!(
        user_id = user.user_id,
        days = req.days,
        assignments = assignments.len(),
        "Generated study plan"
    );

    Ok(Json(StudyPlanResponse {
        study_plan,
        assignments,
        days: req.days,
    }))
}

// ─── Recommendations ─────────────────────────────────────────

#[derive(Deserialize)]
pub struct RecommendationsRequest {
    #[serde(default)]
    interests: Vec<String>,
    #[serde(default)]
    query: Option<String>,
}

#[derive(Serialize)]
pub struct RecommendationsResponse {
    pub recommendations: String,
}

async fn recommendations(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: std::result::Result<Json<RecommendationsRequest>, JsonRejection>,
) -> Result<Json<RecommendationsResponse>> {
    let req = json_body(body)?;
    require_llm(&state)?;

    let interests: Vec<String> = req
        .interests
        .iter()
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .collect();
    let query = req.query.as_deref().map(str::trim).filter(|q| !q.is_empty());

    let syllabi = state.db.list_syllabi(user.user_id).await?;
    let recommendations = state
        .assistant
        .recommendations(&syllabi, &interests, query)
        .await?;

    Ok(Json(RecommendationsResponse { recommendations }))
}

// ─── Weekly Advisor ──────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyAdvisorResponse {
    pub weekly_review: String,
    pub course_count: usize,
    pub assignment_count: usize,
    pub event_count: usize,
    pub assignments: Vec<TriagedAssignment>,
    pub events: Vec<CalendarEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spending: Option<SpendingInsights>,
}

/// Blend the coming week's deadlines, calendar, and recent spending.
///
/// Calendar and bank data are included only when linked; a failing
/// integration is logged and left out of the digest.
async fn weekly_advisor(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<WeeklyAdvisorResponse>> {
    require_llm(&state)?;

    let user = current_user(&state, auth.user_id).await?;
    let tz = state.config.campus_timezone;
    let now = Utc::now();
    let today = local_date(now, tz);

    let syllabi = state.db.list_syllabi(user.id).await?;
    let assignments = triage(&syllabi, today, WEEK_DAYS);

    let events = if user.google_calendar_connected() && state.google_calendar.is_configured() {
        let (start, end) = rolling_window(now, tz, WEEK_DAYS);
        state
            .google_calendar
            .events(&user, start, end)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(user_id = user.id, error = %e, "Skipping calendar in weekly digest");
                Vec::new()
            })
    } else {
        Vec::new()
    };

    let spending = match (&user.plaid_access_token, state.plaid.is_configured()) {
        (Some(token), true) => {
            let (start, end) = trailing_days(today, WEEK_DAYS);
            match state
                .plaid
                .transactions(token, start, end, WEEKLY_TRANSACTION_LIMIT)
                .await
            {
                Ok(transactions) => Some(analyze_spending(&transactions, WEEK_DAYS)),
                Err(e) => {
                    tracing::warn!(user_id = user.id, error = %e, "Skipping spending in weekly digest");
                    None
                }
            }
        }
        _ => None,
    };

    let weekly_review = state
        .assistant
        .weekly_review(&WeeklyDigest {
            syllabi: &syllabi,
            assignments: &assignments,
            events: &events,
            spending: spending.as_ref(),
        })
        .await?;

    tracing::info!(
        user_id = user.id,
        assignments = assignments.len(),
        events = events.len(),
        has_spending = spending.is_some(),
        "Generated weekly review"
    );

    Ok(Json(WeeklyAdvisorResponse {
        weekly_review,
        course_count: syllabi.len(),
        assignment_count: assignments.len(),
        event_count: events.len(),
        assignments,
        events,
        spending,
    }))
}
