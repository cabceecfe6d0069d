// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bank account routes backed by Plaid.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{BankAccount, LinkToken, RecurringTransaction, SpendingInsights, Transaction};
use crate::routes::{current_user, json_body};
use crate::services::plaid::analyze_spending;
use crate::time_utils::{campus_today, trailing_days};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_TRANSACTION_DAYS: i64 = 30;
const DEFAULT_TRANSACTION_LIMIT: u32 = 100;
const MAX_TRANSACTION_LIMIT: u32 = 500;
const INSIGHT_DAYS: u32 = 90;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/plaid/link-token", post(link_token))
        .route("/api/plaid/exchange", post(exchange))
        .route("/api/plaid/accounts", get(accounts))
        .route("/api/plaid/transactions", get(transactions))
        .route("/api/plaid/insights", get(insights))
        .route("/api/plaid/recurring", get(recurring))
}

fn require_plaid(state: &AppState) -> Result<()> {
    if state.plaid.is_configured() {
        Ok(())
    } else {
        Err(AppError::ServiceUnavailable("Plaid is not configured".to_string()))
    }
}

/// Plaid access token of the caller, or `not_linked`.
async fn linked_token(state: &AppState, user_id: i64) -> Result<String> {
    require_plaid(state)?;
    current_user(state, user_id)
        .await?
        .plaid_access_token
        .ok_or(AppError::NotLinked("Bank account"))
}

async fn link_token(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<LinkToken>> {
    require_plaid(&state)?;
    Ok(Json(state.plaid.create_link_token(user.user_id).await?))
}

#[derive(Deserialize, Default)]
pub struct LinkMetadata {
    #[serde(default)]
    institution: Option<Institution>,
}

#[derive(Deserialize)]
pub struct Institution {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
pub struct ExchangeRequest {
    #[serde(default)]
    public_token: String,
    #[serde(default)]
    metadata: Option<LinkMetadata>,
}

#[derive(Serialize)]
pub struct ExchangeResponse {
    pub item_id: String,
    pub institution: Option<String>,
    pub accounts: Vec<BankAccount>,
}

async fn exchange(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: std::result::Result<Json<ExchangeRequest>, JsonRejection>,
) -> Result<Json<ExchangeResponse>> {
    let req = json_body(body)?;
    let public_token = req.public_token.trim();
    if public_token.is_empty() {
        return Err(AppError::BadRequest("public_token is required".to_string()));
    }
    require_plaid(&state)?;

    let institution = req
        .metadata
        .and_then(|m| m.institution)
        .and_then(|i| i.name)
        .filter(|n| !n.trim().is_empty());

    let item = state.plaid.exchange_public_token(public_token).await?;
    state
        .db
        .set_plaid_link(
            user.user_id,
            &item.access_token,
            &item.item_id,
            institution.as_deref(),
        )
        .await?;

    tracing::info!(user_id = user.user_id, item_id = %item.item_id, "Linked bank account");

    let accounts = state.plaid.accounts(&item.access_token).await?;
    Ok(Json(ExchangeResponse {
        item_id: item.item_id,
        institution,
        accounts,
    }))
}

#[derive(Serialize)]
pub struct AccountsResponse {
    pub accounts: Vec<BankAccount>,
}

async fn accounts(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<AccountsResponse>> {
    let token = linked_token(&state, user.user_id).await?;
    Ok(Json(AccountsResponse {
        accounts: state.plaid.accounts(&token).await?,
    }))
}

#[derive(Deserialize, Default)]
pub struct TransactionQuery {
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
}

/// Resolved transaction query.
#[derive(Debug, PartialEq)]
pub struct TransactionRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub limit: u32,
}

fn parse_date(name: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Invalid '{}': expected YYYY-MM-DD", name)))
}

impl TransactionQuery {
    pub fn resolve(&self, today: NaiveDate) -> Result<TransactionRange> {
        let end = match &self.end_date {
            Some(raw) => parse_date("end_date", raw)?,
            None => today,
        };
        let start = match &self.start_date {
            Some(raw) => parse_date("start_date", raw)?,
            None => end - Duration::days(DEFAULT_TRANSACTION_DAYS),
        };
        if start > end {
            return Err(AppError::BadRequest(
                "start_date must not be after end_date".to_string(),
            ));
        }

        let limit = self.limit.unwrap_or(DEFAULT_TRANSACTION_LIMIT);
        if !(1..=MAX_TRANSACTION_LIMIT).contains(&limit) {
            return Err(AppError::BadRequest(format!(
                "limit must be between 1 and {}",
                MAX_TRANSACTION_LIMIT
            )));
        }

        Ok(TransactionRange { start, end, limit })
    }
}

#[derive(Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<Transaction>,
    pub start_date: String,
    pub end_date: String,
}

async fn transactions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<TransactionQuery>,
) -> Result<Json<TransactionsResponse>> {
    let range = params.resolve(campus_today(state.config.campus_timezone))?;
    let token = linked_token(&state, user.user_id).await?;

    let transactions = state
        .plaid
        .transactions(&token, range.start, range.end, range.limit)
        .await?;

    Ok(Json(TransactionsResponse {
        transactions,
        start_date: range.start.format("%Y-%m-%d").to_string(),
        end_date: range.end.format("%Y-%m-%d").to_string(),
    }))
}

async fn insights(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SpendingInsights>> {
    let token = linked_token(&state, user.user_id).await?;
    let (start, end) = trailing_days(campus_today(state.config.campus_timezone), INSIGHT_DAYS);

    let transactions = state
        .plaid
        .transactions(&token, start, end, MAX_TRANSACTION_LIMIT)
        .await?;

    Ok(Json(analyze_spending(&transactions, INSIGHT_DAYS)))
}

#[derive(Serialize)]
pub struct RecurringResponse {
    pub recurring: Vec<RecurringTransaction>,
}

async fn recurring(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<RecurringResponse>> {
    let token = linked_token(&state, user.user_id).await?;

    let recurring = match state.plaid.recurring(&token).await {
        Ok(streams) => streams,
        Err(e) => {
            tracing::warn!(user_id = user.user_id, error = %e, "Recurring transactions unavailable");
            Vec::new()
        }
    };

    Ok(Json(RecurringResponse { recurring }))
}
