// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Plaid API client and spending analysis.
//!
//! Positive transaction amounts are money leaving the account, so only those
//! count as spending.

use crate::config::Config;
use crate::error::AppError;
use crate::models::{
    BankAccount, CategoryTotal, LinkToken, RecurringTransaction, SpendingInsights, Transaction,
};
use crate::services::check_response_json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const SERVICE: &str = "plaid";
const API_VERSION: &str = "2020-09-14";
const CLIENT_NAME: &str = "RevOS";

/// Category used when Plaid supplies none.
pub const UNCATEGORIZED: &str = "OTHER";
/// Number of categories reported in insights.
pub const TOP_CATEGORIES: usize = 5;

const FOOD_LIMIT: f64 = 200.0;
const SHOPPING_LIMIT: f64 = 150.0;
const SUBSCRIPTION_LIMIT: f64 = 50.0;
const SUBSCRIPTION_KEYWORDS: &[&str] = &[
    "subscription",
    "spotify",
    "netflix",
    "hulu",
    "gym",
    "membership",
];

/// Plaid API client.
#[derive(Clone)]
pub struct PlaidClient {
    http: reqwest::Client,
    base_url: String,
    /// `(client_id, secret)`, None when unconfigured
    credentials: Option<(String, String)>,
}

impl PlaidClient {
    pub fn new(config: &Config) -> Self {
        let credentials = match (&config.plaid_client_id, &config.plaid_secret) {
            (Some(id), Some(secret)) => Some((id.clone(), secret.clone())),
            _ => None,
        };

        Self {
            http: reqwest::Client::new(),
            base_url: config.plaid_base_url(),
            credentials,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    /// POST a JSON body with the client credentials merged in.
    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        mut body: serde_json::Value,
    ) -> Result<T, AppError> {
        let (client_id, secret) = self
            .credentials
            .as_ref()
            .ok_or_else(|| AppError::ServiceUnavailable("Plaid is not configured".to_string()))?;

        body["client_id"] = serde_json::Value::String(client_id.clone());
        body["secret"] = serde_json::Value::String(secret.clone());

        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("Plaid-Version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::upstream(SERVICE, e.to_string()))?;

        check_response_json(SERVICE, response).await
    }

    /// Link token for the frontend Plaid Link flow.
    pub async fn create_link_token(&self, user_id: i64) -> Result<LinkToken, AppError> {
        let response: LinkTokenResponse = self
            .post(
                "/link/token/create",
                serde_json::json!({
                    "client_name": CLIENT_NAME,
                    "products": ["auth", "transactions"],
                    "country_codes": ["US"],
                    "language": "en",
                    "user": { "client_user_id": user_id.to_string() },
                }),
            )
            .await?;

        tracing::info!(user_id, "Created Plaid link token");
        Ok(LinkToken {
            link_token: response.link_token,
            expiration: response.expiration.unwrap_or_default(),
        })
    }

    /// Exchange a Link public token for a long-lived access token.
    pub async fn exchange_public_token(
        &self,
        public_token: &str,
    ) -> Result<ExchangedItem, AppError> {
        let response: ExchangedItem = self
            .post(
                "/item/public_token/exchange",
                serde_json::json!({ "public_token": public_token }),
            )
            .await?;

        tracing::info!(item_id = %response.item_id, "Exchanged Plaid public token");
        Ok(response)
    }

    pub async fn accounts(&self, access_token: &str) -> Result<Vec<BankAccount>, AppError> {
        let response: AccountsResponse = self
            .post(
                "/accounts/get",
                serde_json::json!({ "access_token": access_token }),
            )
            .await?;

        Ok(response.accounts.into_iter().map(BankAccount::from).collect())
    }

    /// Transactions between two dates, inclusive, newest first as Plaid returns them.
    pub async fn transactions(
        &self,
        access_token: &str,
        start: NaiveDate,
        end: NaiveDate,
        limit: u32,
    ) -> Result<Vec<Transaction>, AppError> {
        let response: TransactionsResponse = self
            .post(
                "/transactions/get",
                serde_json::json!({
                    "access_token": access_token,
                    "start_date": start.format("%Y-%m-%d").to_string(),
                    "end_date": end.format("%Y-%m-%d").to_string(),
                    "options": { "count": limit, "offset": 0 },
                }),
            )
            .await?;

        tracing::debug!(
            count = response.transactions.len(),
            %start,
            %end,
            "Fetched Plaid transactions"
        );
        Ok(response
            .transactions
            .into_iter()
            .map(Transaction::from)
            .collect())
    }

    /// Recurring outflow streams.
    pub async fn recurring(
        &self,
        access_token: &str,
    ) -> Result<Vec<RecurringTransaction>, AppError> {
        let response: RecurringResponse = self
            .post(
                "/transactions/recurring/get",
                serde_json::json!({ "access_token": access_token }),
            )
            .await?;

        Ok(response
            .outflow_streams
            .into_iter()
            .map(RecurringTransaction::from)
            .collect())
    }
}

/// Result of a public token exchange.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangedItem {
    pub access_token: String,
    pub item_id: String,
}

#[derive(Deserialize)]
struct LinkTokenResponse {
    link_token: String,
    #[serde(default)]
    expiration: Option<String>,
}

#[derive(Deserialize)]
struct AccountsResponse {
    #[serde(default)]
    accounts: Vec<PlaidAccount>,
}

#[derive(Deserialize)]
struct PlaidAccount {
    account_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mask: Option<String>,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    balances: PlaidBalances,
}

#[derive(Default, Deserialize)]
struct PlaidBalances {
    #[serde(default)]
    current: Option<f64>,
    #[serde(default)]
    available: Option<f64>,
    #[serde(default)]
    iso_currency_code: Option<String>,
}

impl From<PlaidAccount> for BankAccount {
    fn from(account: PlaidAccount) -> Self {
        BankAccount {
            account_id: account.account_id,
            name: account.name,
            mask: account.mask,
            kind: account.kind,
            subtype: account.subtype,
            current_balance: account.balances.current,
            available_balance: account.balances.available,
            currency: account.balances.iso_currency_code,
        }
    }
}

#[derive(Deserialize)]
struct TransactionsResponse {
    #[serde(default)]
    transactions: Vec<PlaidTransaction>,
}

#[derive(Default, Deserialize)]
struct PersonalFinanceCategory {
    #[serde(default)]
    primary: Option<String>,
}

#[derive(Deserialize)]
struct PlaidTransaction {
    transaction_id: String,
    account_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    merchant_name: Option<String>,
    #[serde(default)]
    amount: f64,
    #[serde(default)]
    date: String,
    #[serde(default)]
    category: Option<Vec<String>>,
    #[serde(default)]
    personal_finance_category: Option<PersonalFinanceCategory>,
    #[serde(default)]
    pending: bool,
}

/// Personal finance category first, then the legacy hierarchy.
fn category_of(
    personal: Option<PersonalFinanceCategory>,
    legacy: Option<Vec<String>>,
) -> String {
    personal
        .and_then(|p| p.primary)
        .filter(|p| !p.trim().is_empty())
        .or_else(|| legacy.and_then(|c| c.into_iter().next()))
        .unwrap_or_else(|| UNCATEGORIZED.to_string())
}

impl From<PlaidTransaction> for Transaction {
    fn from(tx: PlaidTransaction) -> Self {
        Transaction {
            category: category_of(tx.personal_finance_category, tx.category),
            transaction_id: tx.transaction_id,
            account_id: tx.account_id,
            name: tx.name,
            merchant_name: tx.merchant_name,
            amount: tx.amount,
            date: tx.date,
            pending: tx.pending,
        }
    }
}

#[derive(Deserialize)]
struct RecurringResponse {
    #[serde(default)]
    outflow_streams: Vec<PlaidStream>,
}

#[derive(Deserialize)]
struct PlaidAmount {
    #[serde(default)]
    amount: Option<f64>,
}

#[derive(Deserialize)]
struct PlaidStream {
    stream_id: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    merchant_name: Option<String>,
    #[serde(default)]
    frequency: String,
    #[serde(default)]
    average_amount: Option<PlaidAmount>,
    #[serde(default)]
    last_amount: Option<PlaidAmount>,
    #[serde(default)]
    last_date: Option<String>,
    #[serde(default)]
    category: Option<Vec<String>>,
    #[serde(default)]
    personal_finance_category: Option<PersonalFinanceCategory>,
    #[serde(default)]
    is_active: bool,
}

impl From<PlaidStream> for RecurringTransaction {
    fn from(stream: PlaidStream) -> Self {
        RecurringTransaction {
            category: category_of(stream.personal_finance_category, stream.category),
            stream_id: stream.stream_id,
            description: stream.description,
            merchant_name: stream.merchant_name,
            frequency: stream.frequency,
            average_amount: stream.average_amount.and_then(|a| a.amount),
            last_amount: stream.last_amount.and_then(|a| a.amount),
            last_date: stream.last_date,
            is_active: stream.is_active,
        }
    }
}

/// Summarize outflows over `period_days`.
pub fn analyze_spending(transactions: &[Transaction], period_days: u32) -> SpendingInsights {
    let mut by_category: HashMap<&str, f64> = HashMap::new();
    let mut total = 0.0;
    let mut count = 0;

    for tx in transactions.iter().filter(|tx| tx.amount > 0.0) {
        *by_category.entry(tx.category.as_str()).or_default() += tx.amount;
        total += tx.amount;
        count += 1;
    }

    let mut categories: Vec<CategoryTotal> = by_category
        .into_iter()
        .map(|(category, amount)| CategoryTotal {
            category: category.to_string(),
            amount: round_cents(amount),
            percentage: if total > 0.0 {
                round_cents(amount / total * 100.0)
            } else {
                0.0
            },
        })
        .collect();
    categories.sort_by(|a, b| {
        b.amount
            .total_cmp(&a.amount)
            .then_with(|| a.category.cmp(&b.category))
    });

    let recommendations = recommendations(&categories, period_days);
    categories.truncate(TOP_CATEGORIES);

    let days = f64::from(period_days.max(1));
    SpendingInsights {
        period_days,
        total_spending: round_cents(total),
        daily_average: round_cents(total / days),
        monthly_average: round_cents(total / days * 30.0),
        transaction_count: count,
        top_categories: categories,
        recommendations,
    }
}

/// Rule-table advice from per-category totals, scaled to a 30-day month.
pub fn recommendations(categories: &[CategoryTotal], period_days: u32) -> Vec<String> {
    let per_month = 30.0 / f64::from(period_days.max(1));
    let monthly = |names: &[&str]| -> f64 {
        categories
            .iter()
            .filter(|c| names.contains(&c.category.as_str()))
            .map(|c| c.amount)
            .sum::<f64>()
            * per_month
    };

    let mut advice = Vec::new();

    if monthly(&["FOOD_AND_DRINK", "Food and Drink"]) > FOOD_LIMIT {
        advice.push(
            "Consider reducing dining out expenses - you're spending over $200/month here!"
                .to_string(),
        );
    }

    if monthly(&["SHOPPING", "GENERAL_MERCHANDISE", "Shops"]) > SHOPPING_LIMIT {
        advice.push("Your shopping spending is high. Try setting a monthly budget!".to_string());
    }

    let subscriptions = categories
        .iter()
        .filter(|c| {
            let name = c.category.to_lowercase();
            SUBSCRIPTION_KEYWORDS.iter().any(|k| name.contains(k))
        })
        .map(|c| c.amount)
        .sum::<f64>()
        * per_month;
    if subscriptions > SUBSCRIPTION_LIMIT {
        advice.push(format!(
            "You're spending ${:.2}/month on subscriptions. Audit which ones you actually use!",
            subscriptions
        ));
    }

    if advice.is_empty() {
        advice.push("Your spending looks balanced! Keep monitoring your budget.".to_string());
    }
    advice
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(category: &str, amount: f64) -> Transaction {
        Transaction {
            transaction_id: format!("tx-{category}-{amount}"),
            account_id: "acc".to_string(),
            name: category.to_string(),
            merchant_name: None,
            amount,
            date: "2025-10-01".to_string(),
            category: category.to_string(),
            pending: false,
        }
    }

    #[test]
    fn test_only_outflows_count() {
        let insights = analyze_spending(
            &[
                tx("FOOD_AND_DRINK", 30.0),
                tx("INCOME", -1500.0),
                tx("TRANSPORTATION", 10.0),
            ],
            30,
        );
        assert_eq!(insights.total_spending, 40.0);
        assert_eq!(insights.transaction_count, 2);
        assert_eq!(insights.top_categories[0].category, "FOOD_AND_DRINK");
        assert_eq!(insights.top_categories[0].percentage, 75.0);
        assert!(insights
            .top_categories
            .iter()
            .all(|c| c.category != "INCOME"));
    }

    #[test]
    fn test_ninety_day_averages() {
        let insights = analyze_spending(&[tx("RENT_AND_UTILITIES", 900.0)], 90);
        assert_eq!(insights.daily_average, 10.0);
        assert_eq!(insights.monthly_average, 300.0);
    }

    #[test]
    fn test_top_categories_truncated() {
        let transactions: Vec<Transaction> = (1..=7)
            .map(|i| tx(&format!("CAT_{i}"), f64::from(i)))
            .collect();
        let insights = analyze_spending(&transactions, 30);
        assert_eq!(insights.top_categories.len(), TOP_CATEGORIES);
        assert_eq!(insights.top_categories[0].category, "CAT_7");
    }

    #[test]
    fn test_recommendation_rules() {
        // 90 days at $900 food is $300/month.
        let insights = analyze_spending(
            &[tx("FOOD_AND_DRINK", 900.0), tx("GENERAL_MERCHANDISE", 600.0)],
            90,
        );
        assert_eq!(insights.recommendations.len(), 2);
        assert!(insights.recommendations[0].contains("dining out"));
        assert!(insights.recommendations[1].contains("shopping"));

        let insights = analyze_spending(&[tx("Netflix Subscription", 80.0)], 30);
        assert!(insights.recommendations[0].contains("$80.00/month on subscriptions"));

        let insights = analyze_spending(&[tx("FOOD_AND_DRINK", 100.0)], 30);
        assert_eq!(insights.recommendations.len(), 1);
        assert!(insights.recommendations[0].contains("balanced"));
    }

    #[test]
    fn test_empty_window() {
        let insights = analyze_spending(&[], 90);
        assert_eq!(insights.total_spending, 0.0);
        assert!(insights.top_categories.is_empty());
        assert!(insights.recommendations[0].contains("balanced"));
    }

    #[test]
    fn test_transaction_category_fallbacks() {
        let parsed: TransactionsResponse = serde_json::from_value(serde_json::json!({
            "transactions": [
                {
                    "transaction_id": "t1", "account_id": "a", "name": "Starbucks",
                    "amount": 4.5, "date": "2025-10-01", "pending": false,
                    "category": ["Food and Drink", "Coffee"],
                    "personal_finance_category": {"primary": "FOOD_AND_DRINK"}
                },
                {
                    "transaction_id": "t2", "account_id": "a", "name": "Uber",
                    "amount": 12.0, "date": "2025-10-02", "pending": true,
                    "category": ["Travel", "Taxi"]
                },
                {
                    "transaction_id": "t3", "account_id": "a", "name": "Mystery",
                    "amount": 1.0, "date": "2025-10-03", "category": null
                }
            ]
        }))
        .unwrap();
        let categories: Vec<String> = parsed
            .transactions
            .into_iter()
            .map(|t| Transaction::from(t).category)
            .collect();
        assert_eq!(categories, vec!["FOOD_AND_DRINK", "Travel", UNCATEGORIZED]);
    }

    #[test]
    fn test_recurring_stream_conversion() {
        let parsed: RecurringResponse = serde_json::from_value(serde_json::json!({
            "inflow_streams": [],
            "outflow_streams": [{
                "stream_id": "s1",
                "description": "SPOTIFY",
                "merchant_name": "Spotify",
                "frequency": "MONTHLY",
                "average_amount": {"amount": 10.99, "iso_currency_code": "USD"},
                "last_amount": {"amount": 10.99},
                "last_date": "2025-10-01",
                "personal_finance_category": {"primary": "ENTERTAINMENT"},
                "is_active": true
            }]
        }))
        .unwrap();
        let stream = RecurringTransaction::from(parsed.outflow_streams.into_iter().next().unwrap());
        assert_eq!(stream.average_amount, Some(10.99));
        assert_eq!(stream.category, "ENTERTAINMENT");
        assert!(stream.is_active);
    }
}
