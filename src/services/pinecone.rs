// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Pinecone data-plane client for syllabus chunk vectors.

use crate::config::Config;
use crate::error::AppError;
use crate::services::check_response_json;
use serde::{Deserialize, Serialize};

const SERVICE: &str = "pinecone";
const API_VERSION: &str = "2024-07";
/// Pinecone accepts at most this many vectors per upsert.
pub const UPSERT_BATCH_SIZE: usize = 100;

/// Metadata stored with each chunk vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkMetadata {
    pub user_id: i64,
    pub course_id: String,
    pub course_name: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Vector {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A query hit.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    #[serde(default)]
    pub score: f32,
    pub metadata: Option<MatchMetadata>,
}

/// Metadata as returned by queries. Pinecone hands numbers back as floats,
/// so the owner id is not read back.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchMetadata {
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Pinecone index client.
#[derive(Clone)]
pub struct PineconeClient {
    http: reqwest::Client,
    /// `https://<index host>`, None when unconfigured
    base_url: Option<String>,
    api_key: Option<String>,
}

impl PineconeClient {
    pub fn new(config: &Config) -> Self {
        let base_url = config.pinecone_index_host.as_ref().map(|host| {
            let host = host.trim_end_matches('/');
            if host.starts_with("http://") || host.starts_with("https://") {
                host.to_string()
            } else {
                format!("https://{}", host)
            }
        });

        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key: config.pinecone_api_key.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some() && self.api_key.is_some()
    }

    fn endpoint(&self, path: &str) -> Result<(String, &str), AppError> {
        match (&self.base_url, &self.api_key) {
            (Some(base), Some(key)) => Ok((format!("{}{}", base, path), key.as_str())),
            _ => Err(AppError::ServiceUnavailable(
                "Pinecone is not configured".to_string(),
            )),
        }
    }

    /// Upsert vectors in batches.
    pub async fn upsert(&self, vectors: &[Vector]) -> Result<(), AppError> {
        let (url, key) = self.endpoint("/vectors/upsert")?;

        for batch in vectors.chunks(UPSERT_BATCH_SIZE) {
            let response = self
                .http
                .post(&url)
                .header("Api-Key", key)
                .header("X-Pinecone-API-Version", API_VERSION)
                .json(&serde_json::json!({ "vectors": batch }))
                .send()
                .await
                .map_err(|e| AppError::upstream(SERVICE, e.to_string()))?;

            let result: UpsertResponse = check_response_json(SERVICE, response).await?;
            tracing::debug!(upserted = result.upserted_count, "Upserted vector batch");
        }
        Ok(())
    }

    /// Nearest neighbours of `vector` restricted by a metadata filter.
    pub async fn query(
        &self,
        vector: &[f32],
        top_k: u32,
        filter: serde_json::Value,
    ) -> Result<Vec<VectorMatch>, AppError> {
        let (url, key) = self.endpoint("/query")?;

        let response = self
            .http
            .post(&url)
            .header("Api-Key", key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(&serde_json::json!({
                "vector": vector,
                "topK": top_k,
                "filter": filter,
                "includeMetadata": true,
            }))
            .send()
            .await
            .map_err(|e| AppError::upstream(SERVICE, e.to_string()))?;

        let result: QueryResponse = check_response_json(SERVICE, response).await?;
        Ok(result.matches)
    }

    /// Delete vectors by id.
    pub async fn delete(&self, ids: &[String]) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }
        let (url, key) = self.endpoint("/vectors/delete")?;

        for batch in ids.chunks(UPSERT_BATCH_SIZE) {
            let response = self
                .http
                .post(&url)
                .header("Api-Key", key)
                .header("X-Pinecone-API-Version", API_VERSION)
                .json(&serde_json::json!({ "ids": batch }))
                .send()
                .await
                .map_err(|e| AppError::upstream(SERVICE, e.to_string()))?;

            let _: serde_json::Value = check_response_json(SERVICE, response).await?;
        }
        tracing::debug!(count = ids.len(), "Deleted vectors");
        Ok(())
    }

    /// Delete vectors, logging instead of failing.
    pub async fn delete_best_effort(&self, ids: &[String]) {
        if !self.is_configured() || ids.is_empty() {
            return;
        }
        if let Err(e) = self.delete(ids).await {
            tracing::warn!(error = %e, count = ids.len(), "Failed to delete vectors");
        }
    }
}

/// Metadata filter scoping a query to one user and optionally one course.
pub fn owner_filter(user_id: i64, course_id: Option<&str>) -> serde_json::Value {
    match course_id {
        Some(course) => serde_json::json!({
            "user_id": { "$eq": user_id },
            "course_id": { "$eq": course },
        }),
        None => serde_json::json!({ "user_id": { "$eq": user_id } }),
    }
}

#[derive(Deserialize)]
struct UpsertResponse {
    #[serde(rename = "upsertedCount", default)]
    upserted_count: u64,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<VectorMatch>,
}
