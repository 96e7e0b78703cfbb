//! Reranker via DashScope's native `text-rerank` endpoint.
//!
//! One batch request carries every candidate text; the response lists the
//! kept candidates by index into that batch.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::dashscope::{ensure_success, DashScopeClient};
use super::Reranker;
use crate::models::RerankEntry;

pub struct DashScopeReranker {
    client: Arc<DashScopeClient>,
    model: String,
    url: String,
}

impl DashScopeReranker {
    pub fn new(client: Arc<DashScopeClient>) -> Self {
        let model = client.config().rerank_model.clone();
        let url = client.config().rerank_url.clone();
        Self { client, model, url }
    }
}

#[async_trait]
impl Reranker for DashScopeReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankEntry>> {
        if documents.is_empty() || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let req = RerankRequest {
            model: self.model.clone(),
            input: RerankInput {
                query: query.to_string(),
                documents: documents.to_vec(),
            },
            top_n: top_n.min(documents.len()),
            return_documents: false,
        };

        let resp = self
            .client
            .post(&self.url)
            .await?
            .json(&req)
            .send()
            .await
            .context("Failed to reach DashScope rerank endpoint")?;
        let resp = ensure_success(resp, "rerank").await?;

        let body: RerankResponse = resp
            .json()
            .await
            .context("Failed to parse DashScope rerank response")?;

        Ok(into_entries(body, documents.len()))
    }
}

/// Keep entries whose index points at a real candidate. `relevance_score`
/// wins over `score` when both are present.
fn into_entries(body: RerankResponse, document_count: usize) -> Vec<RerankEntry> {
    body.output
        .map(|o| o.results)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|r| {
            let index = usize::try_from(r.index?).ok()?;
            if index >= document_count {
                return None;
            }
            Some(RerankEntry {
                index,
                score: r.relevance_score.or(r.score),
            })
        })
        .collect()
}

// ─── Request/Response types ────────────────────────────

#[derive(Serialize)]
struct RerankRequest {
    model: String,
    input: RerankInput,
    top_n: usize,
    return_documents: bool,
}

#[derive(Serialize)]
struct RerankInput {
    query: String,
    documents: Vec<String>,
}

#[derive(Deserialize)]
struct RerankResponse {
    output: Option<RerankOutput>,
}

#[derive(Deserialize)]
struct RerankOutput {
    #[serde(default)]
    results: Vec<RerankResultRaw>,
}

#[derive(Deserialize)]
struct RerankResultRaw {
    index: Option<i64>,
    relevance_score: Option<f32>,
    score: Option<f32>,
}
