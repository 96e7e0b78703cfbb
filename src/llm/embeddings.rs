use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::dashscope::{ensure_success, DashScopeClient};
use super::Embedder;

/// Query embeddings through the OpenAI-compatible `/embeddings` endpoint.
pub struct DashScopeEmbedder {
    client: Arc<DashScopeClient>,
    model: String,
}

impl DashScopeEmbedder {
    pub fn new(client: Arc<DashScopeClient>) -> Self {
        let model = client.config().embedding_model.clone();
        Self { client, model }
    }
}

#[async_trait]
impl Embedder for DashScopeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let req = EmbedRequest {
            model: self.model.clone(),
            input: vec![text.to_string()],
        };

        let resp = self
            .client
            .post(&self.client.compatible_url("embeddings"))
            .await?
            .json(&req)
            .send()
            .await
            .context("Failed to call DashScope embed API")?;
        let resp = ensure_success(resp, "embed API").await?;

        let body: EmbedResponse = resp
            .json()
            .await
            .context("Failed to parse DashScope embed response")?;

        first_embedding(body)
    }
}

fn first_embedding(body: EmbedResponse) -> Result<Vec<f32>> {
    let embedding = body
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .context("No embedding returned")?;
    if embedding.is_empty() {
        anyhow::bail!("DashScope returned an empty embedding");
    }
    Ok(embedding)
}

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}
