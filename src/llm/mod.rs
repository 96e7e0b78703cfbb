//! Provider seams for the LLM side of the pipeline.
//!
//! The pipeline only talks to these traits; the DashScope clients in the
//! submodules are the production implementations and tests swap in fakes.

pub mod chat_stream;
pub mod dashscope;
pub mod embeddings;
pub mod query_rewrite;
pub mod rerank;

use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::Stream;

use crate::models::{ConversationTurn, RerankEntry};

/// Lazy, finite, non-restartable sequence of answer chunks.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Text embedding provider
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Chat-completion provider
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Single non-streamed completion, returns the assistant text.
    async fn complete(&self, turns: Vec<ConversationTurn>) -> Result<String>;

    /// Streamed completion. Errors before the first chunk are returned
    /// directly; later ones arrive inside the stream.
    async fn stream(&self, turns: Vec<ConversationTurn>) -> Result<ChatStream>;
}

/// Second-stage relevance model
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankEntry>>;
}
