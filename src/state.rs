use std::sync::Arc;
use std::time::Duration;

use crate::chat::ChatPipeline;
use crate::config::Config;
use crate::llm::chat_stream::DashScopeChat;
use crate::llm::dashscope::DashScopeClient;
use crate::llm::embeddings::DashScopeEmbedder;
use crate::llm::query_rewrite::QueryRewriter;
use crate::llm::rerank::DashScopeReranker;
use crate::search::qdrant::QdrantStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ChatPipeline>,
    pub idle_timeout: Duration,
}

impl AppState {
    pub fn new(pipeline: ChatPipeline, idle_timeout: Duration) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            idle_timeout,
        }
    }

    /// Wire the DashScope and Qdrant clients. Nothing touches the network
    /// here: credentials and connections are checked on first use.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let dashscope = Arc::new(DashScopeClient::with_default_http(config.dashscope.clone())?);

        let chat = Arc::new(DashScopeChat::new(
            dashscope.clone(),
            config.dashscope.chat_model.clone(),
        ));
        let rewrite_model = Arc::new(DashScopeChat::new(
            dashscope.clone(),
            config.dashscope.rewrite_model.clone(),
        ));

        let pipeline = ChatPipeline::new(
            Arc::new(DashScopeEmbedder::new(dashscope.clone())),
            Arc::new(QdrantStore::new(config.qdrant.clone())),
            Arc::new(DashScopeReranker::new(dashscope)),
            chat,
            QueryRewriter::new(rewrite_model),
            config.retrieval.clone(),
        );

        Ok(Self::new(
            pipeline,
            Duration::from_secs(config.idle_timeout_secs),
        ))
    }
}
