use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// DashScope provider configuration (chat, rewrite, embeddings, rerank)
    pub dashscope: DashScopeConfig,
    /// Qdrant connection parameters
    pub qdrant: QdrantConfig,
    /// Retrieval and selection limits
    pub retrieval: RetrievalConfig,
    /// Seconds to wait for the next generation chunk before giving up
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashScopeConfig {
    /// API key. Checked the first time a DashScope client is used.
    pub api_key: Option<String>,
    /// OpenAI-compatible base URL (chat completions and embeddings)
    pub base_url: String,
    /// Native text-rerank endpoint
    pub rerank_url: String,
    /// Model used to stream answers
    pub chat_model: String,
    /// Model used for relevance classification + query rewriting
    pub rewrite_model: String,
    /// Model used for query embeddings
    pub embedding_model: String,
    /// Model used for reranking
    pub rerank_model: String,
}

/// Connection parameters for the Qdrant collection. Required fields are
/// optional here so a missing value surfaces on first use, not at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QdrantConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub collection: Option<String>,
    /// Named vector to search, for collections with several vectors
    pub vector_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates fetched from the vector store
    pub top_k: usize,
    /// Sources kept after reranking
    pub rerank_top_n: usize,
    /// Character budget for each snippet injected into the prompt
    pub context_snippet_chars: usize,
    /// Character budget for the transcript exposed in each source item
    pub source_transcript_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            dashscope: DashScopeConfig::default(),
            qdrant: QdrantConfig::default(),
            retrieval: RetrievalConfig::default(),
            idle_timeout_secs: 30,
        }
    }
}

impl Default for DashScopeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            rerank_url:
                "https://dashscope.aliyuncs.com/api/v1/services/rerank/text-rerank/text-rerank"
                    .to_string(),
            chat_model: "qwen-max".to_string(),
            rewrite_model: "qwen-turbo".to_string(),
            embedding_model: "text-embedding-v3".to_string(),
            rerank_model: "gte-rerank".to_string(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 20,
            rerank_top_n: 5,
            context_snippet_chars: 700,
            source_transcript_chars: 400,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup. Empty values are
    /// treated as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(addr) = var("CHAT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        // Zero would time out every answer before its first chunk
        if let Some(val) = var("CHAT_IDLE_TIMEOUT_SECS") {
            if let Ok(v) = val.parse::<u64>() {
                if v > 0 {
                    config.idle_timeout_secs = v;
                }
            }
        }

        // DashScope
        if let Some(key) = var("DASHSCOPE_API_KEY") {
            config.dashscope.api_key = Some(key);
        }
        if let Some(url) = var("DASHSCOPE_BASE_URL") {
            config.dashscope.base_url = url;
        }
        if let Some(url) = var("DASHSCOPE_RERANK_URL") {
            config.dashscope.rerank_url = url;
        }
        if let Some(model) = var("DASHSCOPE_CHAT_MODEL") {
            config.dashscope.chat_model = model;
        }
        if let Some(model) = var("DASHSCOPE_REWRITE_MODEL") {
            config.dashscope.rewrite_model = model;
        }
        if let Some(model) = var("DASHSCOPE_EMBEDDING_MODEL") {
            config.dashscope.embedding_model = model;
        }
        if let Some(model) = var("DASHSCOPE_RERANK_MODEL") {
            config.dashscope.rerank_model = model;
        }

        // Qdrant
        config.qdrant.url = var("QDRANT_URL");
        config.qdrant.api_key = var("QDRANT_API_KEY");
        config.qdrant.collection = var("QDRANT_COLLECTION");
        config.qdrant.vector_name = var("QDRANT_VECTOR_NAME");

        // Retrieval limits
        if let Some(val) = var("RAG_TOP_K") {
            if let Ok(v) = val.parse() {
                config.retrieval.top_k = v;
            }
        }
        if let Some(val) = var("RAG_RERANK_TOP_N") {
            if let Ok(v) = val.parse() {
                config.retrieval.rerank_top_n = v;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.retrieval.top_k, 20);
        assert_eq!(config.retrieval.rerank_top_n, 5);
        assert_eq!(config.dashscope.chat_model, "qwen-max");
        assert!(config.dashscope.api_key.is_none());
        assert!(config.qdrant.url.is_none());
    }

    #[test]
    fn test_overrides_applied() {
        let config = Config::from_lookup(lookup(&[
            ("DASHSCOPE_API_KEY", "sk-test"),
            ("QDRANT_URL", "http://localhost:6334"),
            ("QDRANT_COLLECTION", "segments_zh"),
            ("QDRANT_VECTOR_NAME", "text-embedding-v3"),
            ("RAG_TOP_K", "40"),
        ]));
        assert_eq!(config.dashscope.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.qdrant.collection.as_deref(), Some("segments_zh"));
        assert_eq!(config.qdrant.vector_name.as_deref(), Some("text-embedding-v3"));
        assert_eq!(config.retrieval.top_k, 40);
    }

    #[test]
    fn test_unparseable_number_keeps_default() {
        let config = Config::from_lookup(lookup(&[("RAG_RERANK_TOP_N", "five")]));
        assert_eq!(config.retrieval.rerank_top_n, 5);
    }

    #[test]
    fn test_idle_timeout_zero_keeps_default() {
        let config = Config::from_lookup(lookup(&[("CHAT_IDLE_TIMEOUT_SECS", "0")]));
        assert_eq!(config.idle_timeout_secs, 30);

        let config = Config::from_lookup(lookup(&[("CHAT_IDLE_TIMEOUT_SECS", "45")]));
        assert_eq!(config.idle_timeout_secs, 45);
    }

    #[test]
    fn test_blank_value_counts_as_unset() {
        let config = Config::from_lookup(lookup(&[("DASHSCOPE_API_KEY", "  ")]));
        assert!(config.dashscope.api_key.is_none());
    }
}
