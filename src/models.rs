use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Anything that is not `assistant` or `system` is treated as the user.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw {
            Some("assistant") => Role::Assistant,
            Some("system") => Role::System,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// A single prepared chat turn
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

impl ConversationTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }
}

/// Relevance classification plus the cleaned retrieval query.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteOutcome {
    pub is_relevant: bool,
    pub query: String,
}

impl RewriteOutcome {
    /// Fail-open outcome: treat as relevant, search with the original text.
    pub fn passthrough(original: &str) -> Self {
        Self {
            is_relevant: true,
            query: original.to_string(),
        }
    }
}

/// A candidate returned by the vector store
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    pub id: String,
    pub content: String,
    pub payload: Map<String, Value>,
    pub similarity_score: Option<f32>,
}

/// One reranker verdict. `index` points into the candidate list that was sent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankEntry {
    pub index: usize,
    pub score: Option<f32>,
}

/// A selected document with the score shown to the user
#[derive(Debug, Clone, PartialEq)]
pub struct RankedDocument {
    pub document: RetrievedDocument,
    pub relevance_score: f32,
}

/// Citation exposed to the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceItem {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub url: String,
    pub transcript: String,
    pub score: f32,
    pub metadata: SourceTiming,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceTiming {
    pub start_time: f64,
    pub end_time: f64,
}

/// Body of the `sources` SSE event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourcesPayload {
    pub question: String,
    pub rewritten_query: String,
    pub sources: Vec<SourceItem>,
}

/// Chat request. Messages stay as raw JSON: their shape varies by client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
}

impl ChatRequest {
    /// `messages` if it is a non-empty array, else the single `message`.
    pub fn into_raw_messages(self) -> Vec<Value> {
        let mut raw = match self.messages {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        if raw.is_empty() {
            if let Some(message) = self.message.filter(|m| !m.is_null()) {
                raw.push(message);
            }
        }
        raw
    }
}
