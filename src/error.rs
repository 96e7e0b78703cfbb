//! Error types surfaced at the HTTP boundary

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Message shown to the client for any mandatory-step failure. The cause is
/// only logged.
pub const GENERIC_FAILURE_MESSAGE: &str = "Unable to generate a response right now.";

/// Chat pipeline errors
#[derive(Debug, Error)]
pub enum ChatError {
    /// Malformed or empty input, rejected before any provider call
    #[error("{0}")]
    Validation(String),

    /// Embedding, retrieval or generation failed
    #[error("upstream failure: {0:#}")]
    Upstream(#[from] anyhow::Error),
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ChatError::Validation(msg) => msg.clone(),
            ChatError::Upstream(err) => {
                tracing::error!(error = %format!("{err:#}"), "Chat pipeline failed");
                GENERIC_FAILURE_MESSAGE.to_string()
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_bad_request() {
        let err = ChatError::validation("Messages array is required.");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Messages array is required.");
    }

    #[test]
    fn test_upstream_maps_to_internal_error() {
        let err = ChatError::from(anyhow::anyhow!("qdrant unreachable"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_upstream_response_hides_cause() {
        let response = ChatError::from(anyhow::anyhow!("secret stack")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "error": GENERIC_FAILURE_MESSAGE }));
        assert!(!String::from_utf8_lossy(&bytes).contains("secret stack"));
    }
}
