use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use super::dashscope::{ensure_success, DashScopeClient};
use super::{ChatModel, ChatStream};
use crate::models::ConversationTurn;

/// Chat completions against DashScope's OpenAI-compatible endpoint with a
/// fixed model id.
pub struct DashScopeChat {
    client: Arc<DashScopeClient>,
    model: String,
}

impl DashScopeChat {
    pub fn new(client: Arc<DashScopeClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, turns: Vec<ConversationTurn>, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: turns
                .into_iter()
                .map(|t| WireMessage {
                    role: t.role.as_str().to_string(),
                    content: t.text,
                })
                .collect(),
            stream,
        }
    }
}

#[async_trait]
impl ChatModel for DashScopeChat {
    async fn complete(&self, turns: Vec<ConversationTurn>) -> Result<String> {
        let req = self.request(turns, false);

        let resp = self
            .client
            .post(&self.client.compatible_url("chat/completions"))
            .await?
            .json(&req)
            .send()
            .await
            .context("Failed to call DashScope chat API")?;
        let resp = ensure_success(resp, "chat API").await?;

        let body: CompletionResponse = resp
            .json()
            .await
            .context("Failed to parse DashScope chat response")?;
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn stream(&self, turns: Vec<ConversationTurn>) -> Result<ChatStream> {
        let req = self.request(turns, true);

        let resp = self
            .client
            .post(&self.client.compatible_url("chat/completions"))
            .await?
            .timeout(Duration::from_secs(300))
            .json(&req)
            .send()
            .await
            .context("Failed to connect to DashScope for chat streaming")?;
        let resp = ensure_success(resp, "chat stream").await?;

        let stream = stream_lines(resp.bytes_stream()).filter_map(|line_result| async move {
            match line_result {
                Ok(line) => parse_sse_line(&line),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(stream))
    }
}

// ─── Wire types ──────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// Parse a single SSE line. Returns:
/// - Some(Ok(content)) for content deltas
/// - Some(Err(e)) for parse errors
/// - None to skip (empty lines, [DONE], role-only chunks)
fn parse_sse_line(line: &str) -> Option<Result<String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let data = line.strip_prefix("data:")?.trim();

    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            let content = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .unwrap_or_default();
            if content.is_empty() {
                return None;
            }
            Some(Ok(content))
        }
        Err(e) => Some(Err(anyhow::anyhow!("Failed to parse chat chunk: {e}"))),
    }
}

// ─── Line buffering ──────────────────────────────────────

/// Convert a byte stream into a stream of complete lines.
fn stream_lines(
    byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send {
    lines_from(byte_stream.map(|chunk| chunk.map_err(anyhow::Error::from)))
}

fn lines_from(
    byte_stream: impl Stream<Item = Result<bytes::Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send {
    futures_util::stream::unfold(
        (Box::pin(byte_stream), Vec::<u8>::new()),
        |(mut stream, mut buffer)| async move {
            loop {
                // Split on raw bytes so multi-byte characters cut across
                // network chunks are reassembled before decoding.
                if let Some(newline_pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=newline_pos).collect();
                    let line = String::from_utf8_lossy(&line).trim_end().to_string();
                    if !line.trim().is_empty() {
                        return Some((Ok(line), (stream, buffer)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        return Some((
                            Err(e.context("Stream read error")),
                            (stream, buffer),
                        ));
                    }
                    None => {
                        if !buffer.iter().all(u8::is_ascii_whitespace) {
                            let remaining = String::from_utf8_lossy(&buffer).to_string();
                            buffer.clear();
                            return Some((Ok(remaining), (stream, buffer)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}
