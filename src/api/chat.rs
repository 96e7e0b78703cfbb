use std::convert::Infallible;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures_util::stream::{Stream, StreamExt};
use serde_json::{json, Value};

use crate::chat::messages::prepare_messages;
use crate::chat::{into_events, ChatEvent, APOLOGY_MESSAGE};
use crate::error::ChatError;
use crate::models::ChatRequest;
use crate::state::AppState;

/// POST /api/chat: retrieval-augmented chat with SSE streaming.
pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ChatError> {
    // ── Step 1: Parse and prepare input ───────────────────
    let Json(body) = body.map_err(|rejection| ChatError::validation(rejection.body_text()))?;
    tracing::debug!(payload = %body, "Incoming chat payload");

    let request: ChatRequest = serde_json::from_value(body).unwrap_or_default();
    let turns = prepare_messages(&request.into_raw_messages());

    // ── Step 2: Run the pipeline up to the first token ────
    let reply = state.pipeline.run(turns).await?;
    tracing::info!(
        sources = reply.sources.sources.len(),
        rewritten = %reply.sources.rewritten_query,
        "Streaming answer"
    );

    // ── Step 3: Map to SSE events ─────────────────────────
    let events = into_events(reply, state.idle_timeout)
        .map(|event| Ok::<_, Infallible>(sse_event(&event)));

    Ok(Sse::new(events))
}

fn sse_event(event: &ChatEvent) -> Event {
    let base = Event::default().event(event.name());
    let built = match event {
        ChatEvent::Sources(payload) => base.json_data(payload),
        ChatEvent::Delta(content) => base.json_data(json!({ "content": content })),
        ChatEvent::Apology => base.json_data(json!({ "message": APOLOGY_MESSAGE })),
        ChatEvent::Done => base.json_data(json!({})),
    };

    built.unwrap_or_else(|e| {
        tracing::error!("Failed to encode {} event: {e}", event.name());
        Event::default().event(event.name()).data("{}")
    })
}
