//! Normalizes raw client messages into plain-text conversation turns.

use serde_json::Value;

use crate::error::ChatError;
use crate::models::{ConversationTurn, Role};

pub const MISSING_MESSAGES: &str = "Messages array is required.";
pub const MISSING_USER_MESSAGE: &str = "A user message is required.";

/// Extract one plain-text turn per raw message, dropping messages that end
/// up blank. Order is preserved.
pub fn prepare_messages(raw: &[Value]) -> Vec<ConversationTurn> {
    raw.iter()
        .filter_map(|message| {
            let role = Role::normalize(message.get("role").and_then(Value::as_str));
            let mut text = text_from_parts(message.get("parts"));
            if text.is_empty() {
                text = plain_text(message.get("content"));
            }
            let text = text.trim();
            (!text.is_empty()).then(|| ConversationTurn::new(role, text))
        })
        .collect()
}

/// Reject input the pipeline cannot answer. Runs before any provider call.
pub fn validate_turns(turns: &[ConversationTurn]) -> Result<(), ChatError> {
    if turns.is_empty() {
        return Err(ChatError::validation(MISSING_MESSAGES));
    }
    if !turns.iter().any(|t| t.role == Role::User) {
        return Err(ChatError::validation(MISSING_USER_MESSAGE));
    }
    Ok(())
}

/// The question being asked right now.
pub fn latest_user_text(turns: &[ConversationTurn]) -> Option<&str> {
    turns
        .iter()
        .rev()
        .find(|t| t.role == Role::User)
        .map(|t| t.text.as_str())
}

fn text_from_parts(parts: Option<&Value>) -> String {
    let Some(Value::Array(parts)) = parts else {
        return String::new();
    };

    let mut text = String::new();
    for part in parts {
        let piece = match part.get("type").and_then(Value::as_str) {
            Some("text") => str_field(part, "text"),
            Some("input_text") => {
                str_field(part, "input_text").or_else(|| str_field(part, "text"))
            }
            _ => str_field(part, "content"),
        };
        text.push_str(piece.unwrap_or_default());
    }
    text
}

fn plain_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(fragments)) => fragments
            .iter()
            .filter(|f| f.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|f| str_field(f, "text"))
            .collect(),
        _ => String::new(),
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}
