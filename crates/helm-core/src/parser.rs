//! Line-to-message parsing: strict JSON envelopes with a plain-text fallback.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::next_timestamp;
use crate::lines::LineStream;
use crate::pipe::MsgPipe;

/// Where a user message came from: the strict JSON envelope path or the
/// loose plain-text fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageOrigin {
    StrictJson,
    PlainText,
}

/// A validated user directive. The envelope's `type == "user"` and
/// `role == "user"` invariants are enforced at decode time; `ts` is
/// monotonic within the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: String,
    pub origin: MessageOrigin,
    pub ts: i64,
}

impl UserMessage {
    pub fn strict(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            origin: MessageOrigin::StrictJson,
            ts: next_timestamp(),
        }
    }

    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            origin: MessageOrigin::PlainText,
            ts: next_timestamp(),
        }
    }

    /// Serializes back to the strict wire envelope.
    pub fn to_strict_envelope(&self) -> String {
        serde_json::json!({
            "type": "user",
            "message": { "role": "user", "content": self.content },
        })
        .to_string()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    message: EnvelopeMessage,
}

#[derive(Debug, Deserialize)]
struct EnvelopeMessage {
    role: String,
    content: Value,
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Extracts a prompt string from a content value, leniently.
///
/// Strings pass through; objects prefer a `text` key, then a `content` key,
/// then their JSON form; arrays take `text` from each object item (items
/// without one are stringified) joined with newlines; anything else is
/// stringified with surrounding quotes trimmed.
pub fn extract_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Object(map) => {
            if let Some(text) = map.get("text") {
                value_to_text(text)
            } else if let Some(inner) = map.get("content") {
                value_to_text(inner)
            } else {
                content.to_string()
            }
        }
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => map.get("text").map(value_to_text).unwrap_or_else(|| item.to_string()),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
        other => other.to_string().trim_matches('"').to_string(),
    }
}

// Strict shapes: string, object-with-`text`, array-of-objects-with-`text`.
// Validation is strict; the extraction itself is the shared lenient one.
fn extract_strict_text(content: &Value) -> Option<String> {
    let valid = match content {
        Value::String(_) => true,
        Value::Object(map) => map.get("text").map_or(false, Value::is_string),
        Value::Array(items) => items.iter().all(|item| {
            item.as_object()
                .and_then(|map| map.get("text"))
                .map_or(false, Value::is_string)
        }),
        _ => false,
    };
    valid.then(|| extract_text(content))
}

/// Parses one line. Returns `None` for empty lines and for well-formed JSON
/// objects that fail strict envelope validation (those are dropped, not
/// propagated). Anything that is not a JSON object becomes plain text.
pub fn parse_line(line: &str) -> Option<UserMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(_)) => match serde_json::from_str::<Envelope>(trimmed) {
            Ok(envelope) if envelope.kind == "user" && envelope.message.role == "user" => {
                match extract_strict_text(&envelope.message.content) {
                    Some(text) if !text.trim().is_empty() => Some(UserMessage::strict(text)),
                    _ => {
                        log::warn!("dropping user envelope with invalid content shape");
                        None
                    }
                }
            }
            Ok(envelope) => {
                log::warn!(
                    "dropping envelope with type={} role={}",
                    envelope.kind,
                    envelope.message.role
                );
                None
            }
            Err(error) => {
                log::warn!("dropping malformed envelope: {error}");
                None
            }
        },
        _ => Some(UserMessage::plain(trimmed)),
    }
}

/// Transforms a line stream into validated user messages on `output`.
///
/// Runs until the upstream completes, then completes `output`. A producer
/// error is re-latched on `output` so the downstream consumer observes it
/// once; line order is preserved end to end.
pub struct MessageParser;

impl MessageParser {
    pub async fn run(mut lines: LineStream, output: Arc<MsgPipe<UserMessage>>) {
        while let Some(item) = lines.next_line().await {
            match item {
                Ok(line) => {
                    if let Some(message) = parse_line(&line) {
                        output.enqueue(message);
                    }
                }
                Err(error) => {
                    log::warn!("input pipe error reached parser: {error}");
                    output.error(error.message);
                }
            }
        }
        output.complete();
    }
}
