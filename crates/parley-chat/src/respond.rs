//! Reply normalization and rendering
//!
//! Upstream replies are first collapsed into plain text. The text is then
//! rendered either as a single completion object or as a series of stream
//! events in the shape the caller declared, ending with `[DONE]`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::{
    protocol::{
        google::{GoogleCandidate, GoogleContent, GoogleResponse, GoogleStreamChunk},
        openai::{
            OpenAiChoice, OpenAiChoiceMessage, OpenAiResponse, OpenAiStreamChoice, OpenAiStreamChunk,
            OpenAiStreamDelta, OpenAiUpstreamResponse, OpenAiUsage,
        },
    },
    types::{Reply, ReplyShape},
};

/// Marker prefixed to the echo when the upstream reply is empty
pub const BLANK_REPLY_MARKER: &str = "[blank reply]";

/// Terminal stream event payload
pub const DONE: &str = "[DONE]";

/// Concatenate text parts of every candidate, skipping reasoning parts
pub fn aggregate_google(response: &GoogleResponse) -> String {
    response
        .candidates
        .iter()
        .filter_map(|candidate| candidate.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter(|part| !part.thought)
                .filter_map(|part| part.text.as_deref())
                .collect::<String>()
        })
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Concatenate the text of every choice carrying any
pub fn aggregate_openai(response: &OpenAiUpstreamResponse) -> String {
    response
        .choices
        .iter()
        .map(|choice| {
            choice
                .message
                .as_ref()
                .map(|message| message_text(&message.content))
                .or_else(|| choice.text.clone())
                .unwrap_or_default()
        })
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Part texts are joined as sent, without whitespace cleanup
fn message_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts.iter().map(part_text).collect(),
        Value::Object(_) => part_text(content).to_owned(),
        _ => String::new(),
    }
}

fn part_text(part: &Value) -> &str {
    match part {
        Value::String(text) => text,
        other => other.get("text").and_then(Value::as_str).unwrap_or_default(),
    }
}

/// Substitute the blank-reply echo for an empty upstream reply
///
/// Returns the text and whether the fallback was used.
pub fn ensure_text(text: String, last_user: Option<&str>) -> (String, bool) {
    if !text.trim().is_empty() {
        return (text, false);
    }

    let echo = match last_user.map(str::trim).filter(|t| !t.is_empty()) {
        Some(user) => format!("{BLANK_REPLY_MARKER} {user}"),
        None => BLANK_REPLY_MARKER.to_owned(),
    };
    (echo, true)
}

/// Approximate token count as one token per four characters
pub fn approx_tokens(chars: usize) -> u32 {
    u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}

/// Split text into chunks of at most `size` characters
pub fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let size = size.max(1);
    let chars = text.chars().collect::<Vec<_>>();
    chars.chunks(size).map(|chunk| chunk.iter().collect()).collect()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

/// Non-streaming body in the caller's declared shape
pub fn completion_body(reply: &Reply) -> Value {
    let body = match reply.shape {
        ReplyShape::OpenAi => serde_json::to_value(openai_completion(reply)),
        ReplyShape::Google => serde_json::to_value(google_response(&reply.text, Some("STOP"))),
    };

    body.unwrap_or(Value::Null)
}

fn openai_completion(reply: &Reply) -> OpenAiResponse {
    let prompt_tokens = approx_tokens(reply.prompt_chars);
    let completion_tokens = approx_tokens(reply.text.chars().count());

    OpenAiResponse {
        id: completion_id(),
        object: "chat.completion".to_owned(),
        created: unix_now(),
        model: reply.model.clone(),
        choices: vec![OpenAiChoice {
            index: 0,
            message: OpenAiChoiceMessage {
                role: "assistant".to_owned(),
                content: reply.text.clone(),
            },
            finish_reason: Some("stop".to_owned()),
        }],
        usage: OpenAiUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        },
    }
}

fn google_response(text: &str, finish_reason: Option<&str>) -> GoogleResponse {
    GoogleResponse {
        candidates: vec![GoogleCandidate {
            content: Some(GoogleContent::text(Some("model"), text)),
            finish_reason: finish_reason.map(str::to_owned),
            index: Some(0),
        }],
        usage_metadata: None,
        prompt_feedback: None,
    }
}

/// Stream event payloads for a reply, `[DONE]` last
pub fn stream_events(reply: &Reply, chunk_chars: usize) -> Vec<String> {
    let chunks = chunk_text(&reply.text, chunk_chars);

    let mut events = match reply.shape {
        ReplyShape::OpenAi => openai_events(reply, &chunks),
        ReplyShape::Google => google_events(&chunks),
    };
    events.push(DONE.to_owned());
    events
}

fn openai_events(reply: &Reply, chunks: &[String]) -> Vec<String> {
    let id = completion_id();
    let created = unix_now();

    let chunk = |delta: OpenAiStreamDelta, finish_reason: Option<&str>| OpenAiStreamChunk {
        id: id.clone(),
        object: "chat.completion.chunk".to_owned(),
        created,
        model: reply.model.clone(),
        choices: vec![OpenAiStreamChoice {
            index: 0,
            delta,
            finish_reason: finish_reason.map(str::to_owned),
        }],
    };

    chunks
        .iter()
        .enumerate()
        .map(|(index, text)| {
            chunk(
                OpenAiStreamDelta {
                    role: (index == 0).then(|| "assistant".to_owned()),
                    content: Some(text.clone()),
                },
                None,
            )
        })
        .chain(std::iter::once(chunk(OpenAiStreamDelta::default(), Some("stop"))))
        .map(|chunk| serde_json::to_string(&chunk).unwrap_or_default())
        .collect()
}

fn google_events(chunks: &[String]) -> Vec<String> {
    let last = chunks.len().saturating_sub(1);

    chunks
        .iter()
        .enumerate()
        .map(|(index, text)| {
            let chunk: GoogleStreamChunk = google_response(text, (index == last).then_some("STOP"));
            serde_json::to_string(&chunk).unwrap_or_default()
        })
        .collect()
}
