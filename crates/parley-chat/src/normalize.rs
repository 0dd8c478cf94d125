//! Inbound payload normalization
//!
//! Accepts any JSON value and produces a [`ChatRequest`]. Nothing here fails:
//! fields with the wrong type fall back to their neutral value, messages with
//! an unknown role are dropped and content that cannot be read becomes an
//! empty string.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::types::{ChatRequest, Message, OpenRouterOptions, Role};

/// Generation parameters forwarded to every OpenAI-compatible upstream
pub const PASSTHROUGH_KEYS: &[&str] = &[
    "top_p",
    "frequency_penalty",
    "presence_penalty",
    "stop",
    "seed",
    "logit_bias",
];

/// Extra sampler parameters only some upstreams understand
pub const EXTENDED_SAMPLER_KEYS: &[&str] = &["top_k", "repetition_penalty", "min_p", "top_a"];

/// Options applied while flattening message content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Remove bracketed front-end placeholders such as `[Start a new Chat]`
    pub scrub_meta_brackets: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            scrub_meta_brackets: true,
        }
    }
}

/// Normalize an inbound payload of any shape
pub fn normalize(payload: &Value, options: NormalizeOptions) -> ChatRequest {
    let Some(object) = payload.as_object() else {
        tracing::debug!("chat payload is not an object, treating as empty");
        return ChatRequest::default();
    };

    let (messages, raw_messages) = read_messages(object.get("messages"), options);

    let source = lax_string(object.get("chat_completion_source"))
        .or_else(|| lax_string(object.get("source")));

    let max_tokens = lax_u32(object.get("max_tokens"))
        .or_else(|| lax_u32(object.get("max_output_tokens")));

    let passthrough = PASSTHROUGH_KEYS
        .iter()
        .chain(EXTENDED_SAMPLER_KEYS)
        .filter_map(|key| {
            object
                .get(*key)
                .filter(|value| !value.is_null())
                .map(|value| ((*key).to_owned(), value.clone()))
        })
        .collect::<Map<_, _>>();

    ChatRequest {
        messages,
        raw_messages,
        model: lax_string(object.get("model")),
        source,
        temperature: lax_f64(object.get("temperature")),
        max_tokens,
        stream: lax_bool(object.get("stream")).unwrap_or(false),
        char_name: lax_string(object.get("char_name")),
        user_name: lax_string(object.get("user_name")),
        locale: lax_string(object.get("locale")),
        custom_url: lax_string(object.get("custom_url")),
        strict_latest: lax_bool(object.get("strictLatestOnly"))
            .or_else(|| lax_bool(object.get("strict_latest_only"))),
        passthrough,
        openrouter: read_openrouter(object),
    }
}

fn read_messages(value: Option<&Value>, options: NormalizeOptions) -> (Vec<Message>, Vec<Value>) {
    let Some(items) = value.and_then(Value::as_array) else {
        return (Vec::new(), Vec::new());
    };

    let mut messages = Vec::with_capacity(items.len());
    let mut raw = Vec::with_capacity(items.len());

    for item in items {
        let Some(role) = item.get("role").and_then(Value::as_str).and_then(Role::parse) else {
            continue;
        };

        let content = item.get("content").unwrap_or(&Value::Null);
        messages.push(Message::new(role, flatten_content(content, options)));
        raw.push(item.clone());
    }

    (messages, raw)
}

fn read_openrouter(object: &Map<String, Value>) -> OpenRouterOptions {
    let provider_order = match object.get("provider") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| lax_string(Some(item)))
            .collect(),
        Some(Value::String(single)) if !single.trim().is_empty() => vec![single.trim().to_owned()],
        _ => Vec::new(),
    };

    OpenRouterOptions {
        provider_order,
        allow_fallbacks: lax_bool(object.get("allow_fallbacks")),
        middle_out: lax_bool(object.get("middleout")).or_else(|| lax_bool(object.get("middle_out"))),
    }
}

/// Flatten message content into canonical text
///
/// Strings pass through, arrays of parts are joined, objects are searched
/// for a `text`, `content` or `parts` field. Anything else is empty.
pub fn flatten_content(content: &Value, options: NormalizeOptions) -> String {
    let mut pieces = Vec::new();
    collect_text(content, &mut pieces, 0);

    let joined = pieces.join("\n");
    canonical_text(&joined, options)
}

/// Canonicalize already-flat text
///
/// Applying this twice yields the same result as applying it once.
pub fn canonical_text(text: &str, options: NormalizeOptions) -> String {
    let scrubbed = if options.scrub_meta_brackets {
        scrub_meta_brackets(text)
    } else {
        text.to_owned()
    };

    normalize_whitespace(&scrubbed)
}

const MAX_CONTENT_DEPTH: usize = 8;

fn collect_text(value: &Value, out: &mut Vec<String>, depth: usize) {
    if depth > MAX_CONTENT_DEPTH {
        return;
    }

    match value {
        Value::String(text) => out.push(text.clone()),
        Value::Number(number) => out.push(number.to_string()),
        Value::Array(items) => {
            for item in items {
                collect_text(item, out, depth + 1);
            }
        }
        Value::Object(object) => {
            // Multimodal parts such as `image_url` carry no text
            if let Some(text) = object.get("text") {
                collect_text(text, out, depth + 1);
            } else if let Some(content) = object.get("content") {
                collect_text(content, out, depth + 1);
            } else if let Some(parts) = object.get("parts") {
                collect_text(parts, out, depth + 1);
            }
        }
        Value::Null | Value::Bool(_) => {}
    }
}

fn meta_bracket_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)\[\s*(?:start\s+a\s+new\s+(?:group\s+)?chat|example\s+chat|chat\s+history|continue\s+(?:your|the)\s+last\s+message|system\s+note|ooc)\b[^\]]*\]",
        )
        .expect("valid regex")
    })
}

/// Remove front-end placeholder brackets until none remain
pub fn scrub_meta_brackets(text: &str) -> String {
    let pattern = meta_bracket_pattern();
    let mut current = text.to_owned();

    loop {
        let next = pattern.replace_all(&current, "").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Collapse runs of horizontal whitespace, trim each line and allow at most
/// one blank line between paragraphs
pub fn normalize_whitespace(text: &str) -> String {
    let mut lines = Vec::new();
    let mut blank_run = 0usize;

    for line in text.replace("\r\n", "\n").replace('\r', "\n").split('\n') {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");

        if collapsed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }

        lines.push(collapsed);
    }

    lines.join("\n").trim().to_owned()
}

fn lax_string(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(text) => text.trim().to_owned(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };

    (!text.is_empty()).then_some(text)
}

fn lax_f64(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse().ok()?,
        _ => return None,
    };

    number.is_finite().then_some(number)
}

fn lax_u32(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(number) => number
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .or_else(|| number.as_f64().filter(|f| *f >= 0.0).map(saturating_u32)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn saturating_u32(value: f64) -> u32 {
    value.min(f64::from(u32::MAX)) as u32
}

fn lax_bool(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_i64().map(|n| n != 0),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Some(true),
            "false" | "off" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
