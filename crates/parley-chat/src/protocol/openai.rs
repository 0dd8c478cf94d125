//! `OpenAI` chat completion API wire format types
//!
//! Also covers the OpenRouter extensions, which ride on the same request
//! body.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::google::GoogleSafetySetting;

// -- Request types --

/// `OpenAI` chat completion request
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiRequest {
    /// Model identifier
    pub model: String,
    /// Conversation messages
    pub messages: Vec<OpenAiMessage>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Upstream calls never stream
    pub stream: bool,
    /// OpenRouter prompt transforms (e.g. `middle-out`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transforms: Option<Vec<String>>,
    /// OpenRouter provider routing preferences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<OpenRouterProviderPreferences>,
    /// Gemini safety thresholds forwarded by OpenRouter to Google models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_settings: Option<Vec<GoogleSafetySetting>>,
    /// Forwarded sampler parameters (`top_p`, `stop`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `OpenAI` message within a request
///
/// Content stays a raw value so caller-supplied structured content can be
/// forwarded untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiMessage {
    /// Message role
    pub role: String,
    /// Content (string or array of content parts)
    pub content: Value,
    /// Any other field the caller set on the message
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OpenAiMessage {
    pub fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_owned(),
            content: Value::String(content.into()),
            extra: Map::new(),
        }
    }
}

/// OpenRouter `provider` object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenRouterProviderPreferences {
    /// Providers to try, in order
    pub order: Vec<String>,
    /// Whether other providers may serve the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_fallbacks: Option<bool>,
}

// -- Upstream response types --

/// Upstream chat completion response, read leniently
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiUpstreamResponse {
    /// Model that served the request
    #[serde(default)]
    pub model: Option<String>,
    /// Generated choices
    #[serde(default)]
    pub choices: Vec<OpenAiUpstreamChoice>,
    /// Error object some gateways return with a 200 status
    #[serde(default)]
    pub error: Option<Value>,
}

/// Choice within an upstream response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiUpstreamChoice {
    /// Chat message
    #[serde(default)]
    pub message: Option<OpenAiUpstreamMessage>,
    /// Legacy text completion
    #[serde(default)]
    pub text: Option<String>,
}

/// Message within an upstream choice
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiUpstreamMessage {
    /// String or array of content parts
    #[serde(default)]
    pub content: Value,
}

// -- Caller-facing response types --

/// `OpenAI` chat completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiResponse {
    /// Response identifier
    pub id: String,
    /// Object type
    pub object: String,
    /// Creation timestamp
    pub created: u64,
    /// Model used
    pub model: String,
    /// Generated choices
    pub choices: Vec<OpenAiChoice>,
    /// Token usage
    pub usage: OpenAiUsage,
}

/// Choice within an `OpenAI` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChoice {
    /// Choice index
    pub index: u32,
    /// Generated message
    pub message: OpenAiChoiceMessage,
    /// Why generation stopped
    pub finish_reason: Option<String>,
}

/// Message within an `OpenAI` response choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChoiceMessage {
    /// Role (always "assistant")
    pub role: String,
    /// Text content
    pub content: String,
}

/// Token usage in an `OpenAI` response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiUsage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

// -- Streaming types --

/// `OpenAI` streaming chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiStreamChunk {
    /// Chunk identifier
    pub id: String,
    /// Object type (always "chat.completion.chunk")
    pub object: String,
    /// Creation timestamp
    pub created: u64,
    /// Model used
    pub model: String,
    /// Delta choices
    pub choices: Vec<OpenAiStreamChoice>,
}

/// Choice within a streaming chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiStreamChoice {
    /// Choice index
    pub index: u32,
    /// Incremental delta
    pub delta: OpenAiStreamDelta,
    /// Finish reason (present on final chunk)
    pub finish_reason: Option<String>,
}

/// Delta content within a streaming choice
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAiStreamDelta {
    /// Role (present on first chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Incremental text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_flattens_extra_parameters() {
        let mut extra = Map::new();
        extra.insert("top_p".to_owned(), json!(0.9));

        let request = OpenAiRequest {
            model: "gpt-4o-mini".to_owned(),
            messages: vec![OpenAiMessage::text("user", "hi")],
            temperature: None,
            max_tokens: 128,
            stream: false,
            transforms: None,
            provider: None,
            safety_settings: None,
            extra,
        };

        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "hi"}],
                "max_tokens": 128,
                "stream": false,
                "top_p": 0.9
            })
        );
    }

    #[test]
    fn upstream_response_is_lenient() {
        let response: OpenAiUpstreamResponse = serde_json::from_value(json!({
            "id": "x",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": null}}],
            "system_fingerprint": "fp"
        }))
        .unwrap();

        assert_eq!(response.choices.len(), 1);
        assert!(response.choices[0].message.as_ref().unwrap().content.is_null());

        let response: OpenAiUpstreamResponse =
            serde_json::from_value(json!({"error": {"message": "no credits", "code": 402}})).unwrap();
        assert!(response.choices.is_empty());
        assert!(response.error.is_some());
    }
}
