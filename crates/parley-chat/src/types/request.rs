use serde_json::{Map, Value};

use super::message::{Message, Role};

/// OpenRouter-only options carried on the inbound request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenRouterOptions {
    /// Preferred upstream provider order
    pub provider_order: Vec<String>,
    /// Let OpenRouter route outside the order
    pub allow_fallbacks: Option<bool>,
    /// Request the `middle-out` transform
    pub middle_out: Option<bool>,
}

/// Inbound chat request after normalization
///
/// Produced by [`crate::normalize::normalize`] from a payload of any shape.
/// Every field has a neutral value, so later stages never need to reject.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    /// Canonical messages, unknown roles already dropped
    pub messages: Vec<Message>,
    /// Caller's original message objects with a known role, untouched
    pub raw_messages: Vec<Value>,
    /// Declared model identifier
    pub model: Option<String>,
    /// Declared upstream source (`makersuite`, `openai`, `custom`, ...)
    pub source: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub stream: bool,
    /// Character display name
    pub char_name: Option<String>,
    /// User display name
    pub user_name: Option<String>,
    /// Caller locale tag (e.g. `zh-CN`)
    pub locale: Option<String>,
    /// Base URL for the `custom` source
    pub custom_url: Option<String>,
    /// Per-request override of strict-latest mode
    pub strict_latest: Option<bool>,
    /// Generation parameters eligible for forwarding, keyed by wire name
    pub passthrough: Map<String, Value>,
    pub openrouter: OpenRouterOptions,
}

impl ChatRequest {
    /// Text of the last non-empty user message
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User && m.has_text())
            .map(|m| m.content.as_str())
    }

    /// Text of the last non-empty message of any role
    pub fn last_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.has_text())
            .map(|m| m.content.as_str())
    }

    /// Caller's own system text, joined in request order
    pub fn system_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::System && m.has_text())
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
