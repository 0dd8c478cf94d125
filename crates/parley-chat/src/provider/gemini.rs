//! Google Generative Language API adapter

use http::HeaderMap;
use secrecy::SecretString;
use serde_json::Value;
use url::Url;

use super::{Completion, UpstreamCall};
use crate::{
    error::UpstreamFailure,
    protocol::google::{GoogleContent, GoogleGenerationConfig, GoogleRequest, GoogleResponse, permissive_safety_settings},
    respond::aggregate_google,
    transport::{Auth, OutboundRequest, Transport},
    types::Role,
};

/// Default Google Generative Language API base URL
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used when neither the request nor the config names one
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Turn sent when assembly left nothing to say; Gemini rejects empty contents
const SYNTHETIC_TURN: &str = "Continue.";

/// # Panics
///
/// Panics if the hardcoded default base URL is invalid (should never happen).
pub fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("valid default URL")
}

/// Gemini `generateContent` adapter
#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    base_url: Url,
    api_key: Option<SecretString>,
    model: String,
}

impl GeminiAdapter {
    pub fn new(base_url: Url, api_key: Option<SecretString>, model: String) -> Self {
        let model = model.trim_start_matches("models/").to_owned();
        Self {
            base_url,
            api_key,
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build the `generateContent` endpoint URL
    fn generate_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/models/{}:generateContent", self.model)
    }

    /// Translate the assembly plan into a Gemini request
    pub fn build_request(&self, call: UpstreamCall<'_>) -> GoogleRequest {
        let plan = call.plan;

        let system = plan.system_instruction();
        let system_instruction = (!system.is_empty()).then(|| GoogleContent::text(None, system));

        let mut contents = plan
            .messages
            .iter()
            .filter(|m| m.has_text())
            .filter_map(|m| match m.role {
                Role::User => Some(GoogleContent::text(Some("user"), m.content.clone())),
                Role::Assistant => Some(GoogleContent::text(Some("model"), m.content.clone())),
                Role::System => None,
            })
            .collect::<Vec<_>>();

        if contents.is_empty() {
            let text = plan
                .anchor
                .as_deref()
                .or(plan.latest_user.as_deref())
                .unwrap_or(SYNTHETIC_TURN);
            contents.push(GoogleContent::text(Some("user"), text));
        }

        let passthrough = &call.request.passthrough;
        let generation_config = GoogleGenerationConfig {
            temperature: call.temperature(),
            top_p: passthrough.get("top_p").and_then(Value::as_f64),
            top_k: passthrough
                .get("top_k")
                .and_then(Value::as_u64)
                .and_then(|k| u32::try_from(k).ok()),
            max_output_tokens: Some(call.max_tokens()),
            stop_sequences: passthrough.get("stop").and_then(stop_sequences),
            candidate_count: Some(1),
        };

        GoogleRequest {
            contents,
            system_instruction,
            generation_config: Some(generation_config),
            safety_settings: permissive_safety_settings(),
        }
    }

    pub async fn complete(&self, call: UpstreamCall<'_>, transport: &Transport) -> Result<Completion, UpstreamFailure> {
        let wire_request = self.build_request(call);

        let outbound = OutboundRequest {
            url: self.generate_url(),
            headers: HeaderMap::new(),
            auth: self
                .api_key
                .clone()
                .map_or(Auth::None, |key| Auth::Header("x-goog-api-key", key)),
            body: serde_json::to_value(&wire_request).unwrap_or(Value::Null),
        };

        let delivery = transport.send(&outbound).await?;

        let wire_response: GoogleResponse = serde_json::from_str(&delivery.body).unwrap_or_else(|e| {
            tracing::warn!(model = %self.model, error = %e, "unreadable Gemini response body");
            GoogleResponse::default()
        });

        if wire_response.candidates.is_empty() && wire_response.prompt_feedback.is_some() {
            tracing::warn!(model = %self.model, "Gemini blocked the prompt");
        }

        Ok(Completion {
            text: aggregate_google(&wire_response),
            model: self.model.clone(),
            attempts: delivery.attempts,
        })
    }
}

/// `stop` may be a single string or a list
fn stop_sequences(value: &Value) -> Option<Vec<String>> {
    let sequences = match value {
        Value::String(single) => vec![single.clone()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).map(str::to_owned).collect(),
        _ => return None,
    };

    (!sequences.is_empty()).then_some(sequences)
}
