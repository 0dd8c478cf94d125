//! OpenAI-compatible adapter, covering OpenAI, custom endpoints and
//! OpenRouter

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use parley_config::OpenRouterConfig;
use secrecy::SecretString;
use serde_json::{Map, Value};
use url::Url;

use super::{Branch, Compat, Completion, UpstreamCall};
use crate::{
    error::UpstreamFailure,
    normalize::{EXTENDED_SAMPLER_KEYS, NormalizeOptions, PASSTHROUGH_KEYS, flatten_content},
    protocol::{
        google::permissive_safety_settings,
        openai::{OpenAiMessage, OpenAiRequest, OpenAiUpstreamResponse, OpenRouterProviderPreferences},
    },
    respond::aggregate_openai,
    transport::{Auth, OutboundRequest, Transport},
    types::ChatRequest,
};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENROUTER_MODEL: &str = "openrouter/auto";

/// # Panics
///
/// Panics if the hardcoded default base URL is invalid (should never happen).
pub fn default_openai_base_url() -> Url {
    Url::parse(DEFAULT_OPENAI_BASE_URL).expect("valid default URL")
}

/// # Panics
///
/// Panics if the hardcoded default base URL is invalid (should never happen).
pub fn default_openrouter_base_url() -> Url {
    Url::parse(DEFAULT_OPENROUTER_BASE_URL).expect("valid default URL")
}

/// OpenRouter request extensions, request values taking precedence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenRouterExtras {
    pub provider_order: Vec<String>,
    pub allow_fallbacks: Option<bool>,
    pub middle_out: bool,
    pub referer: Option<String>,
    pub title: Option<String>,
}

impl OpenRouterExtras {
    pub fn new(request: &crate::types::OpenRouterOptions, config: &OpenRouterConfig) -> Self {
        let provider_order = if request.provider_order.is_empty() {
            config.provider_order.clone()
        } else {
            request.provider_order.clone()
        };

        Self {
            provider_order,
            allow_fallbacks: request.allow_fallbacks.or(config.allow_fallbacks),
            middle_out: request.middle_out.unwrap_or(config.middle_out),
            referer: config.referer.clone(),
            title: config.title.clone(),
        }
    }
}

/// Which OpenAI-compatible upstream is being called
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenAiFlavor {
    OpenAi,
    Custom,
    OpenRouter(OpenRouterExtras),
}

impl OpenAiFlavor {
    /// Sampler parameters the upstream accepts
    fn accepts(&self, key: &str) -> bool {
        match self {
            Self::OpenAi => PASSTHROUGH_KEYS.contains(&key),
            Self::Custom | Self::OpenRouter(_) => {
                PASSTHROUGH_KEYS.contains(&key) || EXTENDED_SAMPLER_KEYS.contains(&key)
            }
        }
    }
}

/// OpenAI chat completions adapter
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    flavor: OpenAiFlavor,
    base_url: Url,
    api_key: Option<SecretString>,
    model: String,
}

impl OpenAiAdapter {
    pub const fn new(flavor: OpenAiFlavor, base_url: Url, api_key: Option<SecretString>, model: String) -> Self {
        Self {
            flavor,
            base_url,
            api_key,
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub const fn branch(&self) -> Branch {
        match self.flavor {
            OpenAiFlavor::OpenAi => Branch::OpenAiCompatible(Compat::OpenAi),
            OpenAiFlavor::Custom => Branch::OpenAiCompatible(Compat::Custom),
            OpenAiFlavor::OpenRouter(_) => Branch::OpenRouter,
        }
    }

    /// Build the chat completions URL
    fn completions_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    /// Translate the assembly plan into a chat completions request
    pub fn build_request(&self, call: UpstreamCall<'_>) -> OpenAiRequest {
        let messages = if call.preserve_structure && !call.plan.strict_latest {
            preserved_messages(call.request, call.plan.latest_user.as_deref())
        } else {
            call.plan
                .chat_messages()
                .into_iter()
                .map(|m| OpenAiMessage::text(m.role.as_str(), m.content))
                .collect()
        };

        let extra = call
            .request
            .passthrough
            .iter()
            .filter(|(key, _)| self.flavor.accepts(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect::<Map<_, _>>();

        let mut wire = OpenAiRequest {
            model: self.model.clone(),
            messages,
            temperature: call.temperature(),
            max_tokens: call.max_tokens(),
            stream: false,
            transforms: None,
            provider: None,
            safety_settings: None,
            extra,
        };

        if let OpenAiFlavor::OpenRouter(extras) = &self.flavor {
            if extras.middle_out {
                wire.transforms = Some(vec!["middle-out".to_owned()]);
            }
            if !extras.provider_order.is_empty() {
                wire.provider = Some(OpenRouterProviderPreferences {
                    order: extras.provider_order.clone(),
                    allow_fallbacks: extras.allow_fallbacks,
                });
            }
            if self.model.starts_with("google/") {
                wire.safety_settings = Some(permissive_safety_settings());
            }
        }

        wire
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let OpenAiFlavor::OpenRouter(extras) = &self.flavor {
            let attribution = [
                ("http-referer", extras.referer.as_deref()),
                ("x-title", extras.title.as_deref()),
            ];

            for (name, value) in attribution {
                let Some(value) = value else { continue };
                match HeaderValue::from_str(value) {
                    Ok(value) => {
                        headers.insert(HeaderName::from_static(name), value);
                    }
                    Err(_) => tracing::warn!(header = name, "skipping invalid OpenRouter attribution header"),
                }
            }
        }

        headers
    }

    pub async fn complete(&self, call: UpstreamCall<'_>, transport: &Transport) -> Result<Completion, UpstreamFailure> {
        let wire_request = self.build_request(call);

        let outbound = OutboundRequest {
            url: self.completions_url(),
            headers: self.headers(),
            auth: self.api_key.clone().map_or(Auth::None, Auth::Bearer),
            body: serde_json::to_value(&wire_request).unwrap_or(Value::Null),
        };

        let delivery = transport.send(&outbound).await?;

        let wire_response: OpenAiUpstreamResponse = serde_json::from_str(&delivery.body).unwrap_or_else(|e| {
            tracing::warn!(model = %self.model, error = %e, "unreadable chat completion body");
            OpenAiUpstreamResponse::default()
        });

        // OpenRouter reports some failures as a 200 with an error object
        if wire_response.choices.is_empty()
            && let Some(error) = &wire_response.error
        {
            let status = error
                .get("code")
                .and_then(Value::as_u64)
                .and_then(|code| u16::try_from(code).ok())
                .and_then(|code| StatusCode::from_u16(code).ok())
                .unwrap_or(delivery.status);

            tracing::warn!(model = %self.model, %status, "upstream returned an error object");
            return Err(UpstreamFailure::new(Some(status), &error.to_string(), delivery.attempts));
        }

        Ok(Completion {
            text: aggregate_openai(&wire_response),
            model: wire_response.model.unwrap_or_else(|| self.model.clone()),
            attempts: delivery.attempts,
        })
    }
}

/// Caller's own message objects, plus the freshest user text when the last
/// user message does not already carry it
fn preserved_messages(request: &ChatRequest, latest_user: Option<&str>) -> Vec<OpenAiMessage> {
    let mut messages = request
        .raw_messages
        .iter()
        .filter_map(|raw| {
            let mut object = raw.as_object()?.clone();
            let role = object.remove("role")?.as_str()?.trim().to_ascii_lowercase();
            let content = object.remove("content").unwrap_or_else(|| Value::String(String::new()));

            Some(OpenAiMessage {
                role,
                content,
                extra: object,
            })
        })
        .collect::<Vec<_>>();

    if let Some(latest) = latest_user {
        let options = NormalizeOptions::default();
        let present = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .is_some_and(|m| flatten_content(&m.content, options).trim() == latest.trim());

        if !present {
            messages.push(OpenAiMessage::text("user", latest));
        }
    }

    messages
}

#[cfg(test)]
mod tests {
    use parley_config::UpstreamConfig;
    use serde_json::json;

    use super::*;
    use crate::{
        assemble::{AssemblyPlan, Fragment, FragmentKind},
        normalize::normalize,
        types::Message,
    };

    fn adapter(flavor: OpenAiFlavor, model: &str) -> OpenAiAdapter {
        OpenAiAdapter::new(flavor, default_openai_base_url(), None, model.to_owned())
    }

    fn plan() -> AssemblyPlan {
        AssemblyPlan {
            fragments: vec![Fragment {
                kind: FragmentKind::UserPriority,
                text: "Answer the latest message.".to_owned(),
            }],
            messages: vec![Message::user("hi")],
            latest_user: Some("hi".to_owned()),
            ..AssemblyPlan::default()
        }
    }

    fn build(adapter: &OpenAiAdapter, plan: &AssemblyPlan, request: &ChatRequest, preserve: bool) -> Value {
        let upstream = UpstreamConfig::default();
        let call = UpstreamCall {
            plan,
            request,
            upstream: &upstream,
            preserve_structure: preserve,
        };
        serde_json::to_value(adapter.build_request(call)).unwrap()
    }

    #[test]
    fn system_instruction_leads() {
        let wire = build(&adapter(OpenAiFlavor::OpenAi, "gpt-4o"), &plan(), &ChatRequest::default(), false);

        assert_eq!(
            wire["messages"],
            json!([
                {"role": "system", "content": "Answer the latest message."},
                {"role": "user", "content": "hi"}
            ])
        );
        assert_eq!(wire["max_tokens"], 1024);
        assert_eq!(wire["stream"], false);
        assert!(wire.get("temperature").is_none());
    }

    #[test]
    fn passthrough_depends_on_flavor() {
        let request = normalize(
            &json!({"top_p": 0.9, "top_k": 40, "min_p": 0.1}),
            NormalizeOptions::default(),
        );

        let wire = build(&adapter(OpenAiFlavor::OpenAi, "gpt-4o"), &plan(), &request, false);
        assert_eq!(wire["top_p"], 0.9);
        assert!(wire.get("top_k").is_none());

        let wire = build(&adapter(OpenAiFlavor::Custom, "local"), &plan(), &request, false);
        assert_eq!(wire["top_k"], 40);
        assert_eq!(wire["min_p"], 0.1);
    }

    #[test]
    fn openrouter_extensions() {
        let extras = OpenRouterExtras {
            provider_order: vec!["DeepInfra".to_owned()],
            allow_fallbacks: Some(false),
            middle_out: true,
            referer: Some("https://parley.example".to_owned()),
            title: Some("Parley".to_owned()),
        };
        let adapter = adapter(OpenAiFlavor::OpenRouter(extras), "google/gemini-pro-1.5");

        let wire = build(&adapter, &plan(), &ChatRequest::default(), false);

        assert_eq!(wire["transforms"], json!(["middle-out"]));
        assert_eq!(wire["provider"], json!({"order": ["DeepInfra"], "allow_fallbacks": false}));
        assert_eq!(wire["safety_settings"][0]["threshold"], "BLOCK_NONE");

        let headers = adapter.headers();
        assert_eq!(headers["http-referer"], "https://parley.example");
        assert_eq!(headers["x-title"], "Parley");
        assert_eq!(adapter.branch(), Branch::OpenRouter);
    }

    #[test]
    fn openrouter_extras_prefer_request_values() {
        let config = OpenRouterConfig {
            provider_order: vec!["Together".to_owned()],
            middle_out: true,
            ..OpenRouterConfig::default()
        };
        let request = crate::types::OpenRouterOptions {
            provider_order: vec!["Fireworks".to_owned()],
            allow_fallbacks: None,
            middle_out: Some(false),
        };

        let extras = OpenRouterExtras::new(&request, &config);

        assert_eq!(extras.provider_order, vec!["Fireworks"]);
        assert!(!extras.middle_out);
    }

    #[test]
    fn preserve_structure_forwards_raw_messages() {
        let request = normalize(
            &json!({
                "messages": [
                    {"role": "system", "content": "persona", "name": "sys"},
                    {"role": "user", "content": [{"type": "text", "text": "earlier"}]},
                    {"role": "tool", "content": "dropped"}
                ]
            }),
            NormalizeOptions::default(),
        );
        let plan = AssemblyPlan {
            latest_user: Some("newest".to_owned()),
            ..plan()
        };

        let wire = build(&adapter(OpenAiFlavor::Custom, "local"), &plan, &request, true);

        assert_eq!(
            wire["messages"],
            json!([
                {"role": "system", "content": "persona", "name": "sys"},
                {"role": "user", "content": [{"type": "text", "text": "earlier"}]},
                {"role": "user", "content": "newest"}
            ])
        );
    }

    #[test]
    fn preserve_structure_does_not_duplicate_latest() {
        let request = normalize(
            &json!({"messages": [{"role": "user", "content": [{"type": "text", "text": "hi"}]}]}),
            NormalizeOptions::default(),
        );

        let wire = build(&adapter(OpenAiFlavor::OpenAi, "gpt-4o"), &plan(), &request, true);

        assert_eq!(wire["messages"].as_array().map(Vec::len), Some(1));
    }
}
