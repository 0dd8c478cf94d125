//! Upstream selection and provider adapters
//!
//! A request's declared source is resolved once into a [`Branch`], then into
//! a concrete [`Adapter`]. Missing credentials or base URLs are not errors:
//! they degrade the adapter to [`Adapter::Demo`] with a recorded reason.

pub mod demo;
pub mod gemini;
pub mod openai;

use parley_config::{ProvidersConfig, UpstreamConfig};
use secrecy::SecretString;
use url::Url;

use crate::{
    assemble::AssemblyPlan,
    error::UpstreamFailure,
    secrets::{SecretKey, SecretResolver},
    transport::Transport,
    types::{ChatRequest, ReplyShape},
};

pub use demo::DemoAdapter;
pub use gemini::GeminiAdapter;
pub use openai::{OpenAiAdapter, OpenAiFlavor, OpenRouterExtras};

/// Which OpenAI-compatible source was declared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compat {
    OpenAi,
    /// Caller-supplied endpoint
    Custom,
}

/// Upstream family handling a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Gemini,
    OpenAiCompatible(Compat),
    OpenRouter,
    Demo,
}

impl Branch {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAiCompatible(Compat::OpenAi) => "openai",
            Self::OpenAiCompatible(Compat::Custom) => "custom",
            Self::OpenRouter => "openrouter",
            Self::Demo => "demo",
        }
    }

    /// Reply shape the caller expects from this branch
    pub const fn reply_shape(self) -> ReplyShape {
        match self {
            Self::Gemini => ReplyShape::Google,
            Self::OpenAiCompatible(_) | Self::OpenRouter | Self::Demo => ReplyShape::OpenAi,
        }
    }
}

/// Why a request did not get a real upstream answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    MissingSource,
    UnsupportedSource,
    MissingCredential,
    MissingBaseUrl,
    InvalidBaseUrl,
    BlankReply,
    /// Upstream failed and the arithmetic was answered locally
    LocalArithmetic,
}

impl FallbackReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingSource => "missing_source",
            Self::UnsupportedSource => "unsupported_source",
            Self::MissingCredential => "missing_credential",
            Self::MissingBaseUrl => "missing_base_url",
            Self::InvalidBaseUrl => "invalid_base_url",
            Self::BlankReply => "blank_reply",
            Self::LocalArithmetic => "local_arithmetic",
        }
    }
}

/// Branch chosen for a request, with the reason when it is a fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub branch: Branch,
    pub fallback: Option<FallbackReason>,
}

/// Resolve the declared source and model into a branch
///
/// A model carrying the Gemini prefix always selects the Gemini branch,
/// whatever the declared source.
pub fn select_branch(source: Option<&str>, model: Option<&str>, gemini_prefix: &str) -> Selection {
    let selected = |branch| Selection { branch, fallback: None };

    if !gemini_prefix.is_empty()
        && model.is_some_and(|m| m.trim_start_matches("models/").starts_with(gemini_prefix))
    {
        return selected(Branch::Gemini);
    }

    let Some(source) = source else {
        return Selection {
            branch: Branch::Demo,
            fallback: Some(FallbackReason::MissingSource),
        };
    };

    match source.trim().to_ascii_lowercase().as_str() {
        "makersuite" | "gemini" | "google" => selected(Branch::Gemini),
        "openai" => selected(Branch::OpenAiCompatible(Compat::OpenAi)),
        "custom" => selected(Branch::OpenAiCompatible(Compat::Custom)),
        "openrouter" => selected(Branch::OpenRouter),
        "demo" => selected(Branch::Demo),
        other => {
            tracing::debug!(source = other, "unsupported chat completion source");
            Selection {
                branch: Branch::Demo,
                fallback: Some(FallbackReason::UnsupportedSource),
            }
        }
    }
}

/// Reason an upstream adapter could not be built
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Unavailable {
    #[error("no credential for '{}'", .0.as_str())]
    MissingCredential(SecretKey),

    #[error("no base URL configured")]
    MissingBaseUrl,

    #[error("invalid base URL '{0}'")]
    InvalidBaseUrl(String),
}

impl Unavailable {
    pub const fn reason(&self) -> FallbackReason {
        match self {
            Self::MissingCredential(_) => FallbackReason::MissingCredential,
            Self::MissingBaseUrl => FallbackReason::MissingBaseUrl,
            Self::InvalidBaseUrl(_) => FallbackReason::InvalidBaseUrl,
        }
    }
}

/// Everything an adapter reads to build its upstream request
#[derive(Debug, Clone, Copy)]
pub struct UpstreamCall<'a> {
    pub plan: &'a AssemblyPlan,
    pub request: &'a ChatRequest,
    pub upstream: &'a UpstreamConfig,
    /// Forward the caller's own message array
    pub preserve_structure: bool,
}

impl UpstreamCall<'_> {
    pub fn max_tokens(&self) -> u32 {
        self.upstream.clamp_max_tokens(self.request.max_tokens)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.upstream.clamp_temperature(self.request.temperature)
    }
}

/// Reply text produced by an adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub model: String,
    /// Upstream calls made, zero for local replies
    pub attempts: u32,
}

/// Adapter resolved for one request
#[derive(Debug, Clone)]
pub enum Adapter {
    Gemini(GeminiAdapter),
    OpenAi(OpenAiAdapter),
    Demo(DemoAdapter),
}

impl Adapter {
    pub fn branch(&self) -> Branch {
        match self {
            Self::Gemini(_) => Branch::Gemini,
            Self::OpenAi(adapter) => adapter.branch(),
            Self::Demo(_) => Branch::Demo,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::Gemini(adapter) => adapter.model(),
            Self::OpenAi(adapter) => adapter.model(),
            Self::Demo(_) => demo::DEMO_MODEL,
        }
    }

    /// Produce the reply text
    ///
    /// # Errors
    ///
    /// Returns the terminal [`UpstreamFailure`] from the transport.
    pub async fn complete(&self, call: UpstreamCall<'_>, transport: &Transport) -> Result<Completion, UpstreamFailure> {
        match self {
            Self::Gemini(adapter) => adapter.complete(call, transport).await,
            Self::OpenAi(adapter) => adapter.complete(call, transport).await,
            Self::Demo(adapter) => Ok(adapter.complete(call)),
        }
    }
}

/// Resolve the adapter for a branch
///
/// # Errors
///
/// Returns [`Unavailable`] when the credential or base URL for the branch
/// cannot be found. Callers degrade to [`DemoAdapter`].
pub async fn resolve_adapter(
    branch: Branch,
    request: &ChatRequest,
    user: &str,
    secrets: &SecretResolver,
    providers: &ProvidersConfig,
) -> Result<Adapter, Unavailable> {
    match branch {
        Branch::Gemini => {
            let config = &providers.gemini;
            let api_key = credential(secrets, user, SecretKey::Gemini, config.api_key.as_ref(), config.require_api_key).await?;
            let base_url = config.base_url.clone().unwrap_or_else(gemini::default_base_url);
            let model = model_name(request, config.default_model.as_deref(), gemini::DEFAULT_MODEL);

            Ok(Adapter::Gemini(GeminiAdapter::new(base_url, api_key, model)))
        }
        Branch::OpenAiCompatible(Compat::OpenAi) => {
            let config = &providers.openai;
            let api_key = credential(secrets, user, SecretKey::OpenAi, config.api_key.as_ref(), config.require_api_key).await?;
            let base_url = config.base_url.clone().unwrap_or_else(openai::default_openai_base_url);
            let model = model_name(request, config.default_model.as_deref(), openai::DEFAULT_OPENAI_MODEL);

            Ok(Adapter::OpenAi(OpenAiAdapter::new(OpenAiFlavor::OpenAi, base_url, api_key, model)))
        }
        Branch::OpenAiCompatible(Compat::Custom) => {
            let config = &providers.custom;
            let base_url = match request.custom_url.as_deref() {
                Some(raw) => Url::parse(raw).map_err(|_| Unavailable::InvalidBaseUrl(raw.to_owned()))?,
                None => config.base_url.clone().ok_or(Unavailable::MissingBaseUrl)?,
            };
            let api_key = credential(secrets, user, SecretKey::Custom, config.api_key.as_ref(), config.require_api_key).await?;
            let model = model_name(request, config.default_model.as_deref(), "");

            Ok(Adapter::OpenAi(OpenAiAdapter::new(OpenAiFlavor::Custom, base_url, api_key, model)))
        }
        Branch::OpenRouter => {
            let config = &providers.openrouter;
            let api_key = credential(secrets, user, SecretKey::OpenRouter, config.api_key.as_ref(), true).await?;
            let base_url = config.base_url.clone().unwrap_or_else(openai::default_openrouter_base_url);
            let model = model_name(request, config.default_model.as_deref(), openai::DEFAULT_OPENROUTER_MODEL);
            let extras = OpenRouterExtras::new(&request.openrouter, config);

            Ok(Adapter::OpenAi(OpenAiAdapter::new(
                OpenAiFlavor::OpenRouter(extras),
                base_url,
                api_key,
                model,
            )))
        }
        Branch::Demo => Ok(Adapter::Demo(DemoAdapter)),
    }
}

async fn credential(
    secrets: &SecretResolver,
    user: &str,
    key: SecretKey,
    default: Option<&SecretString>,
    required: bool,
) -> Result<Option<SecretString>, Unavailable> {
    match secrets.resolve(user, key, default).await {
        Some(resolved) => Ok(Some(resolved.value)),
        None if required => Err(Unavailable::MissingCredential(key)),
        None => Ok(None),
    }
}

fn model_name(request: &ChatRequest, configured: Option<&str>, builtin: &str) -> String {
    request
        .model
        .as_deref()
        .or(configured)
        .unwrap_or(builtin)
        .to_owned()
}
