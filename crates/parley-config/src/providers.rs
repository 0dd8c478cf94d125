use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Process-wide defaults per upstream family
///
/// Consulted only after the per-user and guest secret scopes miss.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub gemini: ProviderConfig,
    #[serde(default)]
    pub openai: ProviderConfig,
    /// Generic OpenAI-compatible endpoint (local servers, proxies)
    #[serde(default)]
    pub custom: ProviderConfig,
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
}

/// Defaults for a single upstream family
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Fallback API key
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Model used when the request names none
    #[serde(default)]
    pub default_model: Option<String>,
    /// Degrade to the demo reply when no key resolves
    #[serde(default = "default_require_api_key")]
    pub require_api_key: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            default_model: None,
            require_api_key: default_require_api_key(),
        }
    }
}

/// OpenRouter defaults, including its request extensions
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenRouterConfig {
    #[serde(default)]
    pub api_key: Option<SecretString>,
    #[serde(default)]
    pub base_url: Option<Url>,
    #[serde(default)]
    pub default_model: Option<String>,
    /// Preferred upstream provider order
    #[serde(default)]
    pub provider_order: Vec<String>,
    /// Let OpenRouter route outside `provider_order`
    #[serde(default)]
    pub allow_fallbacks: Option<bool>,
    /// Always request the `middle-out` transform
    #[serde(default)]
    pub middle_out: bool,
    /// `HTTP-Referer` attribution header
    #[serde(default)]
    pub referer: Option<String>,
    /// `X-Title` attribution header
    #[serde(default)]
    pub title: Option<String>,
}

const fn default_require_api_key() -> bool {
    true
}
