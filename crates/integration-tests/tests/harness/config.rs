//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use parley_config::{ChatConfig, Config, HealthConfig, ServerConfig, UpstreamConfig};
use secrecy::SecretString;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with minimal defaults and a fast retry policy
    pub fn new() -> Self {
        Self {
            config: Config {
                server: ServerConfig {
                    listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                    health: HealthConfig {
                        enabled: true,
                        ..HealthConfig::default()
                    },
                    ..ServerConfig::default()
                },
                upstream: UpstreamConfig {
                    retry_base_delay: Duration::from_millis(5),
                    timeout: Duration::from_secs(5),
                    ..UpstreamConfig::default()
                },
                ..Config::default()
            },
        }
    }

    /// Point the `openai` source at a mock backend
    pub fn with_openai(mut self, base_url: &str) -> Self {
        let provider = &mut self.config.providers.openai;
        provider.api_key = Some(SecretString::from("test-key"));
        provider.base_url = Some(base_url.parse().expect("valid URL"));
        self
    }

    /// Point the `openai` source at a mock backend without a default key
    pub fn with_openai_endpoint(mut self, base_url: &str) -> Self {
        self.config.providers.openai.base_url = Some(base_url.parse().expect("valid URL"));
        self
    }

    /// Point the `custom` source at a keyless mock backend
    pub fn with_custom(mut self, base_url: &str) -> Self {
        let provider = &mut self.config.providers.custom;
        provider.base_url = Some(base_url.parse().expect("valid URL"));
        provider.require_api_key = false;
        self
    }

    /// Point the `makersuite` source at a mock backend
    pub fn with_gemini(mut self, base_url: &str) -> Self {
        let provider = &mut self.config.providers.gemini;
        provider.api_key = Some(SecretString::from("test-key"));
        provider.base_url = Some(base_url.parse().expect("valid URL"));
        self
    }

    /// Point the `openrouter` source at a mock backend
    pub fn with_openrouter(mut self, base_url: &str) -> Self {
        let provider = &mut self.config.providers.openrouter;
        provider.api_key = Some(SecretString::from("test-key"));
        provider.base_url = Some(base_url.parse().expect("valid URL"));
        provider.referer = Some("https://parley.test".to_owned());
        provider.title = Some("parley tests".to_owned());
        self
    }

    /// Adjust enrichment switches
    pub fn with_chat(mut self, update: impl FnOnce(&mut ChatConfig)) -> Self {
        update(&mut self.config.chat);
        self
    }

    /// Set the retry ceiling
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.config.upstream.max_retries = retries;
        self
    }

    /// Read stores from a data directory
    pub fn with_data_root(mut self, root: &Path) -> Self {
        self.config.store.data_root = root.to_path_buf();
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }
}
