#![allow(clippy::must_use_candidate)]

pub mod chat;
mod env;
pub mod health;
mod loader;
pub mod logging;
pub mod providers;
pub mod server;
pub mod store;
pub mod upstream;

use serde::Deserialize;

pub use chat::*;
pub use health::*;
pub use logging::*;
pub use providers::*;
pub use server::*;
pub use store::*;
pub use upstream::*;

/// Top-level parley configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Prompt enrichment switches
    #[serde(default)]
    pub chat: ChatConfig,
    /// Upstream call limits and retry policy
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Process-wide provider defaults
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Data store location
    #[serde(default)]
    pub store: StoreConfig,
}
