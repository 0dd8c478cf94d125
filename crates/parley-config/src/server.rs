use std::net::SocketAddr;

use serde::Deserialize;

use crate::health::HealthConfig;

/// HTTP listener and inbound header names
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub listen_address: Option<SocketAddr>,
    #[serde(default)]
    pub health: HealthConfig,
    /// Header the auth layer uses to pass the user id
    #[serde(default)]
    pub user_header: Option<String>,
    /// Header carrying the percent-encoded latest user utterance
    #[serde(default)]
    pub hint_header: Option<String>,
}

impl ServerConfig {
    pub const DEFAULT_USER_HEADER: &'static str = "x-parley-user";
    pub const DEFAULT_HINT_HEADER: &'static str = "x-parley-latest-user";

    /// Effective user header name
    pub fn user_header(&self) -> &str {
        self.user_header.as_deref().unwrap_or(Self::DEFAULT_USER_HEADER)
    }

    /// Effective hint header name
    pub fn hint_header(&self) -> &str {
        self.hint_header.as_deref().unwrap_or(Self::DEFAULT_HINT_HEADER)
    }
}
