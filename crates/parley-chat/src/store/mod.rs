//! Read-only collaborators owned by the surrounding application
//!
//! Credentials, character cards and world-info entries live outside this
//! crate. The pipeline only ever reads them, once per request, through the
//! traits below.

mod file;
mod memory;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors raised while reading a store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid store key '{0}'")]
    InvalidKey(String),
}

/// Character persona fields used to brief the model
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CharacterCard {
    pub name: String,
    pub description: String,
    pub personality: String,
    pub scenario: String,
    #[serde(alias = "first_message")]
    pub first_mes: String,
}

impl CharacterCard {
    /// Whether any descriptive field carries text
    pub fn has_brief(&self) -> bool {
        [&self.description, &self.personality, &self.scenario, &self.first_mes]
            .iter()
            .any(|field| !field.trim().is_empty())
    }
}

/// One lore entry from a world-info book
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldEntry {
    /// Short label, usually the entry comment or its first key
    pub title: String,
    pub content: String,
}

/// Per-user credential lookup
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Look up a credential for a user scope
    async fn find(&self, user: &str, key: &str) -> Result<Option<String>, StoreError>;
}

/// Per-user character lookup
#[async_trait]
pub trait CharacterStore: Send + Sync {
    /// Find a character card by display name
    async fn find_by_name(&self, user: &str, name: &str) -> Result<Option<CharacterCard>, StoreError>;
}

/// Per-user world-info lookup
#[async_trait]
pub trait WorldInfoStore: Send + Sync {
    /// Enabled entries in a stable order
    async fn entries(&self, user: &str) -> Result<Vec<WorldEntry>, StoreError>;
}
