use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{CharacterCard, CharacterStore, SecretStore, StoreError, WorldEntry, WorldInfoStore};

/// In-memory store, filled before the server starts
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    secrets: BTreeMap<(String, String), String>,
    characters: BTreeMap<(String, String), CharacterCard>,
    worlds: BTreeMap<String, Vec<WorldEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_secret(mut self, user: &str, key: &str, value: &str) -> Self {
        self.secrets
            .insert((user.to_owned(), key.to_owned()), value.to_owned());
        self
    }

    #[must_use]
    pub fn with_character(mut self, user: &str, card: CharacterCard) -> Self {
        self.characters
            .insert((user.to_owned(), card.name.to_lowercase()), card);
        self
    }

    #[must_use]
    pub fn with_world_entry(mut self, user: &str, entry: WorldEntry) -> Self {
        self.worlds.entry(user.to_owned()).or_default().push(entry);
        self
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn find(&self, user: &str, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .secrets
            .get(&(user.to_owned(), key.to_owned()))
            .filter(|value| !value.trim().is_empty())
            .cloned())
    }
}

#[async_trait]
impl CharacterStore for MemoryStore {
    async fn find_by_name(&self, user: &str, name: &str) -> Result<Option<CharacterCard>, StoreError> {
        Ok(self
            .characters
            .get(&(user.to_owned(), name.trim().to_lowercase()))
            .cloned())
    }
}

#[async_trait]
impl WorldInfoStore for MemoryStore {
    async fn entries(&self, user: &str) -> Result<Vec<WorldEntry>, StoreError> {
        Ok(self.worlds.get(user).cloned().unwrap_or_default())
    }
}
