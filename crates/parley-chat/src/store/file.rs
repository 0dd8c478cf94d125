use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{CharacterCard, CharacterStore, SecretStore, StoreError, WorldEntry, WorldInfoStore};

/// Store backed by the front-end's per-user data directory
///
/// ```text
/// <root>/<user>/secrets.json
/// <root>/<user>/characters/<name>.json
/// <root>/<user>/worlds/*.json
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn user_dir(&self, user: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(safe_segment(user)?))
    }
}

/// Reject anything that could escape the data root
fn safe_segment(segment: &str) -> Result<&str, StoreError> {
    let trimmed = segment.trim();

    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\', '\0'])
    {
        return Err(StoreError::InvalidKey(segment.to_owned()));
    }

    Ok(trimmed)
}

/// Read and parse a JSON file, treating a missing file as absent
async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

#[async_trait]
impl SecretStore for FileStore {
    async fn find(&self, user: &str, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.user_dir(user)?.join("secrets.json");
        let Some(secrets) = read_json::<BTreeMap<String, Value>>(&path).await? else {
            return Ok(None);
        };

        Ok(secrets
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned))
    }
}

/// Character files are either flat or V2 cards nested under `data`
#[derive(Deserialize)]
#[serde(untagged)]
enum CardFile {
    V2 { data: CharacterCard },
    Flat(CharacterCard),
}

#[async_trait]
impl CharacterStore for FileStore {
    async fn find_by_name(&self, user: &str, name: &str) -> Result<Option<CharacterCard>, StoreError> {
        let file_name = format!("{}.json", safe_segment(name)?);
        let path = self.user_dir(user)?.join("characters").join(file_name);

        let card = read_json::<CardFile>(&path).await?.map(|file| match file {
            CardFile::V2 { data } => data,
            CardFile::Flat(card) => card,
        });

        Ok(card.map(|mut card| {
            if card.name.trim().is_empty() {
                name.trim().clone_into(&mut card.name);
            }
            card
        }))
    }
}

#[derive(Deserialize)]
struct WorldFile {
    #[serde(default)]
    entries: BTreeMap<String, WorldFileEntry>,
}

#[derive(Deserialize)]
#[serde(default)]
struct WorldFileEntry {
    #[serde(alias = "keys")]
    key: Vec<String>,
    comment: String,
    content: String,
    disable: bool,
    order: i64,
    uid: i64,
}

impl Default for WorldFileEntry {
    fn default() -> Self {
        Self {
            key: Vec::new(),
            comment: String::new(),
            content: String::new(),
            disable: false,
            order: 100,
            uid: 0,
        }
    }
}

impl WorldFileEntry {
    fn into_entry(self) -> WorldEntry {
        let title = if self.comment.trim().is_empty() {
            self.key.into_iter().find(|k| !k.trim().is_empty()).unwrap_or_default()
        } else {
            self.comment
        };

        WorldEntry {
            title: title.trim().to_owned(),
            content: self.content,
        }
    }
}

#[async_trait]
impl WorldInfoStore for FileStore {
    async fn entries(&self, user: &str) -> Result<Vec<WorldEntry>, StoreError> {
        let dir = self.user_dir(user)?.join("worlds");

        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path: dir, source }),
        };

        let mut files = Vec::new();
        loop {
            match reader.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    if path.extension().is_some_and(|ext| ext == "json") {
                        files.push(path);
                    }
                }
                Ok(None) => break,
                Err(source) => return Err(StoreError::Io { path: dir, source }),
            }
        }
        files.sort();

        let mut entries = Vec::new();
        for path in files {
            let Some(book) = read_json::<WorldFile>(&path).await? else {
                continue;
            };

            let mut book_entries = book
                .entries
                .into_values()
                .filter(|entry| !entry.disable && !entry.content.trim().is_empty())
                .collect::<Vec<_>>();
            book_entries.sort_by_key(|entry| (entry.order, entry.uid));

            entries.extend(book_entries.into_iter().map(WorldFileEntry::into_entry));
        }

        Ok(entries)
    }
}
