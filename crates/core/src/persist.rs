//! Persistence of allow-listed state partitions
//!
//! The persisted document lives under `persist:<key>` and contains one entry
//! per allow-listed partition plus a `_persist` marker:
//!
//! ```json
//! { "auth": { "isAuth": true, ... }, "_persist": { "version": 1, "rehydrated": true } }
//! ```
//!
//! Partitions missing from the allow-list are never written and keep their
//! initial value after a reload.

use crate::error::{CoreError, CoreResult};
use crate::state::{Action, AuthState, RootState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const PERSIST_MARKER: &str = "_persist";

/// Durable key/value storage for serialized state
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_item(&self, key: &str) -> CoreResult<Option<String>>;
    async fn set_item(&self, key: &str, value: &str) -> CoreResult<()>;
    async fn remove_item(&self, key: &str) -> CoreResult<()>;
}

/// In-process storage, shared between clones
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    items: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_item(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> CoreResult<()> {
        self.items
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> CoreResult<()> {
        self.items.write().await.remove(key);
        Ok(())
    }
}

/// Storage writing one JSON file per key into a directory
#[derive(Clone, Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Platform data directory for Latch state
    pub fn default_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("latch")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get_item(&self, key: &str) -> CoreResult<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> CoreResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write then rename so a crash never leaves a torn document behind
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> CoreResult<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Which partitions are persisted and where
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Document name, stored as `persist:<key>`
    pub key: String,
    /// Top-level partitions written to storage
    pub allow_list: Vec<String>,
    /// Documents written under another version are discarded on load
    pub version: u32,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            key: "root".to_string(),
            allow_list: vec![AuthState::KEY.to_string()],
            version: 1,
        }
    }
}

impl PersistConfig {
    pub fn storage_key(&self) -> String {
        format!("persist:{}", self.key)
    }

    fn allows(&self, partition: &str) -> bool {
        self.allow_list.iter().any(|name| name == partition)
    }
}

/// Serializes and rehydrates the allow-listed subset of [`RootState`]
#[derive(Clone)]
pub struct Persistor {
    config: PersistConfig,
    storage: Arc<dyn Storage>,
}

impl Persistor {
    pub fn new(config: PersistConfig, storage: Arc<dyn Storage>) -> Self {
        for name in &config.allow_list {
            if !RootState::PARTITIONS.contains(&name.as_str()) {
                warn!(
                    partition = %name,
                    "Allow-listed partition does not exist and will be ignored"
                );
            }
        }
        Self { config, storage }
    }

    pub const fn config(&self) -> &PersistConfig {
        &self.config
    }

    /// Allow-listed partitions of `state`, keyed by partition name
    fn partitions(&self, state: &RootState) -> CoreResult<Map<String, Value>> {
        let Value::Object(all) = serde_json::to_value(state)? else {
            return Err(CoreError::serialization_error("state is not an object"));
        };
        Ok(all
            .into_iter()
            .filter(|(name, _)| self.config.allows(name))
            .collect())
    }

    /// Whether any persisted partition differs between the two states
    pub fn has_changes(&self, before: &RootState, after: &RootState) -> CoreResult<bool> {
        Ok(self.partitions(before)? != self.partitions(after)?)
    }

    /// Write the allow-listed partitions of `state` to storage
    pub async fn persist(&self, state: &RootState) -> CoreResult<()> {
        let mut document = self.partitions(state)?;
        document.insert(
            PERSIST_MARKER.to_string(),
            json!({ "version": self.config.version, "rehydrated": true }),
        );

        let serialized = serde_json::to_string(&Value::Object(document))?;
        self.storage
            .set_item(&self.config.storage_key(), &serialized)
            .await?;
        debug!(key = %self.config.storage_key(), "Persisted state");
        Ok(())
    }

    /// Overlay the persisted partitions onto `initial`
    ///
    /// Returns `initial` unchanged when nothing is stored or the stored
    /// document was written under another version.
    pub async fn rehydrate(&self, initial: RootState) -> CoreResult<RootState> {
        let Some(stored) = self.storage.get_item(&self.config.storage_key()).await? else {
            debug!(key = %self.config.storage_key(), "No persisted state found");
            return Ok(initial);
        };

        let Value::Object(mut stored) = serde_json::from_str::<Value>(&stored)? else {
            return Err(CoreError::serialization_error("persisted state is not an object"));
        };

        let stored_version = stored
            .remove(PERSIST_MARKER)
            .and_then(|marker| marker.get("version").and_then(Value::as_u64));
        if stored_version != Some(u64::from(self.config.version)) {
            warn!(
                stored = ?stored_version,
                expected = self.config.version,
                "Discarding persisted state written under another version"
            );
            return Ok(initial);
        }

        let Value::Object(mut merged) = serde_json::to_value(&initial)? else {
            return Err(CoreError::serialization_error("state is not an object"));
        };
        for (name, value) in stored {
            if self.config.allows(&name) && merged.contains_key(&name) {
                merged.insert(name, value);
            }
        }

        let mut state: RootState = serde_json::from_value(Value::Object(merged))?;
        // Stored auth obeys the same rules as a dispatched SetIsAuth
        state.auth = state.auth.reduce(&Action::SetIsAuth {
            is_auth: state.auth.is_auth,
            access_token: state.auth.access_token.clone(),
            refresh_token: state.auth.refresh_token.clone(),
        });
        Ok(state)
    }

    /// Remove the persisted document
    pub async fn purge(&self) -> CoreResult<()> {
        self.storage.remove_item(&self.config.storage_key()).await
    }
}
