//! JSON key-value store
//!
//! Implements [`IKeyValueStore`] over an ordered in-memory map, optionally
//! persisted to a JSON file after every mutation. The file is written to a
//! sibling temp file first and renamed into place, so a crash mid-write
//! leaves the previous contents intact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use spbsync_core::ports::IKeyValueStore;

use crate::CacheError;

/// A typed value held by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KvValue {
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<String>),
}

/// Key-value store held in memory, optionally mirrored to a JSON file
pub struct JsonKvStore {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, KvValue>>,
}

impl JsonKvStore {
    /// Creates an empty store that is never persisted
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Opens the store at `path`, starting empty if the file does not exist
    pub async fn open(path: &Path) -> Result<Self, CacheError> {
        let entries = match tokio::fs::read_to_string(path).await {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                CacheError::SerializationError(format!(
                    "Failed to parse key-value store {}: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(CacheError::Io(e)),
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened key-value store");

        Ok(Self {
            path: Some(path.to_path_buf()),
            entries: Mutex::new(entries),
        })
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn get(&self, key: &str) -> Option<KvValue> {
        self.entries.lock().await.get(key).cloned()
    }

    async fn mutate<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, KvValue>) -> R,
    ) -> Result<R, CacheError> {
        let mut entries = self.entries.lock().await;
        let result = f(&mut entries);
        if let Some(path) = &self.path {
            persist(path, &entries).await?;
        }
        Ok(result)
    }

    async fn insert(&self, key: &str, value: KvValue) -> anyhow::Result<()> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value);
        })
        .await?;
        Ok(())
    }
}

async fn persist(path: &Path, entries: &BTreeMap<String, KvValue>) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(entries)
        .map_err(|e| CacheError::SerializationError(e.to_string()))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait::async_trait]
impl IKeyValueStore for JsonKvStore {
    async fn get_string(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(match self.get(key).await {
            Some(KvValue::Text(s)) => Some(s),
            _ => None,
        })
    }

    async fn set_string(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.insert(key, KvValue::Text(value.to_string())).await
    }

    async fn get_bool(&self, key: &str) -> anyhow::Result<Option<bool>> {
        Ok(match self.get(key).await {
            Some(KvValue::Bool(b)) => Some(b),
            _ => None,
        })
    }

    async fn set_bool(&self, key: &str, value: bool) -> anyhow::Result<()> {
        self.insert(key, KvValue::Bool(value)).await
    }

    async fn get_int(&self, key: &str) -> anyhow::Result<Option<i64>> {
        Ok(match self.get(key).await {
            Some(KvValue::Int(i)) => Some(i),
            _ => None,
        })
    }

    async fn set_int(&self, key: &str, value: i64) -> anyhow::Result<()> {
        self.insert(key, KvValue::Int(value)).await
    }

    async fn get_string_list(&self, key: &str) -> anyhow::Result<Option<Vec<String>>> {
        Ok(match self.get(key).await {
            Some(KvValue::List(list)) => Some(list),
            _ => None,
        })
    }

    async fn set_string_list(&self, key: &str, value: &[String]) -> anyhow::Result<()> {
        self.insert(key, KvValue::List(value.to_vec())).await
    }

    async fn remove(&self, key: &str) -> anyhow::Result<bool> {
        let removed = self
            .mutate(|entries| entries.remove(key).is_some())
            .await?;
        Ok(removed)
    }

    async fn keys(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.entries.lock().await.keys().cloned().collect())
    }
}
