//! Key-value store port (driven/secondary port)
//!
//! A string-keyed persisted map, the storage engine of the legacy
//! generation. Values are typed on access; reading a key with the wrong
//! type returns `None` rather than an error, matching how the on-device
//! store behaves.

/// Port trait for a durable string-keyed store
#[async_trait::async_trait]
pub trait IKeyValueStore: Send + Sync {
    async fn get_string(&self, key: &str) -> anyhow::Result<Option<String>>;

    async fn set_string(&self, key: &str, value: &str) -> anyhow::Result<()>;

    async fn get_bool(&self, key: &str) -> anyhow::Result<Option<bool>>;

    async fn set_bool(&self, key: &str, value: bool) -> anyhow::Result<()>;

    async fn get_int(&self, key: &str) -> anyhow::Result<Option<i64>>;

    async fn set_int(&self, key: &str, value: i64) -> anyhow::Result<()>;

    async fn get_string_list(&self, key: &str) -> anyhow::Result<Option<Vec<String>>>;

    async fn set_string_list(&self, key: &str, value: &[String]) -> anyhow::Result<()>;

    /// Removes a key; returns whether it was present
    async fn remove(&self, key: &str) -> anyhow::Result<bool>;

    /// Enumerates every key currently stored
    async fn keys(&self) -> anyhow::Result<Vec<String>>;

    /// Keys starting with `prefix`, sorted
    async fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .keys()
            .await?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }
}
