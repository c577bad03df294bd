//! Key/value store contract used by plugins for small pieces of durable-ish
//! state (cursors, dedup snapshots, last-seen ids).
//!
//! Values are JSON. Each entry may carry a [`CacheTag`] that exists purely for
//! introspection; tags never take part in lookups.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{KestrelError, Result};

/// Descriptive label attached to an entry at `set` time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheTag {
    /// Short type label, e.g. `"twitter_cursor"`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub fields: serde_json::Map<String, Value>,
}

impl CacheTag {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Default::default(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Summary of one stored entry, for debugging tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntryInfo {
    pub key: String,
    pub tag: Option<CacheTag>,
    pub updated_at: DateTime<Utc>,
}

/// The cache contract.
///
/// `update` must be atomic with respect to other operations on the same key:
/// two concurrent merges never lose each other's fields.
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Backend name for logs ("memory", "sqlite").
    fn backend(&self) -> &str;

    /// `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value, tag: Option<CacheTag>) -> Result<()>;

    /// Shallow-merge `partial` into the stored value; behaves as `set`
    /// (without a tag) when the key is absent.
    async fn update(&self, key: &str, partial: Value) -> Result<()>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// All entries with their tags, ordered by key.
    async fn entries(&self) -> Result<Vec<CacheEntryInfo>>;
}

/// Merge `partial` into `base`: when both are objects, top-level keys of
/// `partial` overwrite or extend `base`; otherwise `partial` replaces `base`.
pub fn merge_shallow(base: Value, partial: Value) -> Value {
    match (base, partial) {
        (Value::Object(mut base), Value::Object(partial)) => {
            for (k, v) in partial {
                base.insert(k, v);
            }
            Value::Object(base)
        }
        (_, partial) => partial,
    }
}

/// Typed convenience methods over any [`CacheService`].
#[async_trait]
pub trait CacheExt: CacheService {
    async fn get_as<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                KestrelError::Cache(format!("entry {key} has unexpected shape: {e}"))
            }),
            None => Ok(None),
        }
    }

    async fn set_as<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        tag: Option<CacheTag>,
    ) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value, tag).await
    }
}

impl<C: CacheService + ?Sized> CacheExt for C {}
