use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;

use kestrel_core::{CacheEntryInfo, CacheService, CacheTag, Result, merge_shallow};

struct StoredEntry {
    value: Value,
    tag: Option<CacheTag>,
    updated_at: DateTime<Utc>,
}

/// In-process cache. All operations take one short-lived lock, which makes
/// `update` atomic with respect to concurrent `get`/`set`/`update`.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<BTreeMap<String, StoredEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl CacheService for MemoryCache {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: Value, tag: Option<CacheTag>) -> Result<()> {
        self.entries.lock().insert(
            key.to_string(),
            StoredEntry {
                value,
                tag,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn update(&self, key: &str, partial: Value) -> Result<()> {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) => {
                let base = std::mem::take(&mut entry.value);
                entry.value = merge_shallow(base, partial);
                entry.updated_at = Utc::now();
            }
            None => {
                entries.insert(
                    key.to_string(),
                    StoredEntry {
                        value: partial,
                        tag: None,
                        updated_at: Utc::now(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    async fn entries(&self) -> Result<Vec<CacheEntryInfo>> {
        Ok(self
            .entries
            .lock()
            .iter()
            .map(|(key, e)| CacheEntryInfo {
                key: key.clone(),
                tag: e.tag.clone(),
                updated_at: e.updated_at,
            })
            .collect())
    }
}
