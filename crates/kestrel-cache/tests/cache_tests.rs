#[cfg(test)]
mod tests {
    use kestrel_cache::{MemoryCache, SqliteCache};
    use kestrel_core::{CacheExt, CacheService, CacheTag};
    use serde_json::json;
    use std::sync::Arc;

    fn backends() -> Vec<Arc<dyn CacheService>> {
        vec![
            Arc::new(MemoryCache::new()),
            Arc::new(SqliteCache::open_in_memory().unwrap()),
        ]
    }

    // ── Contract tests (run against every backend) ─────────────

    #[tokio::test]
    async fn test_get_absent_is_none() {
        for cache in backends() {
            assert_eq!(cache.get("nope").await.unwrap(), None, "{}", cache.backend());
        }
    }

    #[tokio::test]
    async fn test_set_then_get() {
        for cache in backends() {
            cache.set("k", json!({"a": 1}), None).await.unwrap();
            assert_eq!(cache.get("k").await.unwrap(), Some(json!({"a": 1})));
            cache.set("k", json!("replaced"), None).await.unwrap();
            assert_eq!(cache.get("k").await.unwrap(), Some(json!("replaced")));
        }
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        for cache in backends() {
            cache.update("k", json!({"a": 1})).await.unwrap();
            cache.update("k", json!({"b": 2})).await.unwrap();
            assert_eq!(
                cache.get("k").await.unwrap(),
                Some(json!({"a": 1, "b": 2})),
                "{}",
                cache.backend()
            );
        }
    }

    #[tokio::test]
    async fn test_update_overwrites_existing_field_only() {
        for cache in backends() {
            cache.set("k", json!({"cursor": "10", "keep": true}), None).await.unwrap();
            cache.update("k", json!({"cursor": "12"})).await.unwrap();
            assert_eq!(
                cache.get("k").await.unwrap(),
                Some(json!({"cursor": "12", "keep": true}))
            );
        }
    }

    #[tokio::test]
    async fn test_update_absent_behaves_as_set() {
        for cache in backends() {
            cache.update("fresh", json!({"x": 1})).await.unwrap();
            assert_eq!(cache.get("fresh").await.unwrap(), Some(json!({"x": 1})));
        }
    }

    #[tokio::test]
    async fn test_delete() {
        for cache in backends() {
            cache.set("k", json!(1), None).await.unwrap();
            assert!(cache.delete("k").await.unwrap());
            assert!(!cache.delete("k").await.unwrap());
            assert_eq!(cache.get("k").await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_tags_are_introspection_only() {
        for cache in backends() {
            let tag = CacheTag::new("cursor").with_field("plugin", "mentions");
            cache.set("b", json!(2), Some(tag.clone())).await.unwrap();
            cache.set("a", json!(1), None).await.unwrap();

            // Lookup ignores the tag entirely.
            assert_eq!(cache.get("b").await.unwrap(), Some(json!(2)));

            // A later merge keeps the tag attached.
            cache.update("b", json!({"n": 1})).await.unwrap();

            let entries = cache.entries().await.unwrap();
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0].key, "a");
            assert!(entries[0].tag.is_none());
            assert_eq!(entries[1].tag.as_ref(), Some(&tag));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_lose_nothing() {
        for cache in backends() {
            let mut handles = Vec::new();
            for i in 0..40 {
                let cache = Arc::clone(&cache);
                let mut field = serde_json::Map::new();
                field.insert(format!("f{i}"), json!(i));
                handles.push(tokio::spawn(async move {
                    cache.update("shared", serde_json::Value::Object(field)).await
                }));
            }
            for h in handles {
                h.await.unwrap().unwrap();
            }
            let value = cache.get("shared").await.unwrap().unwrap();
            assert_eq!(value.as_object().unwrap().len(), 40, "{}", cache.backend());
        }
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Cursor {
            last_id: String,
        }

        for cache in backends() {
            let cursor = Cursor {
                last_id: "42".into(),
            };
            cache.set_as("c", &cursor, None).await.unwrap();
            let back: Option<Cursor> = cache.get_as("c").await.unwrap();
            assert_eq!(back, Some(cursor));

            cache.set("bad", json!([1, 2]), None).await.unwrap();
            assert!(cache.get_as::<Cursor>("bad").await.is_err());
        }
    }

    // ── SQLite persistence ─────────────────────────────────────

    #[tokio::test]
    async fn test_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let cache = SqliteCache::open(&path).unwrap();
            cache
                .set("cursor", json!({"last": "99"}), Some(CacheTag::new("cursor")))
                .await
                .unwrap();
        }
        let cache = SqliteCache::open(&path).unwrap();
        assert_eq!(cache.get("cursor").await.unwrap(), Some(json!({"last": "99"})));
        let entries = cache.entries().await.unwrap();
        assert_eq!(entries[0].tag.as_ref().unwrap().kind, "cursor");
    }

    #[tokio::test]
    async fn test_memory_cache_len() {
        let cache = MemoryCache::new();
        assert!(cache.is_empty());
        cache.set("a", json!(1), None).await.unwrap();
        cache.update("b", json!({})).await.unwrap();
        assert_eq!(cache.len(), 2);
    }
}
