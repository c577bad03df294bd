#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use kestrel_cache::MemoryCache;
    use kestrel_core::{CacheService, KestrelError, Message, MessageBus, Result, handler_fn};
    use kestrel_llm::{MockProvider, ModelClient};
    use kestrel_mentions::*;
    use kestrel_plugin::{ActionDispatcher, Plugin, PluginContext};
    use parking_lot::Mutex;
    use tokio::sync::Notify;
    use serde_json::json;

    type Page = std::result::Result<Vec<Mention>, String>;

    /// Source that replays scripted pages and records each `since`. A page
    /// queued with a gate is held until the gate is notified.
    #[derive(Default)]
    struct ScriptedSource {
        pages: Mutex<VecDeque<(Option<Arc<Notify>>, Page)>>,
        sinces: Mutex<Vec<Option<String>>>,
        calls: AtomicUsize,
        /// Notified each time a fetch begins.
        entered: Notify,
    }

    fn mentions(ids: &[&str]) -> Vec<Mention> {
        ids.iter()
            .map(|id| Mention::new(*id, format!("mention {id}")))
            .collect()
    }

    impl ScriptedSource {
        fn page(self, ids: &[&str]) -> Self {
            self.pages.lock().push_back((None, Ok(mentions(ids))));
            self
        }

        fn gated_page(self, ids: &[&str], gate: Arc<Notify>) -> Self {
            self.pages.lock().push_back((Some(gate), Ok(mentions(ids))));
            self
        }

        fn failure(self, reason: &str) -> Self {
            self.pages.lock().push_back((None, Err(reason.to_string())));
            self
        }
    }

    #[async_trait]
    impl MentionSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn fetch(&self, since: Option<&str>, _limit: u32) -> Result<Vec<Mention>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sinces.lock().push(since.map(str::to_string));
            let next = self.pages.lock().pop_front();
            self.entered.notify_one();

            let Some((gate, page)) = next else {
                return Ok(Vec::new());
            };
            if let Some(gate) = gate {
                gate.notified().await;
            }
            page.map_err(|reason| KestrelError::ExternalFetch {
                source_name: "scripted".into(),
                reason,
            })
        }
    }

    struct Harness {
        plugin: MentionsPlugin,
        source: Arc<ScriptedSource>,
        cache: Arc<dyn CacheService>,
        ctx: PluginContext,
        published: Arc<Mutex<Vec<String>>>,
    }

    fn harness_with(source: ScriptedSource, settings: MentionsSettings) -> Harness {
        harness_on(source, settings, Arc::new(MemoryCache::new()))
    }

    fn harness_on(
        source: ScriptedSource,
        settings: MentionsSettings,
        cache: Arc<dyn CacheService>,
    ) -> Harness {
        let source = Arc::new(source);
        let bus = MessageBus::new();
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = published.clone();
        bus.subscribe(handler_fn("sink", move |msg: Arc<Message>| {
            let sink = sink.clone();
            async move {
                sink.lock().push(msg.id.clone());
                Ok(())
            }
        }));
        let ctx = PluginContext::new(
            bus,
            Arc::clone(&cache),
            ModelClient::new(Arc::new(MockProvider::new("mock")), "mock-model"),
        );
        let plugin = MentionsPlugin::new(settings, source.clone());
        Harness {
            plugin,
            source,
            cache,
            ctx,
            published,
        }
    }

    fn settings() -> MentionsSettings {
        MentionsSettings::new("kestrel")
    }

    async fn stored_state(h: &Harness) -> serde_json::Value {
        h.cache
            .get(&h.plugin.settings().cache_key())
            .await
            .unwrap()
            .unwrap()
    }

    // ── Poll cycle ─────────────────────────────────────────────

    #[tokio::test]
    async fn test_duplicate_in_page_published_once() {
        let h = harness_with(ScriptedSource::default().page(&["5", "3", "5"]), settings());
        h.plugin.initialize(h.ctx.clone()).await.unwrap();

        let outcome = h.plugin.poll_once().await;
        assert_eq!(outcome.published, 2);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(*h.published.lock(), vec!["5", "3"]);

        let state = stored_state(&h).await;
        assert_eq!(state["last_checked_id"], "5");
        assert_eq!(state["seen_ids"], json!(["5", "3"]));
        // First fetch had no lower bound.
        assert_eq!(h.source.sinces.lock()[0], None);
    }

    #[tokio::test]
    async fn test_successive_cycles_never_republish() {
        let source = ScriptedSource::default()
            .page(&["3", "2", "1"])
            .page(&["4", "3", "2"])
            .page(&["4"]);
        let h = harness_with(source, settings());
        h.plugin.initialize(h.ctx.clone()).await.unwrap();

        for _ in 0..3 {
            h.plugin.poll_once().await;
        }
        assert_eq!(*h.published.lock(), vec!["3", "2", "1", "4"]);
        let sinces = h.source.sinces.lock().clone();
        assert_eq!(sinces, vec![None, Some("3".into()), Some("4".into())]);
    }

    #[tokio::test]
    async fn test_concurrent_cycles_keep_cursor_and_dedup() {
        let gate = Arc::new(Notify::new());
        let source = ScriptedSource::default()
            .gated_page(&["10", "9"], gate.clone())
            .page(&["12", "10"]);
        let h = harness_with(source, settings());
        h.plugin.initialize(h.ctx.clone()).await.unwrap();

        // The slow cycle fetches first and is held; the fast cycle runs to
        // completion before the slow one is released.
        let slow = h.plugin.poll_once();
        let fast = async {
            h.source.entered.notified().await;
            let outcome = h.plugin.poll_once().await;
            assert_eq!(stored_state(&h).await["last_checked_id"], "12");
            gate.notify_one();
            outcome
        };
        let (slow, fast) = tokio::join!(slow, fast);

        assert_eq!(fast.published, 2);
        assert_eq!(slow.published, 1);
        assert_eq!(slow.skipped, 1);
        assert_eq!(*h.published.lock(), vec!["12", "10", "9"]);

        // The slower cycle saw a lower id last but must not pull the cursor back.
        assert_eq!(slow.cursor.as_deref(), Some("12"));
        let state = stored_state(&h).await;
        assert_eq!(state["last_checked_id"], "12");
        assert_eq!(state["seen_ids"], json!(["12", "10", "9"]));
    }

    #[tokio::test]
    async fn test_dedup_log_stays_bounded() {
        let mut settings = settings();
        settings.dedup_capacity = 3;
        let ids: Vec<String> = (1..=10).map(|i| i.to_string()).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let h = harness_with(ScriptedSource::default().page(&refs), settings);
        h.plugin.initialize(h.ctx.clone()).await.unwrap();

        let outcome = h.plugin.poll_once().await;
        assert_eq!(outcome.published, 10);
        assert_eq!(h.plugin.seen_count(), 3);
        assert_eq!(stored_state(&h).await["seen_ids"], json!(["8", "9", "10"]));
        assert_eq!(outcome.cursor.as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn test_cursor_never_regresses() {
        let source = ScriptedSource::default().page(&["10"]).page(&["7"]);
        let h = harness_with(source, settings());
        h.plugin.initialize(h.ctx.clone()).await.unwrap();

        h.plugin.poll_once().await;
        let outcome = h.plugin.poll_once().await;
        // "7" is new so it is published, but the cursor stays at "10".
        assert_eq!(outcome.published, 1);
        assert_eq!(outcome.cursor.as_deref(), Some("10"));
        assert_eq!(stored_state(&h).await["last_checked_id"], "10");
    }

    #[tokio::test]
    async fn test_fetch_failure_yields_nothing_and_keeps_state() {
        let source = ScriptedSource::default().page(&["1"]).failure("HTTP 503");
        let h = harness_with(source, settings());
        h.plugin.initialize(h.ctx.clone()).await.unwrap();

        h.plugin.poll_once().await;
        let before = stored_state(&h).await;

        let outcome = h.plugin.poll_once().await;
        assert_eq!(outcome.published, 0);
        assert!(outcome.error.unwrap().contains("HTTP 503"));
        assert_eq!(outcome.cursor.as_deref(), Some("1"));
        assert_eq!(stored_state(&h).await, before);
    }

    #[tokio::test]
    async fn test_items_without_id_are_skipped() {
        let source = ScriptedSource::default();
        source.pages.lock().push_back((None, Ok(vec![
            Mention {
                id: None,
                text: "orphan".into(),
                ..Default::default()
            },
            Mention::new("2", "ok").with_author("bob"),
        ])));
        let h = harness_with(source, settings());
        h.plugin.initialize(h.ctx.clone()).await.unwrap();

        let outcome = h.plugin.poll_once().await;
        assert_eq!(outcome.fetched, 2);
        assert_eq!(outcome.published, 1);
        assert_eq!(outcome.skipped, 1);
    }

    #[tokio::test]
    async fn test_empty_cycle_leaves_cache_alone() {
        let h = harness_with(ScriptedSource::default(), settings());
        h.plugin.initialize(h.ctx.clone()).await.unwrap();
        let before = stored_state(&h).await;
        let outcome = h.plugin.poll_once().await;
        assert_eq!(outcome.published, 0);
        assert_eq!(stored_state(&h).await, before);
    }

    // ── Persistence ────────────────────────────────────────────

    #[tokio::test]
    async fn test_initialize_restores_cursor_and_dedup() {
        let cache: Arc<dyn CacheService> = Arc::new(MemoryCache::new());
        cache
            .set(
                &settings().cache_key(),
                json!({"last_checked_id": "5", "seen_ids": ["4", "5"], "note": "keep me"}),
                None,
            )
            .await
            .unwrap();

        let h = harness_on(ScriptedSource::default().page(&["5", "6"]), settings(), cache);
        h.plugin.initialize(h.ctx.clone()).await.unwrap();
        assert_eq!(h.plugin.seen_count(), 2);

        h.plugin.poll_once().await;
        assert_eq!(*h.published.lock(), vec!["6"]);
        assert_eq!(h.source.sinces.lock()[0].as_deref(), Some("5"));

        let state = stored_state(&h).await;
        assert_eq!(state["last_checked_id"], "6");
        // Merge keeps fields written by others.
        assert_eq!(state["note"], "keep me");
    }

    #[tokio::test]
    async fn test_initialize_tags_cache_entry() {
        let h = harness_with(ScriptedSource::default(), settings());
        h.plugin.initialize(h.ctx.clone()).await.unwrap();
        let entries = h.cache.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        let tag = entries[0].tag.as_ref().unwrap();
        assert_eq!(tag.kind, "mentions_cursor");
    }

    #[tokio::test]
    async fn test_initialize_requires_username() {
        let h = harness_with(ScriptedSource::default(), MentionsSettings::new("  "));
        assert!(h.plugin.initialize(h.ctx.clone()).await.is_err());
    }

    // ── Timer ──────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_timer_polls_until_stopped() {
        let mut settings = settings();
        settings.poll_interval = Duration::from_secs(60);
        let h = harness_with(ScriptedSource::default(), settings);
        h.plugin.initialize(h.ctx.clone()).await.unwrap();

        h.plugin.start().await.unwrap();
        assert!(h.plugin.is_polling());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 2);

        h.plugin.stop().await.unwrap();
        h.plugin.stop().await.unwrap();
        assert!(!h.plugin.is_polling());
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_in_flight_cycle_finish() {
        let gate = Arc::new(Notify::new());
        let mut settings = settings();
        settings.poll_interval = Duration::from_secs(60);
        let h = harness_with(
            ScriptedSource::default().gated_page(&["1"], gate.clone()),
            settings,
        );
        h.plugin.initialize(h.ctx.clone()).await.unwrap();

        h.plugin.start().await.unwrap();
        h.source.entered.notified().await;
        h.plugin.stop().await.unwrap();
        assert!(!h.plugin.is_polling());

        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(*h.published.lock(), vec!["1"]);
        assert_eq!(stored_state(&h).await["last_checked_id"], "1");
        // No further ticks after stop.
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 1);
    }

    // ── Actions ────────────────────────────────────────────────

    #[tokio::test]
    async fn test_check_mentions_action() {
        let h = harness_with(
            ScriptedSource::default().page(&["11", "12"]).failure("timeout"),
            settings(),
        );
        h.plugin.initialize(h.ctx.clone()).await.unwrap();
        let dispatcher = ActionDispatcher::new(h.ctx.clone());
        dispatcher.register(PLUGIN_NAME, h.plugin.actions());

        let out = dispatcher
            .execute(Some(PLUGIN_NAME), "check_mentions", json!({}))
            .await
            .unwrap();
        assert_eq!(out["published"], 2);
        assert_eq!(out["cursor"], "12");

        let err = dispatcher
            .execute(Some(PLUGIN_NAME), "check_mentions", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, KestrelError::ActionExecution { .. }));
    }

    #[tokio::test]
    async fn test_summarize_without_author_leaves_no_placeholder() {
        let provider = MockProvider::new("mock").with_response("A friendly greeting.");
        let requests = provider.recorded_requests();
        let h = harness_with(ScriptedSource::default(), settings());
        let ctx = PluginContext::new(
            MessageBus::new(),
            h.cache.clone(),
            ModelClient::new(Arc::new(provider), "mock-model"),
        );
        let dispatcher = ActionDispatcher::new(ctx);
        dispatcher.register(PLUGIN_NAME, h.plugin.actions());

        let out = dispatcher
            .execute(Some(PLUGIN_NAME), "summarize_mention", json!({"text": "gm @kestrel"}))
            .await
            .unwrap();
        assert_eq!(out, json!("A friendly greeting."));

        let prompt = requests.lock()[0].messages[0].content.clone();
        assert!(prompt.contains("gm @kestrel"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_metadata_lists_actions() {
        let plugin = MentionsPlugin::new(settings(), Arc::new(ScriptedSource::default()));
        let meta = plugin.metadata();
        assert_eq!(meta.name, PLUGIN_NAME);
        assert!(meta.actions.contains_key("check_mentions"));
        assert!(meta.actions.contains_key("summarize_mention"));
    }
}
