use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as TokioMutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kestrel_core::{CacheExt, CacheTag, KestrelError, Message, Result};
use kestrel_plugin::{
    ActionSpec, Capabilities, Capability, InputSchema, JsonType, Plugin, PluginAction,
    PluginContext, PluginMetadata, PromptAction, executor_fn,
};

use crate::dedup::{DedupLog, max_id};
use crate::source::{Mention, MentionSource};

pub const PLUGIN_NAME: &str = "mentions";

/// Runtime knobs for [`MentionsPlugin`].
#[derive(Debug, Clone)]
pub struct MentionsSettings {
    /// Account whose mentions are polled; namespaces the cache key.
    pub username: String,
    pub poll_interval: Duration,
    pub max_results: u32,
    pub dedup_capacity: usize,
}

impl MentionsSettings {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            poll_interval: Duration::from_secs(600),
            max_results: 20,
            dedup_capacity: 1000,
        }
    }

    pub fn cache_key(&self) -> String {
        format!("mentions/{}", self.username)
    }
}

/// What the poller keeps in the cache between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MentionsState {
    #[serde(default)]
    pub last_checked_id: Option<String>,
    #[serde(default)]
    pub last_poll: Option<DateTime<Utc>>,
    #[serde(default)]
    pub seen_ids: Vec<String>,
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollOutcome {
    pub fetched: usize,
    pub published: usize,
    /// Duplicates plus items without an id.
    pub skipped: usize,
    /// Cursor after the cycle.
    pub cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Shared between the plugin, its timer task, and its actions.
struct Poller {
    settings: MentionsSettings,
    source: Arc<dyn MentionSource>,
    ctx: RwLock<Option<PluginContext>>,
    seen: Mutex<DedupLog>,
    /// Highest id published by any cycle. Only ever moves forward.
    cursor: Mutex<Option<String>>,
    /// Serializes cache writes so a slower cycle cannot persist an older
    /// cursor after a faster one.
    persist: TokioMutex<()>,
}

impl Poller {
    async fn read_state(&self, ctx: &PluginContext) -> Result<MentionsState> {
        Ok(ctx
            .cache
            .get_as::<MentionsState>(&self.settings.cache_key())
            .await?
            .unwrap_or_default())
    }

    fn advance_cursor(&self, id: &str) {
        let mut cursor = self.cursor.lock();
        *cursor = Some(max_id(cursor.take(), id));
    }

    async fn poll_once(&self) -> PollOutcome {
        let Some(ctx) = self.ctx.read().clone() else {
            warn!(plugin = PLUGIN_NAME, "poll requested before initialize");
            return PollOutcome {
                error: Some("plugin not initialized".into()),
                ..Default::default()
            };
        };

        let state = match self.read_state(&ctx).await {
            Ok(state) => state,
            Err(e) => {
                warn!(plugin = PLUGIN_NAME, error = %e, "failed to read cursor, skipping cycle");
                return PollOutcome {
                    error: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };
        let since = {
            let mut cursor = self.cursor.lock();
            if let Some(stored) = state.last_checked_id {
                *cursor = Some(max_id(cursor.take(), &stored));
            }
            cursor.clone()
        };

        let mentions = match self
            .source
            .fetch(since.as_deref(), self.settings.max_results)
            .await
        {
            Ok(mentions) => mentions,
            Err(e) => {
                warn!(
                    plugin = PLUGIN_NAME,
                    source = self.source.name(),
                    error = %e,
                    "mention fetch failed"
                );
                return PollOutcome {
                    cursor: since,
                    error: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };

        let mut outcome = PollOutcome {
            fetched: mentions.len(),
            ..Default::default()
        };
        for mention in mentions {
            let Some(id) = mention.id.clone() else {
                outcome.skipped += 1;
                continue;
            };
            // Check-and-insert under one lock: overlapping cycles cannot
            // both claim the same id.
            if !self.seen.lock().insert(&id) {
                outcome.skipped += 1;
                continue;
            }
            self.advance_cursor(&id);
            ctx.publish(to_message(&id, mention)).await;
            outcome.published += 1;
        }

        if outcome.published > 0 {
            let _writer = self.persist.lock().await;
            let cursor = self.cursor.lock().clone();
            let snapshot = self.seen.lock().snapshot();
            let patch = json!({
                "last_checked_id": cursor,
                "last_poll": Utc::now(),
                "seen_ids": snapshot,
            });
            if let Err(e) = ctx.cache.update(&self.settings.cache_key(), patch).await {
                warn!(plugin = PLUGIN_NAME, error = %e, "failed to persist mention cursor");
            }
        }
        outcome.cursor = self.cursor.lock().clone();

        info!(
            plugin = PLUGIN_NAME,
            fetched = outcome.fetched,
            published = outcome.published,
            cursor = ?outcome.cursor,
            "poll cycle complete"
        );
        outcome
    }
}

fn to_message(id: &str, mention: Mention) -> Message {
    let mut message = Message::with_id(id, PLUGIN_NAME, mention.text);
    if let Some(author) = mention.author_username {
        message = message.with_meta("author", author);
    }
    if let Some(author_id) = mention.author_id {
        message = message.with_meta("author_id", author_id);
    }
    if let Some(conversation) = mention.conversation_id {
        message = message.with_meta("conversation_id", conversation);
    }
    if let Some(created_at) = mention.created_at {
        message = message.with_meta("created_at", created_at);
    }
    message
}

/// Polls a [`MentionSource`], publishes unseen mentions on the bus, and
/// keeps a cursor plus dedup snapshot in the cache.
///
/// Each timer tick spawns an independent cycle; cycles may overlap and stay
/// correct because the dedup log makes publishing idempotent.
pub struct MentionsPlugin {
    meta: PluginMetadata,
    poller: Arc<Poller>,
    timer: Mutex<Option<CancellationToken>>,
}

impl MentionsPlugin {
    pub fn new(settings: MentionsSettings, source: Arc<dyn MentionSource>) -> Self {
        let seen = Mutex::new(DedupLog::new(settings.dedup_capacity));
        let poller = Arc::new(Poller {
            settings,
            source,
            ctx: RwLock::new(None),
            seen,
            cursor: Mutex::new(None),
            persist: TokioMutex::new(()),
        });
        let meta = PluginMetadata::new(
            PLUGIN_NAME,
            "Polls for new mentions and publishes them as messages",
            env!("CARGO_PKG_VERSION"),
        )
        .with_actions(&build_actions(&poller));
        Self {
            meta,
            poller,
            timer: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &MentionsSettings {
        &self.poller.settings
    }

    /// Run one poll cycle now.
    pub async fn poll_once(&self) -> PollOutcome {
        self.poller.poll_once().await
    }

    pub fn seen_count(&self) -> usize {
        self.poller.seen.lock().len()
    }

    pub fn is_polling(&self) -> bool {
        self.timer.lock().is_some()
    }
}

fn build_actions(poller: &Arc<Poller>) -> Vec<PluginAction> {
    let handle = Arc::clone(poller);
    let check = PluginAction::api(
        ActionSpec::new(
            "check_mentions",
            "Poll for new mentions right now and publish any unseen ones",
        )
        .with_example(json!({}), json!({"fetched": 3, "published": 2, "skipped": 1})),
        executor_fn(move |_input, _ctx| {
            let poller = Arc::clone(&handle);
            async move {
                let outcome = poller.poll_once().await;
                match outcome.error {
                    Some(reason) => Err(KestrelError::ExternalFetch {
                        source_name: poller.source.name().to_string(),
                        reason,
                    }),
                    None => Ok(serde_json::to_value(&outcome)?),
                }
            }
        }),
    );

    let summarize = PluginAction::prompt(
        ActionSpec::new("summarize_mention", "Summarize a mention in one sentence").with_schema(
            InputSchema::object()
                .property("text", JsonType::String, "The mention text", true)
                .property("author", JsonType::String, "Who wrote it", false),
        ),
        PromptAction::new(
            "Summarize this mention in one sentence.\n\nAuthor: {{author}}\nText: {{text}}",
        )
        .with_system("You write short, neutral summaries of social media posts."),
    );

    vec![check, summarize]
}

#[async_trait]
impl Plugin for MentionsPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.meta
    }

    async fn initialize(&self, ctx: PluginContext) -> Result<()> {
        if self.poller.settings.username.trim().is_empty() {
            return Err(KestrelError::Plugin {
                plugin: PLUGIN_NAME.into(),
                reason: "mentions.username is not set".into(),
            });
        }

        match self.poller.read_state(&ctx).await {
            Ok(state) => {
                self.poller.seen.lock().restore(&state.seen_ids);
                if let Some(id) = &state.last_checked_id {
                    self.poller.advance_cursor(id);
                }
                info!(
                    plugin = PLUGIN_NAME,
                    cursor = ?state.last_checked_id,
                    restored = state.seen_ids.len(),
                    "restored mention state"
                );
            }
            Err(e) => {
                warn!(plugin = PLUGIN_NAME, error = %e, "could not restore mention state, starting fresh");
            }
        }

        // Tag the entry so cache listings can tell what it is.
        let key = self.poller.settings.cache_key();
        if let Ok(None) = ctx.cache.get(&key).await {
            let tag = CacheTag::new("mentions_cursor")
                .with_field("username", self.poller.settings.username.clone());
            if let Err(e) = ctx
                .cache
                .set(&key, serde_json::to_value(MentionsState::default())?, Some(tag))
                .await
            {
                warn!(plugin = PLUGIN_NAME, error = %e, "failed to seed mention state");
            }
        }

        *self.poller.ctx.write() = Some(ctx);
        Ok(())
    }

    fn actions(&self) -> Vec<PluginAction> {
        build_actions(&self.poller)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::PASSIVE.with(Capability::Lifecycle)
    }

    async fn start(&self) -> Result<()> {
        let token = CancellationToken::new();
        if let Some(previous) = self.timer.lock().replace(token.clone()) {
            previous.cancel();
        }

        let poller = Arc::clone(&self.poller);
        let period = poller.settings.poll_interval;
        info!(plugin = PLUGIN_NAME, interval_secs = period.as_secs(), "starting mention polling");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!(plugin = PLUGIN_NAME, "mention timer cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let poller = Arc::clone(&poller);
                        tokio::spawn(async move {
                            poller.poll_once().await;
                        });
                    }
                }
            }
        });
        Ok(())
    }

    /// Cancels the timer only; a cycle already in flight runs to completion.
    async fn stop(&self) -> Result<()> {
        if let Some(token) = self.timer.lock().take() {
            token.cancel();
            info!(plugin = PLUGIN_NAME, "stopped mention polling");
        }
        Ok(())
    }
}
