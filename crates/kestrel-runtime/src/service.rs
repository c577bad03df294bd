use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, error, info, warn};

use kestrel_core::{
    CacheService, Event, EventBus, KestrelError, Message, MessageBus, Result, SYSTEM_SOURCE,
    SubscriptionId,
};
use kestrel_llm::{ChatMessage, ModelClient, Usage};
use kestrel_plugin::{
    ActionDispatcher, Capability, Plugin, PluginContext, PluginMetadata, PluginState,
};

use crate::handler::PluginMessageHandler;
use crate::turn::{ActionRecord, ModelTurn};

const DEFAULT_MAX_ITERATIONS: usize = 5;

struct PluginSlot {
    name: String,
    plugin: Arc<dyn Plugin>,
    state: PluginState,
    subscription: Option<SubscriptionId>,
}

/// Introspection row for one registered plugin.
#[derive(Debug, Clone, Serialize)]
pub struct PluginStatus {
    pub name: String,
    pub version: String,
    pub description: String,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub actions: Vec<String>,
}

/// Registry and lifecycle driver for every plugin in the process.
///
/// Lifecycle operations (`register_plugin`, `start`, `stop`) are serialized
/// through one async mutex; the slot table itself sits behind a sync lock
/// that is never held across an `.await`.
pub struct AgentService {
    bus: MessageBus,
    cache: Arc<dyn CacheService>,
    model: ModelClient,
    events: EventBus,
    dispatcher: ActionDispatcher,
    slots: RwLock<Vec<PluginSlot>>,
    lifecycle: TokioMutex<()>,
    running: AtomicBool,
    created_at: Instant,
    started_at: RwLock<Option<DateTime<Utc>>>,
    system_prompt: Option<String>,
    max_iterations: usize,
}

impl AgentService {
    pub fn new(cache: Arc<dyn CacheService>, model: ModelClient) -> Self {
        Self::with_bus(MessageBus::new(), cache, model)
    }

    pub fn with_bus(bus: MessageBus, cache: Arc<dyn CacheService>, model: ModelClient) -> Self {
        let ctx = PluginContext::new(bus.clone(), Arc::clone(&cache), model.clone());
        Self {
            bus,
            cache,
            model,
            events: EventBus::default(),
            dispatcher: ActionDispatcher::new(ctx),
            slots: RwLock::new(Vec::new()),
            lifecycle: TokioMutex::new(()),
            running: AtomicBool::new(false),
            created_at: Instant::now(),
            started_at: RwLock::new(None),
            system_prompt: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Character system prompt sent with every model turn.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn cache(&self) -> &Arc<dyn CacheService> {
        &self.cache
    }

    pub fn model(&self) -> &ModelClient {
        &self.model
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    pub fn context(&self) -> PluginContext {
        PluginContext::new(self.bus.clone(), Arc::clone(&self.cache), self.model.clone())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Register and initialize a plugin under `metadata().name`.
    ///
    /// An existing plugin with the same name is stopped, unsubscribed, and
    /// replaced in place. If the service is already running the new plugin
    /// is started right away. An `initialize` failure is returned as
    /// [`KestrelError::Initialization`]; the plugin stays listed as failed
    /// and is never started.
    pub async fn register_plugin(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let meta = plugin.metadata();
        let name = meta.name.clone();

        let previous = {
            let slots = self.slots.read();
            slots
                .iter()
                .find(|s| s.name == name)
                .map(|s| (Arc::clone(&s.plugin), s.state.clone(), s.subscription))
        };
        if let Some((old, state, subscription)) = previous {
            info!(plugin = %name, state = state.label(), "replacing registered plugin");
            if let Some(id) = subscription {
                self.bus.unsubscribe(id);
            }
            if old.capabilities().contains(Capability::Lifecycle) && state != PluginState::Stopped
            {
                if let Err(e) = old.stop().await {
                    warn!(plugin = %name, error = %e, "previous instance failed to stop");
                }
            }
            self.events.publish(Event::PluginReplaced {
                plugin: name.clone(),
            });
        }

        {
            let mut slots = self.slots.write();
            let slot = PluginSlot {
                name: name.clone(),
                plugin: Arc::clone(&plugin),
                state: PluginState::Registered,
                subscription: None,
            };
            match slots.iter_mut().find(|s| s.name == name) {
                Some(existing) => *existing = slot,
                None => slots.push(slot),
            }
        }
        // Keeps the plugin's position in the dispatch order, even on failure.
        self.dispatcher.register(&name, Vec::new());
        self.events.publish(Event::PluginRegistered {
            plugin: name.clone(),
            version: meta.version.clone(),
        });

        if let Err(e) = plugin.initialize(self.context()).await {
            error!(plugin = %name, error = %e, "plugin initialization failed");
            self.set_state(&name, PluginState::Failed(e.to_string()));
            self.events.publish(Event::PluginFailed {
                plugin: name.clone(),
                error: e.to_string(),
            });
            return Err(KestrelError::Initialization {
                plugin: name,
                reason: e.to_string(),
            });
        }

        let actions = self.dispatcher.register(&name, plugin.actions());
        self.set_state(&name, PluginState::Initialized);
        self.ensure_subscribed(&name, &plugin);
        info!(plugin = %name, version = %meta.version, actions, "plugin registered");

        if self.is_running() {
            self.start_plugin(&name, &plugin).await;
        }
        Ok(())
    }

    /// Start every initialized (or previously stopped) plugin in
    /// registration order. A failing plugin is marked failed; the rest
    /// still start.
    pub async fn start(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("agent service already running");
            return Ok(());
        }
        *self.started_at.write() = Some(Utc::now());
        self.events.publish(Event::Started {
            timestamp: Utc::now(),
        });

        let pending: Vec<(String, Arc<dyn Plugin>)> = self
            .slots
            .read()
            .iter()
            .filter(|s| matches!(s.state, PluginState::Initialized | PluginState::Stopped))
            .map(|s| (s.name.clone(), Arc::clone(&s.plugin)))
            .collect();

        info!(plugins = pending.len(), "starting agent service");
        for (name, plugin) in pending {
            self.ensure_subscribed(&name, &plugin);
            self.start_plugin(&name, &plugin).await;
        }
        Ok(())
    }

    /// Stop plugins in reverse registration order. Best effort: a failing
    /// `stop` is logged and the plugin is still marked stopped. Calling this
    /// more than once is harmless.
    pub async fn stop(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let was_running = self.running.swap(false, Ordering::SeqCst);

        let active: Vec<(String, Arc<dyn Plugin>, PluginState, Option<SubscriptionId>)> = {
            let mut slots = self.slots.write();
            slots
                .iter_mut()
                .rev()
                .filter(|s| matches!(s.state, PluginState::Initialized | PluginState::Started))
                .map(|s| {
                    (
                        s.name.clone(),
                        Arc::clone(&s.plugin),
                        s.state.clone(),
                        s.subscription.take(),
                    )
                })
                .collect()
        };

        for (name, plugin, state, subscription) in active {
            if let Some(id) = subscription {
                self.bus.unsubscribe(id);
            }
            if state.is_running() && plugin.capabilities().contains(Capability::Lifecycle) {
                if let Err(e) = plugin.stop().await {
                    warn!(plugin = %name, error = %e, "plugin failed to stop cleanly");
                }
            }
            self.set_state(&name, PluginState::Stopped);
            self.events.publish(Event::PluginStopped {
                plugin: name.clone(),
            });
            info!(plugin = %name, "plugin stopped");
        }

        if was_running {
            self.events.publish(Event::Shutdown);
            info!("agent service stopped");
        }
        Ok(())
    }

    async fn start_plugin(&self, name: &str, plugin: &Arc<dyn Plugin>) {
        if plugin.capabilities().contains(Capability::Lifecycle) {
            if let Err(e) = plugin.start().await {
                error!(plugin = %name, error = %e, "plugin failed to start");
                self.set_state(name, PluginState::Failed(e.to_string()));
                self.drop_subscription(name);
                self.events.publish(Event::PluginFailed {
                    plugin: name.to_string(),
                    error: e.to_string(),
                });
                return;
            }
        }
        self.set_state(name, PluginState::Started);
        self.events.publish(Event::PluginStarted {
            plugin: name.to_string(),
        });
        info!(plugin = %name, "plugin started");
    }

    fn ensure_subscribed(&self, name: &str, plugin: &Arc<dyn Plugin>) {
        if !plugin.capabilities().contains(Capability::Messages) {
            return;
        }
        let mut slots = self.slots.write();
        if let Some(slot) = slots.iter_mut().find(|s| s.name == name) {
            if slot.subscription.is_none() {
                let id = self
                    .bus
                    .subscribe(PluginMessageHandler::new(Arc::clone(plugin)));
                slot.subscription = Some(id);
                debug!(plugin = %name, "subscribed to message bus");
            }
        }
    }

    fn drop_subscription(&self, name: &str) {
        let id = self
            .slots
            .write()
            .iter_mut()
            .find(|s| s.name == name)
            .and_then(|s| s.subscription.take());
        if let Some(id) = id {
            self.bus.unsubscribe(id);
        }
    }

    fn set_state(&self, name: &str, state: PluginState) {
        if let Some(slot) = self.slots.write().iter_mut().find(|s| s.name == name) {
            slot.state = state;
        }
    }

    // ── Actions & messages ─────────────────────────────────────

    /// Run an action through the dispatcher. `plugin = None` searches
    /// plugins in registration order.
    pub async fn invoke_action(
        &self,
        plugin: Option<&str>,
        action: &str,
        input: Value,
    ) -> Result<Value> {
        let resolved_plugin = self.dispatcher.resolve(plugin, action)?.plugin;
        let result = self
            .dispatcher
            .execute(Some(&resolved_plugin), action, input)
            .await;
        self.events.publish(Event::ActionInvoked {
            plugin: resolved_plugin,
            action: action.to_string(),
            is_error: result.is_err(),
        });
        result
    }

    /// Publish `content` on the bus as coming from `source`.
    pub async fn publish(&self, source: &str, content: impl Into<String>) -> Arc<Message> {
        let message = Arc::new(Message::new(source, content));
        let delivered = self.bus.publish(Arc::clone(&message)).await;
        debug!(source, id = %message.id, delivered, "published message");
        message
    }

    /// The model-driven action-selection loop.
    ///
    /// Offers every registered action as a tool, dispatches the calls the
    /// model makes, feeds the results back, and repeats until the model
    /// answers in plain text or `max_iterations` round-trips have been made.
    /// Successful action results are published with the owning plugin as
    /// source; the final answer is published as `system`.
    pub async fn run_model_turn(&self, prompt: &str) -> Result<ModelTurn> {
        let tools = self.dispatcher.tools();
        let mut messages = vec![ChatMessage::user(prompt)];
        let mut usage = Usage::default();
        let mut records = Vec::new();
        let mut text = String::new();
        let mut iterations = 0;
        let mut exhausted = true;

        while iterations < self.max_iterations {
            iterations += 1;
            let request =
                self.model
                    .request(self.system_prompt.clone(), messages.clone(), tools.clone());
            let response = self.model.complete(&request).await?;
            usage.merge(&response.usage);
            text = response.message.content.clone();

            if !response.has_tool_calls() {
                exhausted = false;
                break;
            }

            let calls = response.message.tool_calls.clone();
            debug!(iteration = iterations, calls = calls.len(), "model requested actions");
            messages.push(response.message);

            for call in &calls {
                let outcome = self.dispatcher.execute_tool_call(call).await;
                let result = outcome.result;
                if let Some(plugin) = &outcome.plugin {
                    self.events.publish(Event::ActionInvoked {
                        plugin: plugin.clone(),
                        action: call.tool_name.clone(),
                        is_error: result.is_error,
                    });
                    if !result.is_error {
                        let message = Message::new(plugin.as_str(), result.content.clone())
                            .with_meta("action", call.tool_name.clone())
                            .with_meta("tool_call_id", call.id.clone());
                        self.bus.publish(message).await;
                    }
                }
                messages.push(ChatMessage::tool_result(&call.id, &result.content));
                records.push(ActionRecord {
                    plugin: outcome.plugin,
                    tool: call.tool_name.clone(),
                    call_id: call.id.clone(),
                    is_error: result.is_error,
                    content: result.content,
                });
            }
        }

        if exhausted {
            warn!(
                iterations,
                "model turn hit the iteration limit with actions still pending"
            );
        }

        let message = if text.is_empty() {
            None
        } else {
            Some(self.publish(SYSTEM_SOURCE, text.clone()).await)
        };

        info!(
            iterations,
            actions = records.len(),
            tokens = usage.total_tokens(),
            "model turn complete"
        );
        Ok(ModelTurn {
            text,
            actions: records,
            iterations,
            usage,
            exhausted,
            message,
        })
    }

    // ── Introspection ──────────────────────────────────────────

    pub fn plugin_states(&self) -> Vec<(String, PluginState)> {
        self.slots
            .read()
            .iter()
            .map(|s| (s.name.clone(), s.state.clone()))
            .collect()
    }

    pub fn plugin_state(&self, name: &str) -> Option<PluginState> {
        self.slots
            .read()
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.state.clone())
    }

    pub fn plugin_metadata(&self) -> Vec<PluginMetadata> {
        self.slots
            .read()
            .iter()
            .map(|s| s.plugin.metadata().clone())
            .collect()
    }

    pub fn plugin_status(&self) -> Vec<PluginStatus> {
        self.slots
            .read()
            .iter()
            .map(|s| {
                let meta = s.plugin.metadata();
                PluginStatus {
                    name: s.name.clone(),
                    version: meta.version.clone(),
                    description: meta.description.clone(),
                    state: s.state.label(),
                    error: match &s.state {
                        PluginState::Failed(reason) => Some(reason.clone()),
                        _ => None,
                    },
                    actions: self.dispatcher.actions_of(&s.name),
                }
            })
            .collect()
    }

    /// Time since the service was constructed.
    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        *self.started_at.read()
    }
}

impl std::fmt::Debug for AgentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentService")
            .field("plugins", &self.slots.read().len())
            .field("running", &self.is_running())
            .field("cache", &self.cache.backend())
            .field("model", &self.model)
            .finish()
    }
}
