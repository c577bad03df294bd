use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use kestrel_core::{CacheService, Message, MessageBus, Result};
use kestrel_llm::ModelClient;

use crate::action::{ActionSpec, PluginAction};

/// Discovery descriptor for a plugin. Never consulted for execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Unique registry key.
    pub name: String,
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub actions: BTreeMap<String, ActionSpec>,
}

impl PluginMetadata {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: version.into(),
            actions: BTreeMap::new(),
        }
    }

    /// Record the specs of `actions` for documentation.
    pub fn with_actions(mut self, actions: &[PluginAction]) -> Self {
        for action in actions {
            self.actions
                .insert(action.spec.name.clone(), action.spec.clone());
        }
        self
    }
}

/// Optional hooks a plugin can implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// `start` / `stop` are meaningful.
    Lifecycle,
    /// `handle_message` should receive bus traffic.
    Messages,
}

/// The set of optional hooks a plugin implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    lifecycle: bool,
    messages: bool,
}

impl Capabilities {
    /// Reactive only: no lifecycle, no bus subscription.
    pub const PASSIVE: Self = Self {
        lifecycle: false,
        messages: false,
    };

    pub const fn with(mut self, capability: Capability) -> Self {
        match capability {
            Capability::Lifecycle => self.lifecycle = true,
            Capability::Messages => self.messages = true,
        }
        self
    }

    pub const fn contains(&self, capability: Capability) -> bool {
        match capability {
            Capability::Lifecycle => self.lifecycle,
            Capability::Messages => self.messages,
        }
    }
}

/// Where a registered plugin sits in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum PluginState {
    Registered,
    Initialized,
    Started,
    Stopped,
    /// `initialize` or `start` failed; the plugin is excluded from further lifecycle calls.
    Failed(String),
}

impl PluginState {
    pub fn is_running(&self) -> bool {
        matches!(self, PluginState::Started)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PluginState::Registered => "registered",
            PluginState::Initialized => "initialized",
            PluginState::Started => "started",
            PluginState::Stopped => "stopped",
            PluginState::Failed(_) => "failed",
        }
    }
}

/// Capabilities injected into a plugin at `initialize` time. This is the
/// only way a plugin reaches the bus, the cache, or the model.
#[derive(Clone)]
pub struct PluginContext {
    pub bus: MessageBus,
    pub cache: Arc<dyn CacheService>,
    pub model: ModelClient,
}

impl PluginContext {
    pub fn new(bus: MessageBus, cache: Arc<dyn CacheService>, model: ModelClient) -> Self {
        Self { bus, cache, model }
    }

    /// Publish on the shared bus.
    pub async fn publish(&self, message: Message) -> usize {
        self.bus.publish(message).await
    }
}

/// The contract every plugin implements.
///
/// Only `metadata` and `initialize` are required. The optional hooks have
/// no-op defaults and are invoked only when [`Plugin::capabilities`] lists
/// the matching [`Capability`].
#[async_trait]
pub trait Plugin: Send + Sync {
    fn metadata(&self) -> &PluginMetadata;

    /// Runs exactly once, before any other hook.
    async fn initialize(&self, ctx: PluginContext) -> Result<()>;

    /// Named operations this plugin exposes. Read once at registration.
    fn actions(&self) -> Vec<PluginAction> {
        Vec::new()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::PASSIVE
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Must be idempotent and safe on a never-started plugin.
    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn handle_message(&self, _message: Arc<Message>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_set() {
        let caps = Capabilities::PASSIVE;
        assert!(!caps.contains(Capability::Lifecycle));
        assert!(!caps.contains(Capability::Messages));

        let caps = caps.with(Capability::Lifecycle);
        assert!(caps.contains(Capability::Lifecycle));
        assert!(!caps.contains(Capability::Messages));
        assert_eq!(
            caps.with(Capability::Messages),
            Capabilities::PASSIVE
                .with(Capability::Messages)
                .with(Capability::Lifecycle)
        );
    }

    #[test]
    fn test_state_serializes_with_reason() {
        let v = serde_json::to_value(PluginState::Failed("boom".into())).unwrap();
        assert_eq!(v, serde_json::json!({"state": "failed", "reason": "boom"}));
        let v = serde_json::to_value(PluginState::Started).unwrap();
        assert_eq!(v, serde_json::json!({"state": "started"}));
        assert!(PluginState::Started.is_running());
        assert_eq!(PluginState::Stopped.label(), "stopped");
    }
}
