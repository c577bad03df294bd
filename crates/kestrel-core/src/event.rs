use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::sync::Arc;
use tokio::sync::broadcast;

/// Runtime lifecycle events, observable independently of the message bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    // ── Plugin lifecycle ───────────────────────────────────────
    PluginRegistered {
        plugin: String,
        version: String,
    },
    PluginReplaced {
        plugin: String,
    },
    PluginStarted {
        plugin: String,
    },
    PluginStopped {
        plugin: String,
    },
    PluginFailed {
        plugin: String,
        error: String,
    },

    // ── Actions ────────────────────────────────────────────────
    ActionInvoked {
        plugin: String,
        action: String,
        is_error: bool,
    },

    // ── System ─────────────────────────────────────────────────
    Started {
        timestamp: DateTime<Utc>,
    },
    Shutdown,
}

/// A broadcast-based event bus for lifecycle notifications.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<Event>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: Event) {
        // Ignore send errors (no subscribers).
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
