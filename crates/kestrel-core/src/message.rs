use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Source name used for messages that originate from the runtime itself
/// (model output, operator input) rather than from a plugin.
pub const SYSTEM_SOURCE: &str = "system";

/// A unit of content carried on the [`MessageBus`](crate::MessageBus).
///
/// Messages are shared as `Arc<Message>` once published and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// Plugin name, or [`SYSTEM_SOURCE`].
    pub source: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Id of the message this one responds to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    /// Origin-specific auxiliary data (tweet id, author handle, ...).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    /// Create a message with a fresh random id.
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), source, content)
    }

    /// Create a message with a caller-chosen id (e.g. the upstream item id).
    pub fn with_id(
        id: impl Into<String>,
        source: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            content: content.into(),
            timestamp: Utc::now(),
            in_reply_to: None,
            metadata: Default::default(),
        }
    }

    pub fn in_reply_to(mut self, id: impl Into<String>) -> Self {
        self.in_reply_to = Some(id.into());
        self
    }

    /// Attach an auxiliary field.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    pub fn is_system(&self) -> bool {
        self.source == SYSTEM_SOURCE
    }
}
