use thiserror::Error;

/// Unified error type for the entire Kestrel runtime.
#[derive(Error, Debug)]
pub enum KestrelError {
    // ── Plugin lifecycle errors ────────────────────────────────
    #[error("plugin initialization failed: {plugin}: {reason}")]
    Initialization { plugin: String, reason: String },

    #[error("plugin error: {plugin}: {reason}")]
    Plugin { plugin: String, reason: String },

    // ── Action errors ──────────────────────────────────────────
    #[error("action not found: {}", qualified(.plugin, .action))]
    ActionNotFound {
        plugin: Option<String>,
        action: String,
    },

    #[error("invalid input for action {action}: {reason}")]
    InvalidActionInput { action: String, reason: String },

    #[error("action execution failed: {action}: {reason}")]
    ActionExecution { action: String, reason: String },

    // ── External collaborators ─────────────────────────────────
    #[error("fetch from {source_name} failed: {reason}")]
    ExternalFetch { source_name: String, reason: String },

    #[error("llm provider error: {0}")]
    LlmProvider(String),

    // ── Cache errors ───────────────────────────────────────────
    #[error("cache error: {0}")]
    Cache(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

fn qualified(plugin: &Option<String>, action: &str) -> String {
    match plugin {
        Some(p) => format!("{p}.{action}"),
        None => action.to_string(),
    }
}

impl KestrelError {
    /// Shorthand for wrapping an arbitrary failure inside an action.
    pub fn action_failed(action: impl Into<String>, reason: impl ToString) -> Self {
        KestrelError::ActionExecution {
            action: action.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, KestrelError>;
