use serde::Serialize;
use std::sync::Arc;

use kestrel_core::Message;
use kestrel_llm::Usage;

/// One action the model asked for during a turn.
#[derive(Debug, Clone, Serialize)]
pub struct ActionRecord {
    /// Owning plugin; `None` when the tool name did not resolve.
    pub plugin: Option<String>,
    pub tool: String,
    pub call_id: String,
    pub is_error: bool,
    /// Result text, or the error message fed back to the model.
    pub content: String,
}

/// Outcome of [`AgentService::run_model_turn`](crate::AgentService::run_model_turn).
#[derive(Debug, Clone, Serialize)]
pub struct ModelTurn {
    /// Final assistant text.
    pub text: String,
    pub actions: Vec<ActionRecord>,
    /// Model round-trips made.
    pub iterations: usize,
    pub usage: Usage,
    /// Set when the loop hit the iteration ceiling while the model still
    /// wanted to call actions.
    pub exhausted: bool,
    /// The `system` bus message carrying `text`, if one was published.
    #[serde(skip)]
    pub message: Option<Arc<Message>>,
}

impl ModelTurn {
    pub fn failed_actions(&self) -> impl Iterator<Item = &ActionRecord> {
        self.actions.iter().filter(|a| a.is_error)
    }
}
