use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An action as advertised to the language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Model-facing name, `plugin__action`.
    pub name: String,
    /// Human-readable description for the LLM.
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: Value,
    /// Which plugin provides this tool.
    #[serde(default)]
    pub provider: Option<String>,
}

/// A request from the LLM to call a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// The result of executing a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
    /// Optional structured data returned alongside the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn ok(tool_call_id: impl Into<String>, data: Value) -> Self {
        let content = match &data {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self {
            tool_call_id: tool_call_id.into(),
            content,
            is_error: false,
            data: Some(data),
        }
    }

    pub fn error(tool_call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: message.into(),
            is_error: true,
            data: None,
        }
    }
}
