use async_trait::async_trait;
use kestrel_core::{KestrelError, Result, ToolCall};
use tracing::{debug, info};

use crate::provider::*;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const TOGETHER_BASE_URL: &str = "https://api.together.xyz/v1";

/// OpenAI-compatible chat-completions provider (OpenAI, Together, vLLM, ...).
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    provider_name: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.into(),
            provider_name: "openai".into(),
        }
    }

    /// Together AI speaks the same wire format.
    pub fn together(api_key: String) -> Self {
        Self::new(api_key).with_base_url(TOGETHER_BASE_URL.into(), "together".into())
    }

    /// Use a custom base URL.
    pub fn with_base_url(mut self, url: String, name: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self.provider_name = name;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Build the chat-completions request body.
pub(crate) fn request_body(request: &LlmRequest) -> serde_json::Value {
    let mut messages = Vec::new();

    if let Some(ref system) = request.system {
        messages.push(serde_json::json!({
            "role": "system",
            "content": system,
        }));
    }

    for msg in &request.messages {
        match msg.role {
            ChatRole::System => messages.push(serde_json::json!({
                "role": "system",
                "content": msg.content,
            })),
            ChatRole::User => messages.push(serde_json::json!({
                "role": "user",
                "content": msg.content,
            })),
            ChatRole::Assistant if msg.tool_calls.is_empty() => {
                messages.push(serde_json::json!({
                    "role": "assistant",
                    "content": msg.content,
                }))
            }
            ChatRole::Assistant => {
                let tc: Vec<serde_json::Value> = msg
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        serde_json::json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.tool_name,
                                "arguments": tc.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                let content = if msg.content.is_empty() {
                    serde_json::Value::Null
                } else {
                    serde_json::json!(msg.content)
                };
                messages.push(serde_json::json!({
                    "role": "assistant",
                    "content": content,
                    "tool_calls": tc,
                }));
            }
            ChatRole::Tool => match &msg.tool_call_id {
                Some(id) => messages.push(serde_json::json!({
                    "role": "tool",
                    "tool_call_id": id,
                    "content": msg.content,
                })),
                // Orphan tool output would be rejected by the API.
                None => messages.push(serde_json::json!({
                    "role": "user",
                    "content": msg.content,
                })),
            },
        }
    }

    let mut body = serde_json::json!({
        "model": &request.model,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
        "messages": messages,
    });

    if !request.tools.is_empty() {
        let tools: Vec<serde_json::Value> = request
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        body["tools"] = serde_json::json!(tools);
    }

    body
}

/// Parse a chat-completions response body.
pub(crate) fn parse_response(data: &serde_json::Value) -> LlmResponse {
    let choice = &data["choices"][0];
    let content = choice["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string();

    let tool_calls: Vec<ToolCall> = choice["message"]["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|c| {
                    Some(ToolCall {
                        id: c["id"].as_str()?.to_string(),
                        tool_name: c["function"]["name"].as_str()?.to_string(),
                        arguments: serde_json::from_str(
                            c["function"]["arguments"].as_str().unwrap_or("{}"),
                        )
                        .unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let has_tool_calls = !tool_calls.is_empty();
    let finish_reason = choice["finish_reason"].as_str().unwrap_or("");

    let usage_data = &data["usage"];
    LlmResponse {
        message: ChatMessage::assistant(content, tool_calls),
        usage: Usage {
            input_tokens: usage_data["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: usage_data["completion_tokens"].as_u64().unwrap_or(0) as u32,
        },
        stop_reason: match finish_reason {
            "length" => StopReason::MaxTokens,
            "content_filter" => StopReason::ContentFilter,
            _ if has_tool_calls => StopReason::ToolUse,
            _ => StopReason::EndTurn,
        },
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = request_body(request);
        debug!(
            provider = %self.provider_name,
            model = %request.model,
            tools = request.tools.len(),
            "sending completion request"
        );

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| KestrelError::LlmProvider(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(KestrelError::LlmProvider(format!("HTTP {status}: {text}")));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| KestrelError::LlmProvider(e.to_string()))?;

        Ok(parse_response(&data))
    }

    async fn health_check(&self) -> Result<()> {
        info!(provider = %self.provider_name, "checking API health");
        if self.api_key.is_empty() {
            return Err(KestrelError::LlmProvider(format!(
                "{} API key not set",
                self.provider_name
            )));
        }
        Ok(())
    }
}
