//! Mock LLM provider for deterministic testing.
//!
//! Returns pre-configured responses without making any HTTP calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::provider::*;
use kestrel_core::{KestrelError, Result, ToolCall};

/// Replays queued responses in order, then answers with a fixed
/// placeholder once the queue runs dry.
pub struct MockProvider {
    responses: Mutex<VecDeque<MockResponse>>,
    /// Track all requests received (for assertions in tests).
    pub requests: Arc<Mutex<Vec<LlmRequest>>>,
    name: String,
}

/// A pre-configured response from the mock provider.
#[derive(Clone, Default)]
pub struct MockResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    /// If set, the provider will return this error instead.
    pub error: Option<String>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Arc::new(Mutex::new(vec![])),
            name: name.into(),
        }
    }

    /// Queue a simple text response.
    pub fn with_response(self, text: &str) -> Self {
        self.responses.lock().push_back(MockResponse {
            text: text.to_string(),
            ..Default::default()
        });
        self
    }

    /// Queue a tool call response.
    pub fn with_tool_call(self, name: &str, args: serde_json::Value) -> Self {
        self.responses.lock().push_back(MockResponse {
            tool_calls: vec![ToolCall {
                id: format!("call_{}", uuid::Uuid::new_v4()),
                tool_name: name.to_string(),
                arguments: args,
            }],
            ..Default::default()
        });
        self
    }

    /// Queue an error response.
    pub fn with_error(self, error: &str) -> Self {
        self.responses.lock().push_back(MockResponse {
            error: Some(error.to_string()),
            ..Default::default()
        });
        self
    }

    /// Queue a fully custom response.
    pub fn with_mock_response(self, resp: MockResponse) -> Self {
        self.responses.lock().push_back(resp);
        self
    }

    /// Get all requests that were made to this provider.
    pub fn recorded_requests(&self) -> Arc<Mutex<Vec<LlmRequest>>> {
        Arc::clone(&self.requests)
    }

    fn next_response(&self) -> MockResponse {
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| MockResponse {
                text: "(mock: no more queued responses)".to_string(),
                ..Default::default()
            })
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.requests.lock().push(request.clone());
        let mock = self.next_response();

        if let Some(error) = mock.error {
            return Err(KestrelError::LlmProvider(error));
        }

        let stop_reason = if mock.tool_calls.is_empty() {
            StopReason::EndTurn
        } else {
            StopReason::ToolUse
        };

        Ok(LlmResponse {
            message: ChatMessage::assistant(mock.text, mock.tool_calls),
            usage: Usage {
                input_tokens: 100,
                output_tokens: 50,
            },
            stop_reason,
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req() -> LlmRequest {
        LlmRequest {
            model: "test".into(),
            messages: vec![],
            tools: vec![],
            system: None,
            max_tokens: 100,
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn test_mock_text_response() {
        let provider = MockProvider::new("mock").with_response("Hello!");
        let resp = provider.complete(&req()).await.unwrap();
        assert_eq!(resp.message.content, "Hello!");
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
        assert!(!resp.has_tool_calls());
    }

    #[tokio::test]
    async fn test_mock_tool_call() {
        let provider = MockProvider::new("mock")
            .with_tool_call("mentions__check_mentions", serde_json::json!({}));
        let resp = provider.complete(&req()).await.unwrap();
        assert!(resp.has_tool_calls());
        assert_eq!(resp.message.tool_calls[0].tool_name, "mentions__check_mentions");
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
    }

    #[tokio::test]
    async fn test_mock_error() {
        let provider = MockProvider::new("mock").with_error("HTTP 429: rate limited");
        let result = provider.complete(&req()).await;
        assert!(matches!(result, Err(KestrelError::LlmProvider(_))));
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let provider = MockProvider::new("mock").with_response("ok");
        let mut request = req();
        request.system = Some("be nice".into());
        request.messages.push(ChatMessage::user("hello"));

        let _ = provider.complete(&request).await;
        let recorded = provider.recorded_requests();
        let recorded = recorded.lock();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].system, Some("be nice".into()));
    }

    #[tokio::test]
    async fn test_mock_multiple_responses_in_order() {
        let provider = MockProvider::new("mock")
            .with_response("first")
            .with_response("second");
        let r1 = provider.complete(&req()).await.unwrap();
        let r2 = provider.complete(&req()).await.unwrap();
        let r3 = provider.complete(&req()).await.unwrap();
        assert_eq!(r1.message.content, "first");
        assert_eq!(r2.message.content, "second");
        assert!(r3.message.content.contains("no more queued"));
    }
}
