use std::sync::Arc;

use kestrel_core::{Result, Tool};
use tracing::debug;

use crate::provider::{ChatMessage, LlmProvider, LlmRequest, LlmResponse};

/// The model capability handed to plugins and to the runtime.
///
/// Bundles a provider with the default model id and sampling settings so
/// callers only supply messages. Constructed once by the orchestrator and
/// passed down explicitly.
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ModelClient {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: 1024,
            temperature: 0.7,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Build a request with this client's defaults.
    pub fn request(
        &self,
        system: Option<String>,
        messages: Vec<ChatMessage>,
        tools: Vec<Tool>,
    ) -> LlmRequest {
        LlmRequest {
            model: self.model.clone(),
            messages,
            tools,
            system,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    pub async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.provider.complete(request).await
    }

    /// Single-shot text generation with an optional model override.
    pub async fn generate_text(
        &self,
        system: Option<&str>,
        prompt: &str,
        model: Option<&str>,
    ) -> Result<String> {
        let mut request = self.request(
            system.map(str::to_string),
            vec![ChatMessage::user(prompt)],
            vec![],
        );
        if let Some(m) = model {
            request.model = m.to_string();
        }
        debug!(model = %request.model, prompt_len = prompt.len(), "generating text");
        let response = self.provider.complete(&request).await?;
        Ok(response.message.content)
    }

    pub async fn health_check(&self) -> Result<()> {
        self.provider.health_check().await
    }
}

impl std::fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClient")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockProvider;

    #[tokio::test]
    async fn test_generate_text_applies_defaults_and_override() {
        let mock = Arc::new(MockProvider::new("mock").with_response("a").with_response("b"));
        let client = ModelClient::new(mock.clone(), "default-model")
            .with_max_tokens(64)
            .with_temperature(0.2);

        assert_eq!(client.generate_text(Some("sys"), "hi", None).await.unwrap(), "a");
        assert_eq!(
            client.generate_text(None, "hi", Some("big-model")).await.unwrap(),
            "b"
        );

        let recorded = mock.recorded_requests();
        let recorded = recorded.lock();
        assert_eq!(recorded[0].model, "default-model");
        assert_eq!(recorded[0].max_tokens, 64);
        assert_eq!(recorded[0].system.as_deref(), Some("sys"));
        assert_eq!(recorded[1].model, "big-model");
    }
}
