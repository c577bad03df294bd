//! # kestrel-llm
//!
//! Abstraction layer over language-model providers. The runtime only sees
//! [`LlmProvider`] and the [`ModelClient`] handle that plugins receive through
//! their context; concrete HTTP wrappers live behind it.

pub mod client;
pub mod mock;
pub mod openai;
pub mod provider;

pub use client::ModelClient;
pub use mock::MockProvider;
pub use openai::OpenAiProvider;
pub use provider::{ChatMessage, ChatRole, LlmProvider, LlmRequest, LlmResponse, StopReason, Usage};
