// LLM provider trait.
use async_trait::async_trait;

use crate::errors::ReplayResult;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};

/// Unified LLM provider trait. New backends implement this and are registered
/// from `[llm.providers.*]` in config.toml.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// The provider's identifier (matches the config.toml key).
    fn name(&self) -> &str;

    /// One chat completion. Streaming is handled internally when `cfg.stream`
    /// is set; the accumulated reply is returned either way.
    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> ReplayResult<LlmResponse>;

    /// Embedding vector for `input`.
    async fn embed(&self, input: &str, model: &str) -> ReplayResult<Vec<f32>>;
}
