// Vision model picks a Set-of-Marks marker for a target description.
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::errors::{ReplayError, ReplayResult};
use crate::llm::provider::LlmProvider;
use crate::llm::registry::{ProviderRegistry, Role};
use crate::llm::types::{CallConfig, ChatMessage};
use crate::perception::traits::MarkerResolver;

const MARKER_PROMPT: &str = "\
You are looking at a screenshot where UI elements are marked with numbered red boxes.
Reply with ONLY the marker number of the element that best matches the target.
If no marked element matches, reply with the single word: none";

/// Asks a vision model which Set-of-Marks marker matches a description.
pub struct VisionMarkerResolver {
    provider: Arc<dyn LlmProvider>,
    call: CallConfig,
    number: Regex,
}

impl VisionMarkerResolver {
    pub fn new(provider: Arc<dyn LlmProvider>, call: CallConfig) -> ReplayResult<Self> {
        let number = Regex::new(r"\d+").map_err(|e| ReplayError::Config(e.to_string()))?;
        Ok(Self { provider, call, number })
    }

    pub fn from_registry(registry: &ProviderRegistry) -> ReplayResult<Self> {
        let (provider, call) = registry.call_config_for_role(Role::Vision)?;
        Self::new(provider, call)
    }

    fn parse_reply(&self, reply: &str) -> Option<u32> {
        let reply = reply.trim();
        if reply.to_lowercase().starts_with("none") {
            return None;
        }
        self.number
            .find(reply)
            .and_then(|m| m.as_str().parse::<u32>().ok())
    }
}

#[async_trait]
impl MarkerResolver for VisionMarkerResolver {
    async fn resolve_marker(
        &self,
        marked_image: &[u8],
        element_reference: &str,
        target_description: &str,
    ) -> ReplayResult<Option<u32>> {
        let prompt = format!(
            "Target element: \"{target_description}\"\n\nMarked elements:\n{element_reference}"
        );
        let messages = vec![
            ChatMessage::system(MARKER_PROMPT),
            ChatMessage::user_with_image(prompt, marked_image),
        ];
        let response = self.provider.chat(messages, &self.call).await?;
        let marker = self.parse_reply(&response.content);
        tracing::info!(
            element = target_description,
            reply = %response.content.trim(),
            marker = ?marker,
            "vision marker resolved"
        );
        Ok(marker)
    }
}
