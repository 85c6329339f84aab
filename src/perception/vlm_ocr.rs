// Text detection through a vision language model.
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::{ReplayError, ReplayResult};
use crate::llm::provider::LlmProvider;
use crate::llm::registry::{ProviderRegistry, Role};
use crate::llm::types::{CallConfig, ChatMessage};
use crate::perception::traits::TextDetector;
use crate::perception::types::{Screenshot, TextDetection};

const OCR_PROMPT: &str = "\
List every readable piece of text on this screenshot that belongs to a UI element
(buttons, links, labels, menu items, tabs, field placeholders).
Reply with a JSON array only. Each item:
{\"text\": string, \"x_percent\": number, \"y_percent\": number, \"confidence\": number}
where x_percent/y_percent locate the centre of the text as 0-100 percent of the image
width/height and confidence is between 0 and 1.";

#[derive(Debug, Deserialize)]
struct VlmTextItem {
    text: String,
    x_percent: f64,
    y_percent: f64,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    0.8
}

/// Text detector backed by a vision-language model.
pub struct VlmTextDetector {
    provider: Arc<dyn LlmProvider>,
    call: CallConfig,
}

impl VlmTextDetector {
    pub fn new(provider: Arc<dyn LlmProvider>, call: CallConfig) -> Self {
        Self { provider, call }
    }

    pub fn from_registry(registry: &ProviderRegistry) -> ReplayResult<Self> {
        let (provider, call) = registry.call_config_for_role(Role::Ocr)?;
        Ok(Self::new(provider, call))
    }
}

/// Converts the model's percent-positioned items into pixel detections.
fn parse_detections(raw: &str, width: u32, height: u32) -> ReplayResult<Vec<TextDetection>> {
    let items: Vec<VlmTextItem> = serde_json::from_str(raw)
        .map_err(|e| ReplayError::Perception(format!("unparseable OCR reply: {e}")))?;

    Ok(items
        .into_iter()
        .filter(|item| !item.text.trim().is_empty())
        .map(|item| {
            let px = |pct: f64, extent: u32| {
                let max = extent.saturating_sub(1) as f64;
                (pct.clamp(0.0, 100.0) / 100.0 * extent as f64).min(max).round() as i32
            };
            let center = (px(item.x_percent, width), px(item.y_percent, height));
            TextDetection::new(item.text.trim(), item.confidence.clamp(0.0, 1.0), center)
        })
        .collect())
}

#[async_trait]
impl TextDetector for VlmTextDetector {
    async fn detect_text(&self, screenshot: &Screenshot) -> ReplayResult<Vec<TextDetection>> {
        let messages = vec![ChatMessage::user_with_image(OCR_PROMPT, &screenshot.image_bytes)];
        let response = self.provider.chat(messages, &self.call).await?;
        let (w, h) = screenshot.size();
        let detections = parse_detections(response.code_block_or_content(), w, h)?;
        tracing::info!(count = detections.len(), "VLM text detection complete");
        Ok(detections)
    }
}
