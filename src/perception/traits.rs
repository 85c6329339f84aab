// Perception collaborator traits.
use async_trait::async_trait;

use crate::errors::ReplayResult;
use crate::perception::types::{Screenshot, TextDetection};

/// Source of screen frames.
#[async_trait]
pub trait ScreenshotProvider: Send + Sync {
    async fn capture(&self) -> ReplayResult<Screenshot>;
}

/// OCR collaborator: every readable string on the frame with its position.
#[async_trait]
pub trait TextDetector: Send + Sync {
    async fn detect_text(&self, screenshot: &Screenshot) -> ReplayResult<Vec<TextDetection>>;
}

/// Vision-grounded matching collaborator.
///
/// Receives a frame with numbered markers drawn on it plus a text legend of
/// those markers, and answers which marker corresponds to `target_description`.
#[async_trait]
pub trait MarkerResolver: Send + Sync {
    async fn resolve_marker(
        &self,
        marked_image: &[u8],
        element_reference: &str,
        target_description: &str,
    ) -> ReplayResult<Option<u32>>;
}
