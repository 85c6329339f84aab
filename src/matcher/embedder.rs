// Text embeddings for semantic matching.
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::ReplayResult;
use crate::llm::provider::LlmProvider;
use crate::llm::registry::{ProviderRegistry, Role};

/// Text embedding collaborator used by the matcher.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> ReplayResult<Vec<f32>>;
}

/// Embeds through the provider mapped to the `embedding` role.
pub struct LlmEmbedder {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmEmbedder {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn from_registry(registry: &ProviderRegistry) -> ReplayResult<Self> {
        let (provider, call) = registry.call_config_for_role(Role::Embedding)?;
        Ok(Self::new(provider, call.model))
    }
}

#[async_trait]
impl Embedder for LlmEmbedder {
    async fn embed(&self, text: &str) -> ReplayResult<Vec<f32>> {
        self.provider.embed(text, &self.model).await
    }
}

/// Cosine similarity in [-1, 1]; 0 for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na * nb)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
