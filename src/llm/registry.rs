// Provider registry keyed by id and role.
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{LlmConfig, RoleEntry};
use crate::errors::{ReplayError, ReplayResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// Model roles used by the replay collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Answers Set-of-Marks questions about a marked screenshot.
    Vision,
    /// Reads text and positions off a screenshot.
    Ocr,
    /// Produces embedding vectors for workflow matching.
    Embedding,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Vision => "vision",
            Role::Ocr => "ocr",
            Role::Embedding => "embedding",
        }
    }
}

/// Registry of all configured LLM providers, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    active: String,
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    pub fn new(active: String) -> Self {
        Self {
            providers: HashMap::new(),
            active,
            llm_config: LlmConfig::default(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn get_active(&self) -> ReplayResult<Arc<dyn LlmProvider>> {
        self.providers.get(&self.active).cloned().ok_or_else(|| {
            ReplayError::Config(format!("Active provider '{}' not found in registry", self.active))
        })
    }

    /// Provider and call configuration for a role.
    ///
    /// Resolution order:
    /// 1. `[llm.roles.<role>]` in config.toml
    /// 2. the active provider with its default model and temperature
    pub fn call_config_for_role(&self, role: Role) -> ReplayResult<(Arc<dyn LlmProvider>, CallConfig)> {
        let roles = &self.llm_config.roles;
        let role_entry: Option<&RoleEntry> = match role {
            Role::Vision => roles.vision.as_ref(),
            Role::Ocr => roles.ocr.as_ref(),
            Role::Embedding => roles.embedding.as_ref(),
        };

        if let Some(entry) = role_entry {
            let provider = self.providers.get(&entry.provider).cloned().ok_or_else(|| {
                ReplayError::Config(format!(
                    "Role '{}' references unknown provider '{}'",
                    role.as_str(),
                    entry.provider
                ))
            })?;
            let temperature = entry.temperature.unwrap_or_else(|| {
                self.llm_config
                    .providers
                    .get(&entry.provider)
                    .map(|p| p.temperature)
                    .unwrap_or(0.1)
            });
            tracing::debug!(
                role = role.as_str(),
                provider = %entry.provider,
                model = %entry.model,
                stream = entry.stream,
                "resolved role config"
            );
            return Ok((
                provider,
                CallConfig {
                    model: entry.model.clone(),
                    stream: entry.stream,
                    temperature,
                    max_tokens: entry.max_tokens,
                },
            ));
        }

        let provider = self.get_active()?;
        let (model, temperature) = self
            .llm_config
            .providers
            .get(&self.active)
            .map(|p| (p.model.clone(), p.temperature))
            .unwrap_or_else(|| (String::new(), 0.1));
        tracing::debug!(
            role = role.as_str(),
            provider = %self.active,
            model = %model,
            "role not configured, using active provider fallback"
        );
        Ok((
            provider,
            CallConfig {
                model,
                stream: false,
                temperature,
                max_tokens: None,
            },
        ))
    }

    /// Builds a registry from the loaded config.
    /// API keys come from `REPLAYFLOW_<ID>_API_KEY`, falling back to the config entry.
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut registry = Self {
            providers: HashMap::new(),
            active: config.active_provider.clone(),
            llm_config: config.clone(),
        };
        for (id, entry) in &config.providers {
            let api_key = std::env::var(format!("REPLAYFLOW_{}_API_KEY", id.to_uppercase()))
                .unwrap_or_else(|_| entry.api_key.clone().unwrap_or_default());
            let provider = OpenAiCompatibleProvider::new(id.clone(), entry.api_base.clone(), api_key)
                .with_embeddings_url(entry.embeddings_url.clone());
            registry.register(Arc::new(provider));
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderEntry;

    fn llm_config() -> LlmConfig {
        let mut cfg = LlmConfig {
            active_provider: "groq".into(),
            ..Default::default()
        };
        cfg.providers.insert(
            "groq".into(),
            ProviderEntry {
                display_name: "Groq".into(),
                api_base: "https://example.invalid/v1/chat/completions".into(),
                embeddings_url: None,
                model: "llama-vision".into(),
                temperature: 0.2,
                api_key: Some("k".into()),
            },
        );
        cfg
    }

    #[test]
    fn unconfigured_role_falls_back_to_active_provider() {
        let registry = ProviderRegistry::from_config(&llm_config());
        let (provider, call) = registry.call_config_for_role(Role::Vision).unwrap();
        assert_eq!(provider.name(), "groq");
        assert_eq!(call.model, "llama-vision");
        assert!(!call.stream);
    }

    #[test]
    fn role_entry_overrides_model_and_keeps_provider_temperature() {
        let mut cfg = llm_config();
        cfg.roles.ocr = Some(RoleEntry {
            provider: "groq".into(),
            model: "scout".into(),
            stream: true,
            temperature: None,
            max_tokens: Some(4096),
        });
        let registry = ProviderRegistry::from_config(&cfg);
        let (_, call) = registry.call_config_for_role(Role::Ocr).unwrap();
        assert_eq!(call.model, "scout");
        assert!(call.stream);
        assert_eq!(call.temperature, 0.2);
        assert_eq!(call.max_tokens, Some(4096));
    }

    #[test]
    fn role_with_unknown_provider_is_a_config_error() {
        let mut cfg = llm_config();
        cfg.roles.embedding = Some(RoleEntry {
            provider: "missing".into(),
            model: "m".into(),
            stream: false,
            temperature: None,
            max_tokens: None,
        });
        let registry = ProviderRegistry::from_config(&cfg);
        assert!(matches!(
            registry.call_config_for_role(Role::Embedding),
            Err(ReplayError::Config(_))
        ));
    }

    #[test]
    fn empty_registry_has_no_active_provider() {
        let registry = ProviderRegistry::new(String::new());
        assert!(registry.is_empty());
        assert!(registry.get_active().is_err());
    }
}
