// Configuration loading from config.toml and the environment.
use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{ReplayError, ReplayResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub locator: LocatorConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// Directory holding one `<id>.json` per workflow. Empty means the platform data dir.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl StoreConfig {
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        dirs::data_local_dir()
            .map(|d| d.join("ReplayFlow").join("workflows"))
            .unwrap_or_else(|| PathBuf::from("workflows"))
    }
}

/// Acceptance bars for each locator strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorThresholds {
    /// OCR detections below this are dropped before text matching.
    pub ocr_floor: f32,
    pub exact: f32,
    pub fuzzy: f32,
    /// Detections below this get no Set-of-Marks marker.
    pub marker_floor: f32,
    pub vision_confidence: f32,
    pub position_confidence: f32,
}

impl Default for LocatorThresholds {
    fn default() -> Self {
        Self {
            ocr_floor: 0.6,
            exact: 0.95,
            fuzzy: 0.6,
            marker_floor: 0.6,
            vision_confidence: 0.85,
            position_confidence: 0.5,
        }
    }
}

impl LocatorThresholds {
    /// Looser bars swapped in during step recovery.
    pub fn relaxed() -> Self {
        Self {
            ocr_floor: 0.4,
            exact: 0.85,
            fuzzy: 0.45,
            marker_floor: 0.4,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub thresholds: LocatorThresholds,
    pub relaxed: LocatorThresholds,
    /// Maximum lines of the element reference sent with a marked screenshot.
    pub max_reference_lines: usize,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            thresholds: LocatorThresholds::default(),
            relaxed: LocatorThresholds::relaxed(),
            max_reference_lines: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub ui_settle_ms: u64,
    pub inter_step_delay_ms: u64,
    pub recovery_wait_ms: u64,
    pub recovery_scroll_amount: i32,
    /// Hamming distance at or below which two screen hashes count as unchanged.
    pub change_threshold: u32,
    /// Abort when the pointer sits within this many pixels of a screen corner.
    pub failsafe_corner_px: i32,
    /// Pass recorded click positions to the locator as a last resort.
    pub position_fallback: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            ui_settle_ms: 500,
            inter_step_delay_ms: 1000,
            recovery_wait_ms: 3000,
            recovery_scroll_amount: 2,
            change_threshold: 5,
            failsafe_corner_px: 5,
            position_fallback: true,
        }
    }
}

impl ExecutorConfig {
    /// All waits zeroed. Used for dry runs and tests.
    pub fn immediate() -> Self {
        Self {
            base_delay_ms: 0,
            ui_settle_ms: 0,
            inter_step_delay_ms: 0,
            recovery_wait_ms: 0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub threshold: f32,
    pub use_embeddings: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            use_embeddings: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub debounce_ms: u64,
    /// Max distance from a click to an OCR element for it to become the step label.
    pub element_radius_px: i32,
    pub max_nearby_labels: usize,
    pub channel_capacity: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            element_radius_px: 100,
            max_nearby_labels: 5,
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    /// Full chat-completions URL.
    pub api_base: String,
    #[serde(default)]
    pub embeddings_url: Option<String>,
    /// Default model for this provider (used as fallback when no role config exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Optional API key stored in config.toml (falls back to env var REPLAYFLOW_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Picks a Set-of-Marks marker from an annotated screenshot.
    pub vision: Option<RoleEntry>,
    /// Vision model used as a text detector.
    pub ocr: Option<RoleEntry>,
    pub embedding: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f64 {
    0.1
}

fn resolve_config_path() -> ReplayResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(ReplayError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn from_toml_str(content: &str) -> ReplayResult<AppConfig> {
    Ok(toml::from_str(content)?)
}

pub fn load_config() -> ReplayResult<AppConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config = from_toml_str(&content)?;
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok(config)
}

pub fn load_config_or_default() -> AppConfig {
    match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "using default configuration");
            AppConfig::default()
        }
    }
}

pub fn save_config(config: &AppConfig, path: &std::path::Path) -> ReplayResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = from_toml_str("").unwrap();
        assert_eq!(cfg.executor.max_retries, 3);
        assert_eq!(cfg.executor.base_delay_ms, 1000);
        assert_eq!(cfg.locator.thresholds.exact, 0.95);
        assert_eq!(cfg.locator.max_reference_lines, 30);
        assert_eq!(cfg.matcher.threshold, 0.7);
        assert_eq!(cfg.recorder.debounce_ms, 500);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let cfg = from_toml_str(
            r#"
            [executor]
            max_retries = 5

            [locator.thresholds]
            fuzzy = 0.7

            [llm]
            active_provider = "groq"

            [llm.providers.groq]
            display_name = "Groq"
            api_base = "https://api.groq.com/openai/v1/chat/completions"
            model = "llama"

            [llm.roles.vision]
            provider = "groq"
            model = "llama-vision"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.executor.max_retries, 5);
        assert_eq!(cfg.executor.ui_settle_ms, 500);
        assert_eq!(cfg.locator.thresholds.fuzzy, 0.7);
        assert_eq!(cfg.locator.thresholds.exact, 0.95);
        assert_eq!(cfg.locator.relaxed, LocatorThresholds::relaxed());
        assert_eq!(cfg.llm.providers["groq"].temperature, 0.1);
        assert!(!cfg.llm.roles.vision.as_ref().unwrap().stream);
    }

    #[test]
    fn relaxed_thresholds_are_looser() {
        let strict = LocatorThresholds::default();
        let relaxed = LocatorThresholds::relaxed();
        assert!(relaxed.exact < strict.exact);
        assert!(relaxed.fuzzy < strict.fuzzy);
        assert!(relaxed.ocr_floor < strict.ocr_floor);
    }

    #[test]
    fn explicit_data_dir_wins() {
        let cfg = StoreConfig {
            data_dir: Some(PathBuf::from("/tmp/flows")),
        };
        assert_eq!(cfg.resolve_data_dir(), PathBuf::from("/tmp/flows"));
    }

    #[test]
    fn save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = AppConfig::default();
        cfg.matcher.threshold = 0.5;
        save_config(&cfg, &path).unwrap();
        let loaded = from_toml_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.matcher.threshold, 0.5);
    }
}
