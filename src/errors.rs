// Crate error types.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Workflow store error: {0}")]
    Store(String),

    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Invalid workflow state: {0}")]
    InvalidState(String),

    #[error("Perception error: {0}")]
    Perception(String),

    #[error("Locator error: {0}")]
    Locator(String),

    #[error("Input injection error: {0}")]
    Input(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    #[error("Matcher error: {0}")]
    Matcher(String),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Run cancelled")]
    Cancelled,
}

/// Failure taxonomy of a replay run.
///
/// `ElementNotFound`, `LowConfidenceMatch` and `ActionInjectionFailed` are
/// handled locally by retry and recovery. `UiUnchanged` is only ever logged.
/// `RecoveryExhausted` and `WorkflowNotReady` end the run.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ExecutionError {
    #[error("element not found: '{target}'")]
    ElementNotFound { target: String },

    #[error("low confidence match for '{target}': {confidence:.2} < {threshold:.2}")]
    LowConfidenceMatch {
        target: String,
        confidence: f32,
        threshold: f32,
    },

    #[error("action injection failed: {0}")]
    ActionInjectionFailed(String),

    #[error("UI did not visibly change after step {step_number}")]
    UiUnchanged { step_number: u32 },

    #[error("step {step_number} failed after {attempts} attempts and recovery: {last_error}")]
    RecoveryExhausted {
        step_number: u32,
        attempts: u32,
        last_error: String,
    },

    #[error("workflow '{workflow_id}' is still recording")]
    WorkflowNotReady { workflow_id: String },
}

impl serde::Serialize for ReplayError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type ReplayResult<T> = Result<T, ReplayError>;
