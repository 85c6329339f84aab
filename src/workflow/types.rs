// Workflow, step and parameter records.
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::perception::types::NormalizedPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Recording,
    Ready,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub use_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, description: impl Into<String>, tags: BTreeSet<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            tags,
            status: WorkflowStatus::Recording,
            steps: Vec::new(),
            parameters: Vec::new(),
            use_count: 0,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == WorkflowStatus::Ready
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            tags: self.tags.iter().cloned().collect(),
            status: self.status,
            steps_count: self.steps.len(),
            parameters: self.parameters.clone(),
            use_count: self.use_count,
        }
    }
}

/// Flat listing record, the shape other tools read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub status: WorkflowStatus,
    pub steps_count: usize,
    pub parameters: Vec<Parameter>,
    pub use_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// 1-based, equal to the step's position in `Workflow::steps`.
    pub step_number: u32,
    pub action: StepAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_context: Option<VisualContext>,
}

impl Step {
    /// Label of the element this step interacts with, if one was recorded.
    pub fn target_label(&self) -> Option<&str> {
        self.visual_context
            .as_ref()
            .and_then(|ctx| ctx.element_text.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action_type", content = "action_data", rename_all = "snake_case")]
pub enum StepAction {
    Click {
        x: i32,
        y: i32,
        /// Resolution-independent position on the 0–1000 grid.
        normalized: NormalizedPoint,
        #[serde(default)]
        button: MouseButton,
    },
    Type {
        text: String,
    },
    Scroll {
        direction: ScrollDirection,
        #[serde(default = "default_scroll_amount")]
        amount: i32,
    },
    KeyPress {
        key: String,
    },
}

fn default_scroll_amount() -> i32 {
    3
}

impl StepAction {
    pub fn kind(&self) -> &'static str {
        match self {
            StepAction::Click { .. } => "click",
            StepAction::Type { .. } => "type",
            StepAction::Scroll { .. } => "scroll",
            StepAction::KeyPress { .. } => "key_press",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualContext {
    /// Text label of the element that was interacted with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nearby_labels: Vec<String>,
    /// Hex-encoded average hash of the screen before the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    #[default]
    String,
    Number,
    Url,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: ParameterType,
    #[serde(default)]
    pub example_value: String,
    #[serde(default)]
    pub description: String,
    /// Step numbers this parameter applies to. Empty means every step.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<u32>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, example_value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::String,
            example_value: example_value.into(),
            description: String::new(),
            steps: Vec::new(),
        }
    }

    pub fn applies_to(&self, step_number: u32) -> bool {
        self.steps.is_empty() || self.steps.contains(&step_number)
    }
}
