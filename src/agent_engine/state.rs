// Agent lifecycle states and the events that drive them.
use std::collections::HashMap;

use crate::matcher::MatchOutcome;

/// Lifecycle states of the workflow agent, published on every transition.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Matching { request: String },
    AwaitingConfirmation { outcome: MatchOutcome },
    Executing { workflow_id: String, parameters: HashMap<String, String> },
    Finished { workflow_id: Option<String>, success: bool, summary: String },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// Free-text request such as "open my DataVis class".
    Request(String),
    Confirm,
    Reject,
    Stop,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AgentOptions {
    /// Run the matched workflow without waiting for [`AgentEvent::Confirm`].
    pub auto_execute: bool,
    /// Capacity of the state broadcast channel.
    pub state_channel_capacity: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            auto_execute: true,
            state_channel_capacity: 64,
        }
    }
}
