pub mod engine;
pub mod state;

pub use engine::WorkflowAgent;
pub use state::{AgentEvent, AgentOptions, AgentState};
