pub mod backend;
pub mod params;
pub mod recorder;
pub mod store;
pub mod types;

pub use backend::{JsonDirBackend, MemoryBackend, WorkflowBackend};
pub use store::WorkflowStore;
pub use types::{Parameter, ParameterType, Step, StepAction, VisualContext, Workflow, WorkflowStatus};
