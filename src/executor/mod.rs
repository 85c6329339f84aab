pub mod engine;
pub mod input;
pub mod retry;
pub mod safety;
pub mod state;

pub use engine::{ExecutionResult, ExecutionStatus, RobustExecutor, RunReport, RunSummary};
pub use input::{EnigoInjector, InputInjector};
pub use safety::AbortSignal;
