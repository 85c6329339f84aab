pub mod agent_engine;
pub mod config;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod locator;
pub mod matcher;
pub mod perception;
pub mod workflow;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::agent_engine::{AgentEvent, AgentOptions, AgentState, WorkflowAgent};
use crate::config::AppConfig;
use crate::errors::ReplayResult;
use crate::llm::registry::ProviderRegistry;
use crate::workflow::{JsonDirBackend, WorkflowStore};

pub use crate::errors::{ExecutionError, ReplayError};

/// Installs the global `tracing` subscriber. `RUST_LOG` wins; otherwise `info`.
/// Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

/// Handle to a running agent loop.
pub struct AgentHandle {
    pub tx: mpsc::Sender<AgentEvent>,
    pub store: Arc<Mutex<WorkflowStore>>,
    states: broadcast::Sender<AgentState>,
}

impl AgentHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<AgentState> {
        self.states.subscribe()
    }

    pub async fn request(&self, text: impl Into<String>) -> ReplayResult<()> {
        self.tx
            .send(AgentEvent::Request(text.into()))
            .await
            .map_err(|_| ReplayError::Cancelled)
    }
}

/// Loads `.env`, opens the workflow store under the configured data directory,
/// builds the provider registry and spawns the agent loop.
pub async fn start(config: AppConfig, options: AgentOptions) -> ReplayResult<AgentHandle> {
    let _ = dotenvy::dotenv();

    let data_dir = config.store.resolve_data_dir();
    tracing::info!(dir = %data_dir.display(), "opening workflow store");
    let store = WorkflowStore::open(Box::new(JsonDirBackend::new(data_dir))).await?;
    let store = Arc::new(Mutex::new(store));

    let registry = ProviderRegistry::from_config(&config.llm);
    let mut agent = WorkflowAgent::from_config(&config, store.clone(), &registry, options)?;

    let (tx, rx) = mpsc::channel::<AgentEvent>(32);
    let states = agent.state_sender();

    tracing::info!("spawning agent loop");
    tokio::spawn(async move {
        agent.run_loop(rx).await;
        tracing::info!("agent task exited");
    });

    Ok(AgentHandle {
        tx,
        store,
        states,
    })
}
