// Workflow persistence backends.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::errors::{ReplayError, ReplayResult};
use crate::workflow::types::Workflow;

/// Where workflows live between runs. The store writes through on every mutation.
#[async_trait]
pub trait WorkflowBackend: Send + Sync {
    async fn load_all(&self) -> ReplayResult<Vec<Workflow>>;
    async fn save(&self, workflow: &Workflow) -> ReplayResult<()>;
    async fn remove(&self, id: &str) -> ReplayResult<()>;
}

/// One pretty-printed `<id>.json` file per workflow.
pub struct JsonDirBackend {
    dir: PathBuf,
}

impl JsonDirBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl WorkflowBackend for JsonDirBackend {
    async fn load_all(&self) -> ReplayResult<Vec<Workflow>> {
        if !self.dir.exists() {
            tracing::warn!(dir = %self.dir.display(), "workflow directory does not exist yet");
            return Ok(Vec::new());
        }

        let mut workflows = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    if path.extension().map_or(false, |ext| ext == "json") {
                        match read_workflow(&path).await {
                            Ok(wf) => workflows.push(wf),
                            Err(e) => tracing::warn!("Failed to load workflow file {:?}: {}", path, e),
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            }
        }

        tracing::info!(count = workflows.len(), dir = %self.dir.display(), "workflows loaded");
        Ok(workflows)
    }

    async fn save(&self, workflow: &Workflow) -> ReplayResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.path_for(&workflow.id);
        let tmp = self.dir.join(format!(".{}.json.tmp", workflow.id));
        let body = serde_json::to_vec_pretty(workflow)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &target).await?;
        tracing::debug!(id = %workflow.id, path = %target.display(), "workflow persisted");
        Ok(())
    }

    async fn remove(&self, id: &str) -> ReplayResult<()> {
        let path = self.path_for(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn read_workflow(path: &Path) -> ReplayResult<Workflow> {
    let content = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&content)
        .map_err(|e| ReplayError::Store(format!("{}: {}", path.display(), e)))
}

/// Non-durable backend for tests and dry runs.
#[derive(Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, Workflow>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl WorkflowBackend for MemoryBackend {
    async fn load_all(&self) -> ReplayResult<Vec<Workflow>> {
        Ok(self.records.lock().await.values().cloned().collect())
    }

    async fn save(&self, workflow: &Workflow) -> ReplayResult<()> {
        self.records
            .lock()
            .await
            .insert(workflow.id.clone(), workflow.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> ReplayResult<()> {
        self.records.lock().await.remove(id);
        Ok(())
    }
}
