// Workflow store with write-through persistence.
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::{ReplayError, ReplayResult};
use crate::workflow::backend::WorkflowBackend;
use crate::workflow::types::{
    Parameter, Step, StepAction, VisualContext, Workflow, WorkflowStatus, WorkflowSummary,
};

/// Search result with its relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub workflow: WorkflowSummary,
    pub relevance: f32,
}

/// Owner of every workflow. Mutations write through to the backend before returning.
pub struct WorkflowStore {
    workflows: HashMap<String, Workflow>,
    backend: Box<dyn WorkflowBackend>,
}

impl WorkflowStore {
    /// Opens the store and loads everything the backend holds.
    pub async fn open(backend: Box<dyn WorkflowBackend>) -> ReplayResult<Self> {
        let workflows = backend
            .load_all()
            .await?
            .into_iter()
            .map(|wf| (wf.id.clone(), wf))
            .collect();
        Ok(Self { workflows, backend })
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }

    pub async fn create(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        tags: BTreeSet<String>,
    ) -> ReplayResult<String> {
        let wf = Workflow::new(name, description, tags);
        let id = wf.id.clone();
        self.backend.save(&wf).await?;
        tracing::info!(id = %id, name = %wf.name, "workflow created");
        self.workflows.insert(id.clone(), wf);
        Ok(id)
    }

    /// Appends a step and returns its number.
    pub async fn add_step(
        &mut self,
        id: &str,
        action: StepAction,
        visual_context: Option<VisualContext>,
    ) -> ReplayResult<u32> {
        let mut wf = self.get(id)?.clone();
        if wf.status != WorkflowStatus::Recording {
            return Err(ReplayError::InvalidState(format!(
                "cannot add steps to ready workflow '{}'",
                wf.name
            )));
        }
        let step_number = wf.steps.len() as u32 + 1;
        let kind = action.kind();
        wf.steps.push(Step {
            step_number,
            action,
            visual_context,
        });
        self.commit(wf).await?;
        tracing::debug!(id = %id, step = step_number, action = kind, "step recorded");
        Ok(step_number)
    }

    pub async fn finalize(&mut self, id: &str, parameters: Vec<Parameter>) -> ReplayResult<()> {
        let mut wf = self.get(id)?.clone();
        if wf.status == WorkflowStatus::Ready {
            return Err(ReplayError::InvalidState(format!(
                "workflow '{}' is already ready",
                wf.name
            )));
        }

        let mut seen = HashSet::new();
        for p in &parameters {
            if !seen.insert(p.name.as_str()) {
                return Err(ReplayError::InvalidState(format!(
                    "duplicate parameter '{}'",
                    p.name
                )));
            }
            let step_count = wf.steps.len() as u32;
            if let Some(bad) = p.steps.iter().find(|&&s| s == 0 || s > step_count) {
                tracing::warn!(param = %p.name, step = bad, "parameter references a missing step");
            }
        }

        wf.parameters = parameters;
        wf.status = WorkflowStatus::Ready;
        let (steps, params) = (wf.steps.len(), wf.parameters.len());
        self.commit(wf).await?;
        tracing::info!(id = %id, steps, params, "workflow finalized");
        Ok(())
    }

    pub fn get(&self, id: &str) -> ReplayResult<&Workflow> {
        self.workflows
            .get(id)
            .ok_or_else(|| ReplayError::NotFound(id.to_string()))
    }

    /// Workflows newest first, optionally restricted to one status.
    pub fn list(&self, status: Option<WorkflowStatus>) -> Vec<&Workflow> {
        let mut out: Vec<&Workflow> = self
            .workflows
            .values()
            .filter(|wf| status.map_or(true, |s| wf.status == s))
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub async fn increment_usage(&mut self, id: &str) -> ReplayResult<u64> {
        let mut wf = self.get(id)?.clone();
        wf.use_count += 1;
        wf.last_used_at = Some(Utc::now());
        let count = wf.use_count;
        self.commit(wf).await?;
        Ok(count)
    }

    pub async fn delete(&mut self, id: &str) -> ReplayResult<Workflow> {
        self.get(id)?;
        self.backend.remove(id).await?;
        let wf = self
            .workflows
            .remove(id)
            .ok_or_else(|| ReplayError::NotFound(id.to_string()))?;
        tracing::info!(id = %id, name = %wf.name, "workflow deleted");
        Ok(wf)
    }

    /// Case-insensitive search over name, description and tags.
    /// A name hit scores 1.0, a description hit 0.8, a tag hit 0.6.
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .workflows
            .values()
            .filter_map(|wf| {
                let relevance = if wf.name.to_lowercase().contains(&q) {
                    1.0
                } else if wf.description.to_lowercase().contains(&q) {
                    0.8
                } else if wf.tags.iter().any(|t| t.to_lowercase().contains(&q)) {
                    0.6
                } else {
                    return None;
                };
                Some(SearchHit {
                    workflow: wf.summary(),
                    relevance,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.relevance
                .total_cmp(&a.relevance)
                .then_with(|| a.workflow.name.cmp(&b.workflow.name))
        });
        hits
    }

    pub async fn export(&self, id: &str, path: &Path) -> ReplayResult<()> {
        let wf = self.get(id)?;
        let body = serde_json::to_vec_pretty(wf)?;
        tokio::fs::write(path, body).await?;
        tracing::info!(id = %id, path = %path.display(), "workflow exported");
        Ok(())
    }

    /// Imports a workflow document under a fresh id.
    pub async fn import(&mut self, path: &Path) -> ReplayResult<String> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut wf: Workflow = serde_json::from_str(&content)
            .map_err(|e| ReplayError::Store(format!("invalid workflow document: {e}")))?;

        for (i, step) in wf.steps.iter().enumerate() {
            if step.step_number != i as u32 + 1 {
                return Err(ReplayError::Store(format!(
                    "step numbers are not contiguous at position {}",
                    i + 1
                )));
            }
        }

        let old_id = std::mem::replace(&mut wf.id, uuid::Uuid::new_v4().to_string());
        wf.use_count = 0;
        wf.last_used_at = None;
        wf.created_at = Utc::now();
        let id = wf.id.clone();
        self.backend.save(&wf).await?;
        tracing::info!(id = %id, from = %old_id, name = %wf.name, "workflow imported");
        self.workflows.insert(id.clone(), wf);
        Ok(id)
    }

    /// Saves `wf` and only then replaces the in-memory record.
    async fn commit(&mut self, wf: Workflow) -> ReplayResult<()> {
        self.backend.save(&wf).await?;
        self.workflows.insert(wf.id.clone(), wf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::NormalizedPoint;
    use crate::workflow::backend::{JsonDirBackend, MemoryBackend};
    use crate::workflow::types::{MouseButton, ParameterType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Memory backend whose writes can be switched off.
    struct FlakyBackend {
        inner: MemoryBackend,
        failing: Arc<AtomicBool>,
    }

    #[async_trait]
    impl WorkflowBackend for FlakyBackend {
        async fn load_all(&self) -> ReplayResult<Vec<Workflow>> {
            self.inner.load_all().await
        }

        async fn save(&self, workflow: &Workflow) -> ReplayResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ReplayError::Store("disk full".into()));
            }
            self.inner.save(workflow).await
        }

        async fn remove(&self, id: &str) -> ReplayResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ReplayError::Store("disk full".into()));
            }
            self.inner.remove(id).await
        }
    }

    /// Store over a [`FlakyBackend`] plus the switch that makes its writes fail.
    async fn flaky_store() -> (WorkflowStore, Arc<AtomicBool>) {
        let failing = Arc::new(AtomicBool::new(false));
        let backend = FlakyBackend {
            inner: MemoryBackend::new(),
            failing: failing.clone(),
        };
        (WorkflowStore::open(Box::new(backend)).await.unwrap(), failing)
    }

    fn tags(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn click() -> StepAction {
        StepAction::Click {
            x: 10,
            y: 20,
            normalized: NormalizedPoint::new(5, 10),
            button: MouseButton::Left,
        }
    }

    async fn memory_store() -> WorkflowStore {
        WorkflowStore::open(Box::new(MemoryBackend::new())).await.unwrap()
    }

    #[tokio::test]
    async fn steps_are_numbered_contiguously() {
        let mut store = memory_store().await;
        let id = store.create("Open Canvas Class", "", BTreeSet::new()).await.unwrap();
        assert_eq!(store.add_step(&id, click(), None).await.unwrap(), 1);
        assert_eq!(
            store
                .add_step(&id, StepAction::Type { text: "ML".into() }, None)
                .await
                .unwrap(),
            2
        );
        let numbers: Vec<u32> = store.get(&id).unwrap().steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[tokio::test]
    async fn ready_workflows_reject_steps_and_second_finalize() {
        let mut store = memory_store().await;
        let id = store.create("w", "", BTreeSet::new()).await.unwrap();
        store.add_step(&id, click(), None).await.unwrap();
        store.finalize(&id, vec![]).await.unwrap();

        assert!(matches!(
            store.add_step(&id, click(), None).await,
            Err(ReplayError::InvalidState(_))
        ));
        assert!(matches!(
            store.finalize(&id, vec![]).await,
            Err(ReplayError::InvalidState(_))
        ));
        assert_eq!(store.get(&id).unwrap().steps.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_parameter_names_are_rejected() {
        let mut store = memory_store().await;
        let id = store.create("w", "", BTreeSet::new()).await.unwrap();
        let err = store
            .finalize(&id, vec![Parameter::new("a", "1"), Parameter::new("a", "2")])
            .await;
        assert!(matches!(err, Err(ReplayError::InvalidState(_))));
        assert!(!store.get(&id).unwrap().is_ready());
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let mut store = memory_store().await;
        assert!(matches!(store.get("nope"), Err(ReplayError::NotFound(_))));
        assert!(matches!(
            store.increment_usage("nope").await,
            Err(ReplayError::NotFound(_))
        ));
        assert!(matches!(store.delete("nope").await, Err(ReplayError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_filters_by_status_newest_first() {
        let mut store = memory_store().await;
        let a = store.create("a", "", BTreeSet::new()).await.unwrap();
        let b = store.create("b", "", BTreeSet::new()).await.unwrap();
        store.workflows.get_mut(&a).unwrap().created_at = Utc::now() - chrono::Duration::hours(1);
        store.finalize(&b, vec![]).await.unwrap();

        let all: Vec<&str> = store.list(None).iter().map(|w| w.name.as_str()).collect();
        assert_eq!(all, vec!["b", "a"]);
        let ready = store.list(Some(WorkflowStatus::Ready));
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, b);
    }

    #[tokio::test]
    async fn usage_counter_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let mut store = WorkflowStore::open(Box::new(JsonDirBackend::new(dir.path())))
                .await
                .unwrap();
            let id = store.create("w", "", BTreeSet::new()).await.unwrap();
            store.increment_usage(&id).await.unwrap();
            assert_eq!(store.increment_usage(&id).await.unwrap(), 2);
            id
        };
        let store = WorkflowStore::open(Box::new(JsonDirBackend::new(dir.path())))
            .await
            .unwrap();
        let wf = store.get(&id).unwrap();
        assert_eq!(wf.use_count, 2);
        assert!(wf.last_used_at.is_some());
    }

    #[tokio::test]
    async fn search_ranks_name_over_description_over_tag() {
        let mut store = memory_store().await;
        store.create("Canvas login", "", BTreeSet::new()).await.unwrap();
        store
            .create("Open class", "opens a canvas course", BTreeSet::new())
            .await
            .unwrap();
        store.create("Grades", "", tags(&["canvas"])).await.unwrap();
        store.create("Unrelated", "", BTreeSet::new()).await.unwrap();

        let hits = store.search("Canvas");
        let scores: Vec<f32> = hits.iter().map(|h| h.relevance).collect();
        assert_eq!(scores, vec![1.0, 0.8, 0.6]);
        assert_eq!(hits[0].workflow.name, "Canvas login");
        assert!(store.search("  ").is_empty());
    }

    #[tokio::test]
    async fn export_import_assigns_fresh_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = memory_store().await;
        let id = store.create("w", "d", tags(&["x"])).await.unwrap();
        store.add_step(&id, click(), None).await.unwrap();
        let mut p = Parameter::new("count", "3");
        p.param_type = ParameterType::Number;
        store.finalize(&id, vec![p]).await.unwrap();
        store.increment_usage(&id).await.unwrap();

        let path = dir.path().join("w.json");
        store.export(&id, &path).await.unwrap();
        let new_id = store.import(&path).await.unwrap();

        assert_ne!(new_id, id);
        let imported = store.get(&new_id).unwrap();
        assert_eq!(imported.steps.len(), 1);
        assert_eq!(imported.parameters[0].param_type, ParameterType::Number);
        assert_eq!(imported.use_count, 0);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn delete_removes_from_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = WorkflowStore::open(Box::new(JsonDirBackend::new(dir.path())))
            .await
            .unwrap();
        let id = store.create("w", "", BTreeSet::new()).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(store.is_empty());
        assert!(!dir.path().join(format!("{id}.json")).exists());
    }

    #[tokio::test]
    async fn failed_save_leaves_memory_untouched() {
        let (mut store, failing) = flaky_store().await;
        let id = store.create("w", "", BTreeSet::new()).await.unwrap();
        store.add_step(&id, click(), None).await.unwrap();
        failing.store(true, Ordering::SeqCst);

        assert!(matches!(store.add_step(&id, click(), None).await, Err(ReplayError::Store(_))));
        assert!(matches!(
            store.finalize(&id, vec![Parameter::new("a", "1")]).await,
            Err(ReplayError::Store(_))
        ));
        assert!(store.increment_usage(&id).await.is_err());
        assert!(store.delete(&id).await.is_err());

        let wf = store.get(&id).unwrap();
        assert_eq!(wf.status, WorkflowStatus::Recording);
        assert_eq!(wf.steps.len(), 1);
        assert!(wf.parameters.is_empty());
        assert_eq!(wf.use_count, 0);

        // Once the backend recovers, the same finalize goes through.
        failing.store(false, Ordering::SeqCst);
        store.finalize(&id, vec![Parameter::new("a", "1")]).await.unwrap();
        assert!(store.get(&id).unwrap().is_ready());
    }
}
