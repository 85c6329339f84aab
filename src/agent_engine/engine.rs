// Workflow agent: request matching, confirmation and replay.
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};

use crate::agent_engine::state::{AgentEvent, AgentOptions, AgentState};
use crate::config::AppConfig;
use crate::errors::{ReplayError, ReplayResult};
use crate::executor::{AbortSignal, EnigoInjector, RobustExecutor, RunReport};
use crate::llm::registry::ProviderRegistry;
use crate::locator::MultiStrategyLocator;
use crate::matcher::embedder::{Embedder, LlmEmbedder};
use crate::matcher::{MatchOutcome, RankedCandidate, SemanticMatcher};
use crate::perception::marker_resolver::VisionMarkerResolver;
use crate::perception::screenshot::PrimaryMonitorCapture;
use crate::perception::traits::MarkerResolver;
use crate::perception::vlm_ocr::VlmTextDetector;
use crate::workflow::store::WorkflowStore;
use crate::workflow::types::{Workflow, WorkflowStatus};

/// Minimum score for a workflow to be listed by [`WorkflowAgent::candidates`].
const CANDIDATE_MIN_SCORE: f32 = 0.3;

/// Request → matcher → executor → usage counter.
pub struct WorkflowAgent {
    state: AgentState,
    state_tx: broadcast::Sender<AgentState>,
    store: Arc<Mutex<WorkflowStore>>,
    matcher: SemanticMatcher,
    executor: RobustExecutor,
    options: AgentOptions,
}

impl WorkflowAgent {
    pub fn new(
        store: Arc<Mutex<WorkflowStore>>,
        matcher: SemanticMatcher,
        executor: RobustExecutor,
        options: AgentOptions,
    ) -> Self {
        let (state_tx, _) = broadcast::channel(options.state_channel_capacity.max(1));
        Self {
            state: AgentState::Idle,
            state_tx,
            store,
            matcher,
            executor,
            options,
        }
    }

    /// Wires the desktop adapters: primary-monitor capture, enigo input, and
    /// the registry's vision / OCR / embedding roles. Vision grounding and
    /// embeddings are optional; OCR is not.
    pub fn from_config(
        config: &AppConfig,
        store: Arc<Mutex<WorkflowStore>>,
        registry: &ProviderRegistry,
        options: AgentOptions,
    ) -> ReplayResult<Self> {
        let ocr = Arc::new(VlmTextDetector::from_registry(registry)?);
        let resolver: Option<Arc<dyn MarkerResolver>> = match VisionMarkerResolver::from_registry(registry) {
            Ok(r) => Some(Arc::new(r)),
            Err(e) => {
                tracing::warn!(error = %e, "vision grounding disabled");
                None
            }
        };
        let embedder: Option<Arc<dyn Embedder>> = match LlmEmbedder::from_registry(registry) {
            Ok(e) => Some(Arc::new(e)),
            Err(e) => {
                tracing::warn!(error = %e, "embeddings disabled");
                None
            }
        };

        let locator = MultiStrategyLocator::new(ocr, resolver, &config.locator);
        let executor = RobustExecutor::new(
            Arc::new(PrimaryMonitorCapture::new()),
            Arc::new(EnigoInjector::new()),
            locator,
            config.locator.relaxed,
            config.executor.clone(),
        );
        let matcher = SemanticMatcher::new(&config.matcher, embedder);
        Ok(Self::new(store, matcher, executor, options))
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    /// Receives every state the agent enters from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn state_sender(&self) -> broadcast::Sender<AgentState> {
        self.state_tx.clone()
    }

    pub fn abort_signal(&self) -> AbortSignal {
        self.executor.abort_signal()
    }

    async fn ready_workflows(&self) -> Vec<Workflow> {
        let store = self.store.lock().await;
        store
            .list(Some(WorkflowStatus::Ready))
            .into_iter()
            .cloned()
            .collect()
    }

    /// Best ready workflow for `request` with its extracted parameters.
    pub async fn match_request(&self, request: &str) -> MatchOutcome {
        let workflows = self.ready_workflows().await;
        self.matcher
            .find_best_match(request, &workflows, self.matcher.threshold())
            .await
    }

    /// Ranked ready workflows for `request`, for callers that let the user pick.
    pub async fn candidates(&self, request: &str, top_k: usize) -> Vec<RankedCandidate> {
        let workflows = self.ready_workflows().await;
        self.matcher
            .rank(request, &workflows, top_k, CANDIDATE_MIN_SCORE)
            .await
    }

    /// Runs a stored workflow. The usage counter moves only on success.
    pub async fn run_workflow(
        &mut self,
        workflow_id: &str,
        parameters: &HashMap<String, String>,
    ) -> ReplayResult<RunReport> {
        // Clone out so the store stays unlocked for the length of the run.
        let workflow = self.store.lock().await.get(workflow_id)?.clone();
        let report = self.executor.execute(&workflow, parameters).await?;

        if report.success {
            let uses = self.store.lock().await.increment_usage(workflow_id).await?;
            tracing::info!(workflow = %workflow.name, uses, "workflow replayed");
        } else {
            tracing::warn!(workflow = %workflow.name, summary = ?report.summary(), "workflow replay failed");
        }
        Ok(report)
    }

    /// Matches and runs in one call, skipping confirmation.
    pub async fn handle_request(&mut self, request: &str) -> ReplayResult<RunReport> {
        let outcome = self.match_request(request).await;
        let Some(workflow) = outcome.workflow else {
            return Err(ReplayError::Matcher(format!("no workflow matches '{request}'")));
        };
        self.run_workflow(&workflow.id, &outcome.parameters).await
    }

    fn set_state(&mut self, state: AgentState) {
        self.state = state;
        // No subscribers is fine.
        let _ = self.state_tx.send(self.state.clone());
    }

    /// Drives the agent from `events` until `Stop` arrives or the channel closes.
    pub async fn run_loop(&mut self, mut events: mpsc::Receiver<AgentEvent>) {
        self.set_state(AgentState::Idle);
        loop {
            match self.state.clone() {
                AgentState::Idle => match events.recv().await {
                    Some(AgentEvent::Request(request)) => {
                        tracing::info!(request = %request, "request received → Matching");
                        self.set_state(AgentState::Matching { request });
                    }
                    Some(AgentEvent::Stop) | None => break,
                    Some(other) => tracing::debug!(event = ?other, "ignored while idle"),
                },

                AgentState::Matching { request } => {
                    let outcome = self.match_request(&request).await;
                    let matched_id = outcome.workflow.as_ref().map(|w| w.id.clone());
                    let next = match matched_id {
                        None => AgentState::Finished {
                            workflow_id: None,
                            success: false,
                            summary: format!("no workflow matches '{request}'"),
                        },
                        Some(workflow_id) if self.options.auto_execute => AgentState::Executing {
                            workflow_id,
                            parameters: outcome.parameters,
                        },
                        Some(_) => AgentState::AwaitingConfirmation { outcome },
                    };
                    self.set_state(next);
                }

                AgentState::AwaitingConfirmation { outcome } => match events.recv().await {
                    Some(AgentEvent::Confirm) => {
                        if let Some(wf) = outcome.workflow {
                            self.set_state(AgentState::Executing {
                                workflow_id: wf.id,
                                parameters: outcome.parameters,
                            });
                        } else {
                            self.set_state(AgentState::Idle);
                        }
                    }
                    Some(AgentEvent::Reject) => {
                        tracing::info!("run rejected by user");
                        self.set_state(AgentState::Finished {
                            workflow_id: outcome.workflow.map(|w| w.id),
                            success: false,
                            summary: "cancelled".into(),
                        });
                    }
                    Some(AgentEvent::Stop) | None => break,
                    Some(AgentEvent::Request(r)) => {
                        tracing::warn!(request = %r, "request ignored while awaiting confirmation");
                    }
                },

                AgentState::Executing { workflow_id, parameters } => {
                    let next = match self.run_workflow(&workflow_id, &parameters).await {
                        Ok(report) => {
                            let s = report.summary();
                            AgentState::Finished {
                                workflow_id: Some(workflow_id),
                                success: report.success,
                                summary: format!(
                                    "{} succeeded, {} failed, {} skipped",
                                    s.succeeded, s.failed, s.skipped
                                ),
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "run failed");
                            AgentState::Error { message: e.to_string() }
                        }
                    };
                    self.set_state(next);
                }

                AgentState::Finished { .. } | AgentState::Error { .. } => {
                    self.set_state(AgentState::Idle);
                }
            }

            tokio::task::yield_now().await;
        }
        tracing::info!("agent loop ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutorConfig, LocatorConfig, LocatorThresholds, MatcherConfig};
    use crate::perception::traits::TextDetector;
    use crate::perception::types::{NormalizedPoint, TextDetection};
    use crate::test_support::{Injected, MockInjector, MockOcr, MockScreens};
    use crate::workflow::backend::MemoryBackend;
    use crate::workflow::types::{MouseButton, Parameter, StepAction, VisualContext};
    use std::collections::BTreeSet;

    async fn store_with_canvas() -> (Arc<Mutex<WorkflowStore>>, String) {
        let mut store = WorkflowStore::open(Box::new(MemoryBackend::new())).await.unwrap();
        let id = store
            .create("Open Canvas Class", "open a class page on canvas", BTreeSet::new())
            .await
            .unwrap();
        store
            .add_step(
                &id,
                StepAction::Click {
                    x: 500,
                    y: 400,
                    normalized: NormalizedPoint::new(500, 500),
                    button: MouseButton::Left,
                },
                Some(VisualContext {
                    element_text: Some("Machine Learning".into()),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();
        store
            .finalize(&id, vec![Parameter::new("class_name", "Machine Learning")])
            .await
            .unwrap();
        (Arc::new(Mutex::new(store)), id)
    }

    fn agent(
        store: Arc<Mutex<WorkflowStore>>,
        detections: Vec<TextDetection>,
        input: Arc<MockInjector>,
        options: AgentOptions,
    ) -> WorkflowAgent {
        let ocr: Arc<dyn TextDetector> = Arc::new(MockOcr::new(detections));
        let locator = MultiStrategyLocator::new(ocr, None, &LocatorConfig::default());
        let executor = RobustExecutor::new(
            Arc::new(MockScreens::constant(1000, 800)),
            input,
            locator,
            LocatorThresholds::relaxed(),
            ExecutorConfig {
                position_fallback: false,
                ..ExecutorConfig::immediate()
            },
        );
        let matcher = SemanticMatcher::new(
            &MatcherConfig {
                threshold: 0.4,
                use_embeddings: false,
            },
            None,
        );
        WorkflowAgent::new(store, matcher, executor, options)
    }

    #[tokio::test]
    async fn request_runs_workflow_with_extracted_parameter() {
        let (store, id) = store_with_canvas().await;
        let input = Arc::new(MockInjector::new());
        let mut agent = agent(
            store.clone(),
            vec![TextDetection::new("DataVis", 0.97, (300, 200))],
            input.clone(),
            AgentOptions::default(),
        );

        let report = agent.handle_request("open canvas class for DataVis").await.unwrap();
        assert!(report.success);
        assert_eq!(input.log(), vec![Injected::Click(300, 200)]);
        assert_eq!(store.lock().await.get(&id).unwrap().use_count, 1);
    }

    #[tokio::test]
    async fn failed_run_leaves_usage_untouched() {
        let (store, id) = store_with_canvas().await;
        let input = Arc::new(MockInjector::new());
        let mut agent = agent(store.clone(), vec![], input.clone(), AgentOptions::default());

        let report = agent.run_workflow(&id, &HashMap::new()).await.unwrap();
        assert!(!report.success);
        assert!(report.failure.is_some());
        assert!(!input.log().iter().any(|i| matches!(i, Injected::Click(..))));
        let wf = store.lock().await.get(&id).unwrap().clone();
        assert_eq!(wf.use_count, 0);
        assert!(wf.last_used_at.is_none());
    }

    #[tokio::test]
    async fn unmatched_request_is_an_error() {
        let (store, _) = store_with_canvas().await;
        let mut agent = agent(store, vec![], Arc::new(MockInjector::new()), AgentOptions::default());
        let err = agent.handle_request("play some jazz").await.unwrap_err();
        assert!(matches!(err, ReplayError::Matcher(_)));
        assert!(agent.candidates("play some jazz", 3).await.is_empty());
    }

    #[tokio::test]
    async fn loop_waits_for_confirmation_before_running() {
        let (store, id) = store_with_canvas().await;
        let input = Arc::new(MockInjector::new());
        let mut agent = agent(
            store.clone(),
            vec![TextDetection::new("DataVis", 0.97, (300, 200))],
            input.clone(),
            AgentOptions {
                auto_execute: false,
                ..Default::default()
            },
        );
        let mut states = agent.subscribe();

        let (tx, rx) = mpsc::channel(8);
        tx.send(AgentEvent::Request("open canvas class for DataVis".into())).await.unwrap();
        tx.send(AgentEvent::Confirm).await.unwrap();
        tx.send(AgentEvent::Request("open canvas class".into())).await.unwrap();
        tx.send(AgentEvent::Reject).await.unwrap();
        tx.send(AgentEvent::Stop).await.unwrap();
        agent.run_loop(rx).await;

        let mut seen = Vec::new();
        while let Ok(s) = states.try_recv() {
            seen.push(s);
        }
        assert!(seen.iter().any(|s| matches!(s, AgentState::AwaitingConfirmation { .. })));
        assert!(seen.contains(&AgentState::Finished {
            workflow_id: Some(id.clone()),
            success: true,
            summary: "1 succeeded, 0 failed, 0 skipped".into(),
        }));
        assert!(seen.contains(&AgentState::Finished {
            workflow_id: Some(id.clone()),
            success: false,
            summary: "cancelled".into(),
        }));
        assert_eq!(input.log().len(), 1);
        assert_eq!(store.lock().await.get(&id).unwrap().use_count, 1);
    }
}
