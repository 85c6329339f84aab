// Robust executor: retries, recovery and per-step reporting.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ExecutorConfig, LocatorThresholds};
use crate::errors::{ExecutionError, ReplayError, ReplayResult};
use crate::executor::input::InputInjector;
use crate::executor::retry::RetryPolicy;
use crate::executor::safety::{in_failsafe_corner, AbortSignal};
use crate::executor::state::{StepEvent, StepState};
use crate::locator::{LocateStrategy, MultiStrategyLocator};
use crate::perception::stability::ChangeDetector;
use crate::perception::traits::ScreenshotProvider;
use crate::perception::types::{NormalizedPoint, Screenshot};
use crate::workflow::params::{resolve_step, ResolvedStep};
use crate::workflow::types::{ScrollDirection, Step, StepAction, Workflow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failed,
    /// A failed attempt that was followed by another one.
    Retrying,
    /// Not attempted because the run stopped earlier.
    Skipped,
}

/// Outcome of one step, or of one attempt in [`RunReport::log`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub step_number: u32,
    pub status: ExecutionStatus,
    pub attempts: u32,
    pub confidence: Option<f32>,
    pub location: Option<(i32, i32)>,
    pub strategy: Option<LocateStrategy>,
    pub error: Option<String>,
    /// Whether the screen hash moved after a click. `None` when not checked.
    pub ui_changed: Option<bool>,
}

impl ExecutionResult {
    fn skipped(step_number: u32) -> Self {
        Self {
            step_number,
            status: ExecutionStatus::Skipped,
            attempts: 0,
            confidence: None,
            location: None,
            strategy: None,
            error: None,
            ui_changed: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub workflow_id: String,
    pub success: bool,
    /// One entry per step in workflow order.
    pub results: Vec<ExecutionResult>,
    /// Every attempt, including the failed ones that were retried.
    pub log: Vec<ExecutionResult>,
    pub failure: Option<ExecutionError>,
    pub aborted: bool,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        let mut s = RunSummary::default();
        for r in &self.results {
            match r.status {
                ExecutionStatus::Success => s.succeeded += 1,
                ExecutionStatus::Failed => s.failed += 1,
                ExecutionStatus::Skipped | ExecutionStatus::Retrying => s.skipped += 1,
            }
        }
        s
    }
}

/// What a successful attempt produced.
#[derive(Debug, Clone, Default)]
struct AttemptOutcome {
    confidence: Option<f32>,
    location: Option<(i32, i32)>,
    strategy: Option<LocateStrategy>,
    ui_changed: Option<bool>,
}

/// Replays a workflow step by step: locate, act, verify, retry, recover.
pub struct RobustExecutor {
    screens: Arc<dyn ScreenshotProvider>,
    input: Arc<dyn InputInjector>,
    locator: MultiStrategyLocator,
    relaxed: LocatorThresholds,
    config: ExecutorConfig,
    retry: RetryPolicy,
    change: ChangeDetector,
    abort: AbortSignal,
    last_screen: Option<(u32, u32)>,
}

impl RobustExecutor {
    pub fn new(
        screens: Arc<dyn ScreenshotProvider>,
        input: Arc<dyn InputInjector>,
        locator: MultiStrategyLocator,
        relaxed: LocatorThresholds,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            retry: RetryPolicy::from_config(&config),
            change: ChangeDetector::new(config.change_threshold),
            screens,
            input,
            locator,
            relaxed,
            config,
            abort: AbortSignal::new(),
            last_screen: None,
        }
    }

    /// Handle that stops the current or next run between steps.
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    pub fn locator(&self) -> &MultiStrategyLocator {
        &self.locator
    }

    pub async fn execute(
        &mut self,
        workflow: &Workflow,
        parameters: &HashMap<String, String>,
    ) -> ReplayResult<RunReport> {
        if !workflow.is_ready() {
            return Err(ReplayError::Execution(ExecutionError::WorkflowNotReady {
                workflow_id: workflow.id.clone(),
            }));
        }

        tracing::info!(
            workflow = %workflow.name,
            id = %workflow.id,
            steps = workflow.steps.len(),
            params = parameters.len(),
            "run started"
        );

        let mut report = RunReport {
            workflow_id: workflow.id.clone(),
            success: false,
            results: Vec::with_capacity(workflow.steps.len()),
            log: Vec::new(),
            failure: None,
            aborted: false,
        };

        for (i, step) in workflow.steps.iter().enumerate() {
            if self.should_abort().await {
                tracing::warn!(step = step.step_number, "run aborted");
                report.aborted = true;
                break;
            }
            if i > 0 {
                sleep_ms(self.config.inter_step_delay_ms).await;
            }

            let resolved = resolve_step(step, &workflow.parameters, parameters);
            let (result, failure) = self.run_step(step, &resolved, &mut report.log).await;
            report.results.push(result);
            if let Some(err) = failure {
                tracing::error!(step = step.step_number, error = %err, "run stopped");
                report.failure = Some(err);
                break;
            }
        }

        for step in workflow.steps.iter().skip(report.results.len()) {
            report.results.push(ExecutionResult::skipped(step.step_number));
        }
        report.success = !report.aborted
            && report.failure.is_none()
            && report
                .results
                .iter()
                .all(|r| r.status == ExecutionStatus::Success);

        let summary = report.summary();
        tracing::info!(
            workflow = %workflow.name,
            success = report.success,
            aborted = report.aborted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "run finished"
        );
        Ok(report)
    }

    async fn should_abort(&self) -> bool {
        if self.abort.is_aborted() {
            return true;
        }
        match self.input.pointer_position().await {
            Ok(Some(pos)) if in_failsafe_corner(pos, self.last_screen, self.config.failsafe_corner_px) => {
                tracing::warn!(x = pos.0, y = pos.1, "pointer in failsafe corner");
                self.abort.abort();
                true
            }
            Ok(_) => false,
            Err(e) => {
                tracing::debug!(error = %e, "pointer position unavailable");
                false
            }
        }
    }

    /// Drives one step through the retry state machine.
    async fn run_step(
        &mut self,
        step: &Step,
        resolved: &ResolvedStep,
        log: &mut Vec<ExecutionResult>,
    ) -> (ExecutionResult, Option<ExecutionError>) {
        let max = self.retry.max_retries;
        let mut state = StepState::Pending.transition(StepEvent::Start, max);
        let mut last_error = String::new();
        let mut succeeded = AttemptOutcome::default();

        loop {
            match state {
                StepState::Pending => {
                    state = state.transition(StepEvent::Start, max);
                }
                StepState::Attempting { attempt, recovery } => {
                    let saved = if recovery {
                        Some(self.enter_recovery(step.step_number).await)
                    } else {
                        None
                    };
                    let outcome = self.attempt(step, resolved).await;
                    if let Some(previous) = saved {
                        self.locator.set_thresholds(previous);
                    }

                    match outcome {
                        Ok(o) => {
                            succeeded = o;
                            state = state.transition(StepEvent::Succeeded, max);
                        }
                        Err(e) => {
                            tracing::warn!(step = step.step_number, attempt, recovery, error = %e, "attempt failed");
                            last_error = e.to_string();
                            state = state.transition(StepEvent::Missed, max);
                            let status = if state.is_terminal() {
                                ExecutionStatus::Failed
                            } else {
                                ExecutionStatus::Retrying
                            };
                            log.push(ExecutionResult {
                                step_number: step.step_number,
                                status,
                                attempts: attempt,
                                confidence: None,
                                location: None,
                                strategy: None,
                                error: Some(last_error.clone()),
                                ui_changed: None,
                            });
                        }
                    }
                }
                StepState::Retrying { attempt } => {
                    if let Some(delay) = self.retry.delay_after(attempt) {
                        tracing::debug!(step = step.step_number, attempt, delay_ms = delay.as_millis() as u64, "backing off");
                        tokio::time::sleep(delay).await;
                    }
                    state = state.transition(StepEvent::Start, max);
                }
                StepState::Recovering { .. } => {
                    state = state.transition(StepEvent::Start, max);
                }
                StepState::Success { attempts } => {
                    tracing::info!(
                        step = step.step_number,
                        action = step.action.kind(),
                        attempts,
                        "step succeeded"
                    );
                    let result = ExecutionResult {
                        step_number: step.step_number,
                        status: ExecutionStatus::Success,
                        attempts,
                        confidence: succeeded.confidence,
                        location: succeeded.location,
                        strategy: succeeded.strategy,
                        error: None,
                        ui_changed: succeeded.ui_changed,
                    };
                    log.push(result.clone());
                    return (result, None);
                }
                StepState::Failed { attempts } => {
                    let err = ExecutionError::RecoveryExhausted {
                        step_number: step.step_number,
                        attempts,
                        last_error: last_error.clone(),
                    };
                    let result = ExecutionResult {
                        step_number: step.step_number,
                        status: ExecutionStatus::Failed,
                        attempts,
                        confidence: None,
                        location: None,
                        strategy: None,
                        error: Some(err.to_string()),
                        ui_changed: None,
                    };
                    return (result, Some(err));
                }
            }
        }
    }

    /// Prepares the single recovery attempt and returns the thresholds to restore.
    async fn enter_recovery(&mut self, step_number: u32) -> LocatorThresholds {
        tracing::info!(step = step_number, "entering recovery");
        sleep_ms(self.config.recovery_wait_ms).await;
        if let Err(e) = self
            .input
            .scroll(ScrollDirection::Down, self.config.recovery_scroll_amount)
            .await
        {
            tracing::warn!(error = %e, "recovery scroll failed");
        }
        sleep_ms(self.config.ui_settle_ms).await;
        self.locator.set_thresholds(self.relaxed)
    }

    async fn attempt(&mut self, step: &Step, resolved: &ResolvedStep) -> Result<AttemptOutcome, ExecutionError> {
        match &step.action {
            StepAction::Click { normalized, .. } => {
                let target = resolved.target.clone().unwrap_or_default();
                let fallback = self.config.position_fallback.then_some(*normalized);
                let (before, mut outcome) = self.locate(&target, fallback).await?;
                let (x, y) = outcome.location.unwrap_or_default();
                self.input
                    .click(x, y)
                    .await
                    .map_err(|e| ExecutionError::ActionInjectionFailed(e.to_string()))?;
                sleep_ms(self.config.ui_settle_ms).await;
                outcome.ui_changed = self.verify_change(step.step_number, &before).await;
                Ok(outcome)
            }
            StepAction::Type { text } => {
                let mut outcome = AttemptOutcome::default();
                if let Some(target) = resolved.target.clone() {
                    let (_, located) = self.locate(&target, None).await?;
                    let (x, y) = located.location.unwrap_or_default();
                    self.input
                        .click(x, y)
                        .await
                        .map_err(|e| ExecutionError::ActionInjectionFailed(e.to_string()))?;
                    outcome = located;
                }
                let text = resolved.text.as_deref().unwrap_or(text);
                self.input
                    .type_text(text)
                    .await
                    .map_err(|e| ExecutionError::ActionInjectionFailed(e.to_string()))?;
                sleep_ms(self.config.ui_settle_ms).await;
                Ok(outcome)
            }
            StepAction::Scroll { direction, amount } => {
                self.input
                    .scroll(*direction, *amount)
                    .await
                    .map_err(|e| ExecutionError::ActionInjectionFailed(e.to_string()))?;
                sleep_ms(self.config.ui_settle_ms).await;
                Ok(AttemptOutcome::default())
            }
            StepAction::KeyPress { key } => {
                self.input
                    .key_press(key)
                    .await
                    .map_err(|e| ExecutionError::ActionInjectionFailed(e.to_string()))?;
                sleep_ms(self.config.ui_settle_ms).await;
                Ok(AttemptOutcome::default())
            }
        }
    }

    /// Captures a frame and locates `target` on it, enforcing the strategy's bar.
    async fn locate(
        &mut self,
        target: &str,
        fallback: Option<NormalizedPoint>,
    ) -> Result<(Screenshot, AttemptOutcome), ExecutionError> {
        let not_found = || ExecutionError::ElementNotFound {
            target: target.to_string(),
        };

        let shot = match self.screens.capture().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "screenshot failed");
                return Err(not_found());
            }
        };
        self.last_screen = Some(shot.size());

        let found = match self.locator.locate(&shot, target, fallback).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "locator failed");
                None
            }
        };
        let m = found.ok_or_else(not_found)?;

        let threshold = self.locator.threshold_for(m.strategy);
        if m.confidence < threshold {
            return Err(ExecutionError::LowConfidenceMatch {
                target: target.to_string(),
                confidence: m.confidence,
                threshold,
            });
        }

        Ok((
            shot,
            AttemptOutcome {
                confidence: Some(m.confidence),
                location: Some(m.center),
                strategy: Some(m.strategy),
                ui_changed: None,
            },
        ))
    }

    /// Compares the pre-action frame with a fresh one. Never fails the step.
    async fn verify_change(&self, step_number: u32, before: &Screenshot) -> Option<bool> {
        let after = match self.screens.capture().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "post-action screenshot failed");
                return None;
            }
        };
        match self.change.frames_differ(&before.image_bytes, &after.image_bytes) {
            Ok(changed) => {
                if !changed {
                    tracing::warn!("{}", ExecutionError::UiUnchanged { step_number });
                }
                Some(changed)
            }
            Err(e) => {
                tracing::warn!(error = %e, "screen change check failed");
                None
            }
        }
    }
}

async fn sleep_ms(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
