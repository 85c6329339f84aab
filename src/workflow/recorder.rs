// Recorder: one task turns input events into workflow steps.
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::RecorderConfig;
use crate::errors::{ReplayError, ReplayResult};
use crate::perception::coords::{normalize, region_name};
use crate::perception::stability::PerceptualHash;
use crate::perception::traits::{ScreenshotProvider, TextDetector};
use crate::perception::types::{Screenshot, TextDetection};
use crate::workflow::store::WorkflowStore;
use crate::workflow::types::{MouseButton, Parameter, ScrollDirection, StepAction, VisualContext};

const NEARBY_DX: i32 = 200;
const NEARBY_DY: i32 = 100;

#[derive(Debug, Clone)]
pub enum InputEvent {
    Click { x: i32, y: i32, button: MouseButton, at: Instant },
    /// Wheel deltas as reported by the OS: positive `dy` is up.
    Scroll { x: i32, y: i32, dx: i32, dy: i32, at: Instant },
    Key { key: String, at: Instant },
    /// A run of typed characters, already buffered by the listener.
    Text { text: String, at: Instant },
}

impl InputEvent {
    pub fn at(&self) -> Instant {
        match self {
            InputEvent::Click { at, .. }
            | InputEvent::Scroll { at, .. }
            | InputEvent::Key { at, .. }
            | InputEvent::Text { at, .. } => *at,
        }
    }
}

/// Listeners push [`InputEvent`]s into a channel and a single task consumes
/// them, so the debounce check and the step counter share one path.
pub struct Recorder {
    store: Arc<Mutex<WorkflowStore>>,
    screens: Arc<dyn ScreenshotProvider>,
    ocr: Option<Arc<dyn TextDetector>>,
    config: RecorderConfig,
}

impl Recorder {
    pub fn new(
        store: Arc<Mutex<WorkflowStore>>,
        screens: Arc<dyn ScreenshotProvider>,
        ocr: Option<Arc<dyn TextDetector>>,
        config: RecorderConfig,
    ) -> Self {
        Self {
            store,
            screens,
            ocr,
            config,
        }
    }

    /// Creates a workflow in `recording` state and spawns the consumer task.
    pub async fn start(
        &self,
        name: &str,
        description: &str,
        tags: BTreeSet<String>,
    ) -> ReplayResult<RecordingSession> {
        let workflow_id = self.store.lock().await.create(name, description, tags).await?;
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        let mut task = RecorderTask {
            workflow_id: workflow_id.clone(),
            rx,
            store: self.store.clone(),
            screens: self.screens.clone(),
            ocr: self.ocr.clone(),
            config: self.config.clone(),
            last_frame: None,
        };
        task.last_frame = task.capture().await;

        tracing::info!(id = %workflow_id, name, "recording started");
        let handle = tokio::spawn(async move { task.run().await });

        Ok(RecordingSession {
            workflow_id,
            tx,
            task: handle,
            store: self.store.clone(),
        })
    }
}

pub struct RecordingSession {
    workflow_id: String,
    tx: mpsc::Sender<InputEvent>,
    task: JoinHandle<u32>,
    store: Arc<Mutex<WorkflowStore>>,
}

impl RecordingSession {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Sender handed to input listeners.
    pub fn sender(&self) -> mpsc::Sender<InputEvent> {
        self.tx.clone()
    }

    /// Drains pending events, then finalizes the workflow with `parameters`.
    pub async fn stop(self, parameters: Vec<Parameter>) -> ReplayResult<String> {
        let RecordingSession {
            workflow_id,
            tx,
            task,
            store,
        } = self;
        drop(tx);
        let steps = task
            .await
            .map_err(|e| ReplayError::Store(format!("recorder task: {e}")))?;
        store.lock().await.finalize(&workflow_id, parameters).await?;
        tracing::info!(id = %workflow_id, steps, "recording stopped");
        Ok(workflow_id)
    }
}

struct RecorderTask {
    workflow_id: String,
    rx: mpsc::Receiver<InputEvent>,
    store: Arc<Mutex<WorkflowStore>>,
    screens: Arc<dyn ScreenshotProvider>,
    ocr: Option<Arc<dyn TextDetector>>,
    config: RecorderConfig,
    last_frame: Option<Screenshot>,
}

impl RecorderTask {
    /// Consumes events until every sender is dropped. Returns the step count.
    async fn run(&mut self) -> u32 {
        let debounce = Duration::from_millis(self.config.debounce_ms);
        let mut last_at: Option<Instant> = None;
        let mut recorded = 0;

        while let Some(event) = self.rx.recv().await {
            let at = event.at();
            if let Some(prev) = last_at {
                if at.saturating_duration_since(prev) < debounce {
                    tracing::debug!("event debounced");
                    continue;
                }
            }
            last_at = Some(at);

            match self.record(event).await {
                Ok(n) => recorded = n,
                Err(e) => tracing::warn!(error = %e, "failed to record step"),
            }
        }
        recorded
    }

    async fn capture(&self) -> Option<Screenshot> {
        match self.screens.capture().await {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(error = %e, "recorder screenshot failed");
                None
            }
        }
    }

    async fn record(&mut self, event: InputEvent) -> ReplayResult<u32> {
        let before = match self.last_frame.take() {
            Some(f) => Some(f),
            None => self.capture().await,
        };
        let screen_hash = before
            .as_ref()
            .and_then(|f| PerceptualHash::of_bytes(&f.image_bytes).ok())
            .map(|h| h.to_hex());

        let (action, mut ctx) = match event {
            InputEvent::Click { x, y, button, .. } => {
                let (w, h) = before.as_ref().map(|f| f.size()).unwrap_or((0, 0));
                let normalized = normalize(x, y, w, h);
                let detections = match (&self.ocr, &before) {
                    (Some(ocr), Some(frame)) => ocr.detect_text(frame).await.unwrap_or_else(|e| {
                        tracing::warn!(error = %e, "recorder OCR failed");
                        Vec::new()
                    }),
                    _ => Vec::new(),
                };
                let (element_text, nearby_labels) = click_context(&detections, x, y, &self.config);
                let description = match &element_text {
                    Some(label) => format!("Click '{}' in {}", label, region_name(normalized)),
                    None => format!("Click at ({}, {}) in {}", x, y, region_name(normalized)),
                };
                (
                    StepAction::Click { x, y, normalized, button },
                    VisualContext {
                        element_text,
                        nearby_labels,
                        screen_hash: None,
                        description: Some(description),
                    },
                )
            }
            InputEvent::Scroll { x, y, dx, dy, .. } => {
                let direction = scroll_direction(dx, dy);
                let amount = dx.abs().max(dy.abs()).max(1);
                (
                    StepAction::Scroll { direction, amount },
                    VisualContext {
                        description: Some(format!("Scroll {direction:?} at ({x}, {y})").to_lowercase()),
                        ..Default::default()
                    },
                )
            }
            InputEvent::Key { key, .. } => {
                let description = format!("Press {key}");
                (
                    StepAction::KeyPress { key },
                    VisualContext {
                        description: Some(description),
                        ..Default::default()
                    },
                )
            }
            InputEvent::Text { text, .. } => (
                StepAction::Type { text },
                VisualContext {
                    description: Some("Type text".into()),
                    ..Default::default()
                },
            ),
        };
        ctx.screen_hash = screen_hash;

        let step = self
            .store
            .lock()
            .await
            .add_step(&self.workflow_id, action, Some(ctx))
            .await?;
        self.last_frame = self.capture().await;
        Ok(step)
    }
}

/// Direction of a wheel event. Positive `dy` scrolls up, positive `dx` right.
fn scroll_direction(dx: i32, dy: i32) -> ScrollDirection {
    if dy > 0 {
        ScrollDirection::Up
    } else if dy < 0 {
        ScrollDirection::Down
    } else if dx > 0 {
        ScrollDirection::Right
    } else {
        ScrollDirection::Left
    }
}

/// Label of the clicked element plus the labels around it.
///
/// The element is the detection whose box contains the click, else the
/// nearest one within `element_radius_px`.
pub fn click_context(
    detections: &[TextDetection],
    x: i32,
    y: i32,
    cfg: &RecorderConfig,
) -> (Option<String>, Vec<String>) {
    let dist2 = |d: &TextDetection| {
        let (dx, dy) = ((d.center.0 - x) as i64, (d.center.1 - y) as i64);
        dx * dx + dy * dy
    };
    let radius2 = (cfg.element_radius_px as i64).pow(2);

    let element = detections
        .iter()
        .enumerate()
        .filter(|(_, d)| !d.text.trim().is_empty())
        .filter(|(_, d)| {
            let b = d.bbox;
            (x >= b.x_min && x <= b.x_max && y >= b.y_min && y <= b.y_max) || dist2(*d) <= radius2
        })
        .min_by_key(|(_, d)| {
            let b = d.bbox;
            let inside = x >= b.x_min && x <= b.x_max && y >= b.y_min && y <= b.y_max;
            (!inside, dist2(*d))
        })
        .map(|(i, _)| i);

    let mut nearby: Vec<&TextDetection> = detections
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != element)
        .map(|(_, d)| d)
        .filter(|d| !d.text.trim().is_empty())
        .filter(|d| (d.center.0 - x).abs() < NEARBY_DX && (d.center.1 - y).abs() < NEARBY_DY)
        .collect();
    nearby.sort_by_key(|d| dist2(*d));

    (
        element.map(|i| detections[i].text.trim().to_string()),
        nearby
            .into_iter()
            .take(cfg.max_nearby_labels)
            .map(|d| d.text.trim().to_string())
            .collect(),
    )
}
