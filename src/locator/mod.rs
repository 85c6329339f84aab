// Multi-strategy locator: exact text, fuzzy text, Set-of-Marks, recorded position.
pub mod fuzzy;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{LocatorConfig, LocatorThresholds};
use crate::errors::ReplayResult;
use crate::perception::annotator::{annotate_markers, build_marker_map, compact_reference};
use crate::perception::coords::denormalize;
use crate::perception::traits::{MarkerResolver, TextDetector};
use crate::perception::types::{BoundingBox, NormalizedPoint, Screenshot, TextDetection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocateStrategy {
    OcrExact,
    OcrFuzzy,
    SetOfMarks,
    PositionFallback,
}

/// A located element. Only ever produced for a successful lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementMatch {
    pub text: String,
    /// Always within `[0, 1]`.
    pub confidence: f32,
    pub center: (i32, i32),
    pub bbox: BoundingBox,
    pub strategy: LocateStrategy,
}

impl ElementMatch {
    fn new(text: impl Into<String>, confidence: f32, center: (i32, i32), bbox: BoundingBox, strategy: LocateStrategy) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            center,
            bbox,
            strategy,
        }
    }

    fn from_detection(d: &TextDetection, confidence: f32, strategy: LocateStrategy) -> Self {
        Self::new(d.text.clone(), confidence, d.center, d.bbox, strategy)
    }
}

/// Strategies run in a fixed order and the first one that clears its bar wins.
pub struct MultiStrategyLocator {
    ocr: Arc<dyn TextDetector>,
    resolver: Option<Arc<dyn MarkerResolver>>,
    thresholds: LocatorThresholds,
    max_reference_lines: usize,
}

impl MultiStrategyLocator {
    pub fn new(
        ocr: Arc<dyn TextDetector>,
        resolver: Option<Arc<dyn MarkerResolver>>,
        config: &LocatorConfig,
    ) -> Self {
        Self {
            ocr,
            resolver,
            thresholds: config.thresholds,
            max_reference_lines: config.max_reference_lines,
        }
    }

    pub fn thresholds(&self) -> LocatorThresholds {
        self.thresholds
    }

    /// Installs new thresholds and returns the previous ones.
    pub fn set_thresholds(&mut self, thresholds: LocatorThresholds) -> LocatorThresholds {
        std::mem::replace(&mut self.thresholds, thresholds)
    }

    /// Minimum confidence a match from `strategy` must carry.
    pub fn threshold_for(&self, strategy: LocateStrategy) -> f32 {
        match strategy {
            LocateStrategy::OcrExact => self.thresholds.exact,
            LocateStrategy::OcrFuzzy => self.thresholds.fuzzy,
            LocateStrategy::SetOfMarks => self.thresholds.vision_confidence,
            LocateStrategy::PositionFallback => self.thresholds.position_confidence,
        }
    }

    /// Locates `target` on `screenshot`. `None` means no strategy succeeded.
    pub async fn locate(
        &self,
        screenshot: &Screenshot,
        target: &str,
        fallback: Option<NormalizedPoint>,
    ) -> ReplayResult<Option<ElementMatch>> {
        let detections = self.detect(screenshot).await;
        let found = self.locate_in(screenshot, &detections, target, fallback).await;
        match &found {
            Some(m) => tracing::info!(
                element = target,
                strategy = ?m.strategy,
                confidence = m.confidence,
                x = m.center.0,
                y = m.center.1,
                "element located"
            ),
            None => tracing::info!(element = target, "element not found"),
        }
        Ok(found)
    }

    /// Locates several targets against one OCR pass.
    pub async fn locate_many(
        &self,
        screenshot: &Screenshot,
        targets: &[(String, Option<NormalizedPoint>)],
    ) -> ReplayResult<Vec<Option<ElementMatch>>> {
        let detections = self.detect(screenshot).await;
        let mut out = Vec::with_capacity(targets.len());
        for (target, fallback) in targets {
            out.push(self.locate_in(screenshot, &detections, target, *fallback).await);
        }
        Ok(out)
    }

    /// One OCR pass. Failures degrade to an empty result so the remaining
    /// strategies still run.
    async fn detect(&self, screenshot: &Screenshot) -> Vec<TextDetection> {
        match self.ocr.detect_text(screenshot).await {
            Ok(d) => {
                tracing::debug!(count = d.len(), "OCR detections");
                d
            }
            Err(e) => {
                tracing::warn!(error = %e, "text detection failed");
                Vec::new()
            }
        }
    }

    async fn locate_in(
        &self,
        screenshot: &Screenshot,
        detections: &[TextDetection],
        target: &str,
        fallback: Option<NormalizedPoint>,
    ) -> Option<ElementMatch> {
        let wanted = fuzzy::normalize(target);
        if !wanted.is_empty() {
            let confident: Vec<&TextDetection> = detections
                .iter()
                .filter(|d| d.confidence >= self.thresholds.ocr_floor)
                .collect();

            if let Some(m) = self.exact(&confident, &wanted) {
                return Some(m);
            }
            if let Some(m) = self.fuzzy(&confident, &wanted) {
                return Some(m);
            }
            if let Some(m) = self.set_of_marks(screenshot, detections, target).await {
                return Some(m);
            }
        }
        self.position(screenshot, target, fallback)
    }

    fn exact(&self, detections: &[&TextDetection], wanted: &str) -> Option<ElementMatch> {
        let mut best: Option<&TextDetection> = None;
        for &d in detections {
            if d.confidence < self.thresholds.exact || fuzzy::normalize(&d.text) != wanted {
                continue;
            }
            if best.map_or(true, |b| d.confidence > b.confidence) {
                best = Some(d);
            }
        }
        best.map(|d| ElementMatch::from_detection(d, d.confidence, LocateStrategy::OcrExact))
    }

    fn fuzzy(&self, detections: &[&TextDetection], wanted: &str) -> Option<ElementMatch> {
        let mut best: Option<(&TextDetection, f32)> = None;
        for &d in detections {
            let score = fuzzy::similarity(wanted, &d.text);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((d, score));
            }
        }
        let (d, score) = best?;
        tracing::debug!(candidate = %d.text, score, threshold = self.thresholds.fuzzy, "best fuzzy candidate");
        (score >= self.thresholds.fuzzy)
            .then(|| ElementMatch::from_detection(d, score, LocateStrategy::OcrFuzzy))
    }

    async fn set_of_marks(
        &self,
        screenshot: &Screenshot,
        detections: &[TextDetection],
        target: &str,
    ) -> Option<ElementMatch> {
        let resolver = self.resolver.as_ref()?;
        let markers = build_marker_map(detections, self.thresholds.marker_floor);
        if markers.is_empty() {
            return None;
        }

        let marked = match annotate_markers(&screenshot.image_bytes, &markers) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "marker annotation failed");
                return None;
            }
        };
        let reference = compact_reference(&markers, self.max_reference_lines);

        let id = match resolver.resolve_marker(&marked, &reference, target).await {
            Ok(Some(id)) => id,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "marker resolver failed");
                return None;
            }
        };
        match markers.get(&id) {
            Some(d) => Some(ElementMatch::from_detection(
                d,
                self.thresholds.vision_confidence,
                LocateStrategy::SetOfMarks,
            )),
            None => {
                tracing::warn!(marker = id, "resolver returned an unknown marker");
                None
            }
        }
    }

    fn position(
        &self,
        screenshot: &Screenshot,
        target: &str,
        fallback: Option<NormalizedPoint>,
    ) -> Option<ElementMatch> {
        let point = fallback?;
        let (w, h) = screenshot.size();
        let center = denormalize(point, w, h);
        Some(ElementMatch::new(
            target,
            self.thresholds.position_confidence,
            center,
            BoundingBox::point(center),
            LocateStrategy::PositionFallback,
        ))
    }
}
