// Semantic matcher: keyword and embedding scoring of stored workflows.
pub mod embedder;
pub mod extract;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::MatcherConfig;
use crate::matcher::embedder::{cosine_similarity, Embedder};
use crate::workflow::types::{Workflow, WorkflowSummary};

pub use extract::extract_parameters;

const NAME_WEIGHT: f32 = 0.4;
const DESCRIPTION_WEIGHT: f32 = 0.2;
const TAG_WEIGHT: f32 = 0.1;
const EMBEDDING_WEIGHT: f32 = 0.4;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub workflow: Option<WorkflowSummary>,
    pub score: f32,
    /// Empty whenever `workflow` is `None`.
    pub parameters: HashMap<String, String>,
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        self.workflow.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub workflow: WorkflowSummary,
    pub score: f32,
}

pub struct SemanticMatcher {
    embedder: Option<Arc<dyn Embedder>>,
    threshold: f32,
}

impl SemanticMatcher {
    /// `embedder` is ignored when embeddings are disabled in `config`.
    pub fn new(config: &MatcherConfig, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            embedder: embedder.filter(|_| config.use_embeddings),
            threshold: config.threshold.clamp(0.0, 1.0),
        }
    }

    /// Configured acceptance threshold.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Best workflow for `request`, or an empty outcome when nothing reaches
    /// `threshold`. Ties keep the earlier workflow.
    pub async fn find_best_match(
        &self,
        request: &str,
        workflows: &[Workflow],
        threshold: f32,
    ) -> MatchOutcome {
        if request.trim().is_empty() || workflows.is_empty() {
            return MatchOutcome::default();
        }
        let request_vec = self.embed(request).await;

        let mut best: Option<(&Workflow, f32)> = None;
        for wf in workflows {
            let score = self.score(request, request_vec.as_deref(), wf).await;
            tracing::debug!(workflow = %wf.name, score, "scored candidate");
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((wf, score));
            }
        }

        match best {
            Some((wf, score)) if score >= threshold => {
                let parameters = extract_parameters(request, wf);
                tracing::info!(workflow = %wf.name, score, params = parameters.len(), "workflow matched");
                MatchOutcome {
                    workflow: Some(wf.summary()),
                    score,
                    parameters,
                }
            }
            other => {
                tracing::info!(
                    best = other.map_or(0.0, |(_, s)| s),
                    threshold,
                    "no workflow above threshold"
                );
                MatchOutcome::default()
            }
        }
    }

    /// Up to `top_k` workflows scoring at least `min_score`, best first.
    pub async fn rank(
        &self,
        request: &str,
        workflows: &[Workflow],
        top_k: usize,
        min_score: f32,
    ) -> Vec<RankedCandidate> {
        if request.trim().is_empty() || top_k == 0 {
            return Vec::new();
        }
        let request_vec = self.embed(request).await;

        let mut ranked = Vec::new();
        for wf in workflows {
            let score = self.score(request, request_vec.as_deref(), wf).await;
            if score > 0.0 && score >= min_score {
                ranked.push(RankedCandidate {
                    workflow: wf.summary(),
                    score,
                });
            }
        }
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(top_k);
        ranked
    }

    async fn score(&self, request: &str, request_vec: Option<&[f32]>, wf: &Workflow) -> f32 {
        let mut score = keyword_score(request, wf);
        if let Some(rv) = request_vec {
            let text = format!("{}. {}", wf.name, wf.description);
            if let Some(wv) = self.embed(&text).await {
                score += EMBEDDING_WEIGHT * cosine_similarity(rv, &wv).max(0.0);
            }
        }
        score.clamp(0.0, 1.0)
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(text).await {
            Ok(v) if !v.is_empty() => Some(v),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "embedding failed, scoring on keywords only");
                None
            }
        }
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Score from name containment, description overlap and tags, before embeddings.
pub fn keyword_score(request: &str, wf: &Workflow) -> f32 {
    let request_lower = request.trim().to_lowercase();
    let name_lower = wf.name.trim().to_lowercase();
    let mut score = 0.0;

    if !name_lower.is_empty()
        && (request_lower.contains(&name_lower) || name_lower.contains(&request_lower))
    {
        score += NAME_WEIGHT;
    }

    let request_words = words(request);
    if !request_words.is_empty() {
        let description_words = words(&wf.description);
        let common = request_words.intersection(&description_words).count();
        score += DESCRIPTION_WEIGHT * common as f32 / request_words.len() as f32;
    }

    for tag in &wf.tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && request_lower.contains(&tag) {
            score += TAG_WEIGHT;
        }
    }
    score
}

/// One-line, human-readable account of a match.
pub fn explain(outcome: &MatchOutcome) -> String {
    let Some(wf) = &outcome.workflow else {
        return "No matching workflow".to_string();
    };
    let confidence = if outcome.score > 0.8 {
        "high: very similar workflow"
    } else if outcome.score > 0.5 {
        "medium: related workflow, may need adaptation"
    } else {
        "low: loosely related"
    };
    let mut text = format!(
        "Matched '{}' ({:.0}%), confidence {}",
        wf.name,
        outcome.score * 100.0,
        confidence
    );
    if !outcome.parameters.is_empty() {
        let mut params: Vec<String> = outcome
            .parameters
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        params.sort();
        text.push_str(&format!("; parameters: {}", params.join(", ")));
    }
    text
}
