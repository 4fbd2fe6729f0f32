//! Feature-weighted reranking.

use serde::{Deserialize, Serialize};

use crate::types::{Evidence, ProviderKind, SignalSource, SignalType};

/// Weights for the rerank feature bonuses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankerWeights {
    /// Flat bonus for diff-provider evidence.
    pub diff: f64,
    /// Peak bonus for stack-frame evidence, decayed by depth.
    pub stack_frame: f64,
    /// Bonus for LSP evidence carrying a symbol kind.
    pub definition: f64,
    /// Bonus when a matched signal is symbol-typed.
    pub reference: f64,
    /// Per-signal bonus for user-message error/symbol matches.
    pub keyword: f64,
    /// Bonus when a matched signal came from the working set.
    pub working_set: f64,
    /// Per-frame decay for the stack bonus; depth 10 zeroes it.
    pub stack_depth_decay: f64,
}

impl Default for RerankerWeights {
    fn default() -> Self {
        Self {
            diff: 100.0,
            stack_frame: 80.0,
            definition: 60.0,
            reference: 30.0,
            keyword: 10.0,
            working_set: 50.0,
            stack_depth_decay: 0.1,
        }
    }
}

/// Rerank configuration.
#[derive(Debug, Clone, Default)]
pub struct RerankConfig {
    /// The weights in force (defaults adjusted per intent).
    pub weights: RerankerWeights,
    /// Provider tie-break order, highest priority first.
    pub provider_priority: Vec<ProviderKind>,
    /// Optional ceiling applied to final scores.
    pub max_score: Option<f64>,
}

/// Score and sort evidence.
///
/// `final_score = base_score + bonuses`; all bonuses are non-negative, so
/// `final_score ≥ base_score` always holds. Ordering is final score
/// descending with ties broken by `(provider priority, path, range.start)`
/// — stable for identical inputs.
#[must_use]
pub fn rerank(mut evidence: Vec<Evidence>, config: &RerankConfig) -> Vec<Evidence> {
    for item in &mut evidence {
        let mut score = item.base_score + bonuses(item, &config.weights);
        if let Some(ceiling) = config.max_score {
            score = score.min(ceiling);
        }
        item.final_score = Some(score);
    }

    let priority = |kind: ProviderKind| -> usize {
        config
            .provider_priority
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(config.provider_priority.len())
    };

    evidence.sort_by(|a, b| {
        let score_a = a.final_score.unwrap_or(a.base_score);
        let score_b = b.final_score.unwrap_or(b.base_score);
        score_b
            .partial_cmp(&score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| priority(a.provider).cmp(&priority(b.provider)))
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.range.start.cmp(&b.range.start))
    });
    evidence
}

fn bonuses(item: &Evidence, w: &RerankerWeights) -> f64 {
    let mut total = 0.0;

    if item.provider == ProviderKind::Diff {
        total += w.diff;
    }

    if let Some(depth) = item.metadata.stack_depth {
        total += w.stack_frame * (1.0 - f64::from(depth) * w.stack_depth_decay).max(0.0);
    }

    if item.provider == ProviderKind::Lsp && item.metadata.symbol_kind.is_some() {
        total += w.definition;
    }

    if item
        .matched_signals
        .iter()
        .any(|s| s.signal_type == SignalType::Symbol)
    {
        total += w.reference;
    }

    // Keyword bonus counts the user's own error/symbol terms; signals
    // sourced from context (working set, traces) score through the other
    // features instead.
    let keyword_hits = item
        .matched_signals
        .iter()
        .filter(|s| {
            s.source == SignalSource::UserMessage
                && matches!(s.signal_type, SignalType::ErrorToken | SignalType::Symbol)
        })
        .count();
    total += w.keyword * keyword_hits as f64;

    if item
        .matched_signals
        .iter()
        .any(|s| s.source == SignalSource::WorkingSet)
    {
        total += w.working_set;
    }

    total
}
