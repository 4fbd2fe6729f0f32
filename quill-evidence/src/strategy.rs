//! Per-intent retrieval strategies.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::intent::Intent;
use crate::rerank::RerankerWeights;
use crate::types::ProviderKind;

/// How a global token budget splits across providers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetRatios {
    /// Share for the diff provider.
    pub diff: f64,
    /// Share for the LSP provider.
    pub lsp: f64,
    /// Share for the search provider.
    pub search: f64,
}

impl BudgetRatios {
    /// The share for one provider kind.
    #[must_use]
    pub fn for_provider(&self, kind: ProviderKind) -> f64 {
        match kind {
            ProviderKind::Diff => self.diff,
            ProviderKind::Lsp => self.lsp,
            ProviderKind::Search => self.search,
        }
    }
}

/// Partial overrides applied onto the default reranker weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightModifiers {
    /// Override for [`RerankerWeights::diff`].
    pub diff: Option<f64>,
    /// Override for [`RerankerWeights::stack_frame`].
    pub stack_frame: Option<f64>,
    /// Override for [`RerankerWeights::definition`].
    pub definition: Option<f64>,
    /// Override for [`RerankerWeights::reference`].
    pub reference: Option<f64>,
    /// Override for [`RerankerWeights::keyword`].
    pub keyword: Option<f64>,
    /// Override for [`RerankerWeights::working_set`].
    pub working_set: Option<f64>,
}

impl WeightModifiers {
    /// Apply these overrides onto a weight set.
    #[must_use]
    pub fn apply(&self, mut weights: RerankerWeights) -> RerankerWeights {
        if let Some(v) = self.diff {
            weights.diff = v;
        }
        if let Some(v) = self.stack_frame {
            weights.stack_frame = v;
        }
        if let Some(v) = self.definition {
            weights.definition = v;
        }
        if let Some(v) = self.reference {
            weights.reference = v;
        }
        if let Some(v) = self.keyword {
            weights.keyword = v;
        }
        if let Some(v) = self.working_set {
            weights.working_set = v;
        }
        weights
    }
}

/// One intent's retrieval configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalStrategy {
    /// Budget split across providers.
    pub budget_ratios: BudgetRatios,
    /// Weight overrides for the reranker.
    pub weight_modifiers: WeightModifiers,
    /// Tie-break order for equal final scores.
    pub provider_priority: Vec<ProviderKind>,
}

/// Registry mapping each intent to its strategy.
pub struct StrategyRegistry {
    strategies: HashMap<Intent, RetrievalStrategy>,
}

impl StrategyRegistry {
    /// Registry with the default allocation table.
    #[must_use]
    pub fn new() -> Self {
        use ProviderKind::{Diff, Lsp, Search};
        let ratios = |diff, lsp, search| BudgetRatios { diff, lsp, search };
        let mut strategies = HashMap::new();

        strategies.insert(
            Intent::Debug,
            RetrievalStrategy {
                budget_ratios: ratios(0.5, 0.3, 0.2),
                weight_modifiers: WeightModifiers {
                    stack_frame: Some(100.0),
                    ..Default::default()
                },
                provider_priority: vec![Diff, Lsp, Search],
            },
        );
        strategies.insert(
            Intent::Implement,
            RetrievalStrategy {
                budget_ratios: ratios(0.3, 0.4, 0.3),
                weight_modifiers: WeightModifiers::default(),
                provider_priority: vec![Lsp, Diff, Search],
            },
        );
        strategies.insert(
            Intent::Refactor,
            RetrievalStrategy {
                budget_ratios: ratios(0.3, 0.5, 0.2),
                weight_modifiers: WeightModifiers {
                    reference: Some(50.0),
                    ..Default::default()
                },
                provider_priority: vec![Lsp, Diff, Search],
            },
        );
        strategies.insert(
            Intent::Explore,
            RetrievalStrategy {
                budget_ratios: ratios(0.2, 0.4, 0.4),
                weight_modifiers: WeightModifiers {
                    keyword: Some(20.0),
                    ..Default::default()
                },
                provider_priority: vec![Lsp, Search, Diff],
            },
        );
        strategies.insert(
            Intent::Document,
            RetrievalStrategy {
                budget_ratios: ratios(0.2, 0.3, 0.5),
                weight_modifiers: WeightModifiers {
                    keyword: Some(20.0),
                    ..Default::default()
                },
                provider_priority: vec![Search, Lsp, Diff],
            },
        );
        strategies.insert(
            Intent::Test,
            RetrievalStrategy {
                budget_ratios: ratios(0.4, 0.4, 0.2),
                weight_modifiers: WeightModifiers::default(),
                provider_priority: vec![Diff, Lsp, Search],
            },
        );
        strategies.insert(
            Intent::Review,
            RetrievalStrategy {
                budget_ratios: ratios(0.6, 0.3, 0.1),
                weight_modifiers: WeightModifiers {
                    diff: Some(120.0),
                    ..Default::default()
                },
                provider_priority: vec![Diff, Lsp, Search],
            },
        );
        strategies.insert(
            Intent::Unknown,
            RetrievalStrategy {
                budget_ratios: ratios(0.4, 0.35, 0.25),
                weight_modifiers: WeightModifiers::default(),
                provider_priority: vec![Diff, Lsp, Search],
            },
        );

        Self { strategies }
    }

    /// The strategy for an intent; unknown intents use the `Unknown` row.
    #[must_use]
    pub fn for_intent(&self, intent: Intent) -> &RetrievalStrategy {
        self.strategies
            .get(&intent)
            .unwrap_or_else(|| &self.strategies[&Intent::Unknown])
    }

    /// Replace the strategy for an intent.
    pub fn set(&mut self, intent: Intent, strategy: RetrievalStrategy) {
        self.strategies.insert(intent, strategy);
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
