#![deny(missing_docs)]
//! Evidence context engine for quill.
//!
//! One call to [`EvidenceEngine::build`] runs the whole per-turn pipeline:
//! signal extraction, intent classification, strategy selection, parallel
//! provider dispatch under a deadline, feature-weighted reranking, token
//! budgeting, and telemetry. Retrieval failures never fail the turn; the
//! engine degrades to whatever the healthy providers returned.

pub mod budget;
pub mod intent;
pub mod provider;
pub mod rerank;
pub mod search;
pub mod signal;
pub mod strategy;
pub mod telemetry;
pub mod types;

pub use budget::*;
pub use intent::*;
pub use provider::*;
pub use rerank::*;
pub use search::*;
pub use signal::*;
pub use strategy::*;
pub use telemetry::*;
pub use types::*;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Session id stamped into telemetry.
    pub session_id: String,
    /// Global token budget per turn.
    pub global_budget_tokens: u64,
    /// Deadline for provider fan-out.
    pub deadline: Duration,
    /// Optional ceiling on reranked scores.
    pub max_score: Option<f64>,
    /// Telemetry buffer capacity.
    pub telemetry_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            global_budget_tokens: 8_000,
            deadline: Duration::from_secs(10),
            max_score: None,
            telemetry_capacity: DEFAULT_TELEMETRY_CAPACITY,
        }
    }
}

/// Everything one turn's evidence build produced.
#[derive(Debug)]
pub struct EvidenceBundle {
    /// Extracted signals.
    pub signals: Vec<Signal>,
    /// Intent classification.
    pub classification: IntentClassification,
    /// Budget-enforced, rank-ordered evidence.
    pub evidence: Vec<Evidence>,
    /// Item count before budgeting.
    pub evidence_count_before_budget: usize,
    /// Tokens dropped by budgeting.
    pub tokens_saved: u64,
    /// Telemetry record id, for marking the outcome later.
    pub telemetry_id: u64,
}

/// The per-turn evidence pipeline.
pub struct EvidenceEngine {
    providers: Vec<Arc<dyn EvidenceProvider>>,
    strategies: StrategyRegistry,
    telemetry: Mutex<TelemetryBuffer>,
    config: EngineConfig,
}

impl EvidenceEngine {
    /// Engine over the given providers with default strategies.
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn EvidenceProvider>>, config: EngineConfig) -> Self {
        let telemetry = Mutex::new(TelemetryBuffer::with_capacity(config.telemetry_capacity));
        Self {
            providers,
            strategies: StrategyRegistry::new(),
            telemetry,
            config,
        }
    }

    /// Replace the strategy registry.
    #[must_use]
    pub fn with_strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.strategies = strategies;
        self
    }

    /// Build evidence for one user turn.
    pub async fn build(
        &self,
        user_message: &str,
        ctx: &TurnContext,
        cancel: &CancellationToken,
    ) -> EvidenceBundle {
        let build_started = Instant::now();

        // Phase 1: signals.
        let extraction_started = Instant::now();
        let signals = extract_signals(user_message, ctx);
        let signal_extraction_ms = extraction_started.elapsed().as_millis() as u64;

        // Phase 2: intent.
        let classification = classify(user_message, ctx);

        // Phase 3: strategy.
        let strategy = self.strategies.for_intent(classification.intent);
        tracing::debug!(
            intent = ?classification.intent,
            confidence = classification.confidence,
            signals = signals.len(),
            "evidence build"
        );

        // Phase 4: dispatch.
        let global = self.config.global_budget_tokens;
        let ratios = strategy.budget_ratios;
        let outcome = dispatch(
            &self.providers,
            &signals,
            |kind| (global as f64 * ratios.for_provider(kind)) as u64,
            self.config.deadline,
            cancel,
        )
        .await;

        // Phase 5: rerank.
        let rerank_started = Instant::now();
        let rerank_config = RerankConfig {
            weights: strategy.weight_modifiers.apply(RerankerWeights::default()),
            provider_priority: strategy.provider_priority.clone(),
            max_score: self.config.max_score,
        };
        let ranked = rerank(outcome.evidence, &rerank_config);
        let rerank_ms = rerank_started.elapsed().as_millis() as u64;

        // Phase 6: budget.
        let budgeted = enforce_budget(ranked, global);

        // Phase 7: telemetry.
        let telemetry = TurnTelemetry {
            record_id: 0,
            session_id: self.config.session_id.clone(),
            timestamp: chrono::Utc::now(),
            signal_extraction_ms,
            rerank_ms,
            total_ms: build_started.elapsed().as_millis() as u64,
            signal_count: signals.len(),
            provider_timings: outcome
                .timings
                .iter()
                .map(|(k, v)| (k.clone(), v.as_millis() as u64))
                .collect(),
            provider_counts: outcome.counts,
            evidence_count_before_budget: budgeted.evidence_count_before,
            evidence_count_after_budget: budgeted.evidence_count_after,
            tokens_saved: budgeted.tokens_saved,
            outcome: None,
        };
        let telemetry_id = self
            .telemetry
            .lock()
            .expect("telemetry lock poisoned")
            .record(telemetry);

        EvidenceBundle {
            signals,
            classification,
            evidence: budgeted.kept,
            evidence_count_before_budget: budgeted.evidence_count_before,
            tokens_saved: budgeted.tokens_saved,
            telemetry_id,
        }
    }

    /// Mark how a previously built turn went.
    pub fn mark_outcome(&self, telemetry_id: u64, outcome: TurnOutcome) -> bool {
        self.telemetry
            .lock()
            .expect("telemetry lock poisoned")
            .mark_outcome(telemetry_id, outcome)
    }

    /// Aggregate telemetry statistics.
    #[must_use]
    pub fn stats(&self) -> TelemetryStats {
        self.telemetry
            .lock()
            .expect("telemetry lock poisoned")
            .stats()
    }
}

/// Shrink a turn's evidence budget by the token cost of images already in
/// the user message — image input is priced per provider and competes with
/// evidence for the same context window.
#[must_use]
pub fn budget_after_images(
    global_budget_tokens: u64,
    message: &quill_types::Message,
    family: quill_types::ImageTokenFamily,
    detail: quill_types::ImageDetail,
) -> u64 {
    global_budget_tokens.saturating_sub(quill_types::message_image_tokens(message, family, detail))
}
