//! The evidence-provider interface and concurrent dispatch.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::types::{Evidence, ProviderKind, Signal};

/// Errors from a retrieval backend. Always recovered by the dispatcher.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EvidenceError {
    /// The backend failed to produce results.
    #[error("retrieval failed: {0}")]
    RetrievalFailed(String),
    /// The backend is not available in this workspace.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    /// I/O error during retrieval.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Boxed future returned by [`EvidenceProvider::retrieve`].
pub type RetrieveFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<Evidence>, EvidenceError>> + Send + 'a>>;

/// One retrieval backend (diff, LSP, search).
///
/// Object safe; the engine holds providers as `Arc<dyn EvidenceProvider>`.
pub trait EvidenceProvider: Send + Sync {
    /// Which provider slot this backend fills.
    fn kind(&self) -> ProviderKind;

    /// Retrieve evidence for the given signals within a token budget.
    ///
    /// The budget is advisory — the engine enforces the real ceiling after
    /// reranking — but providers should not return wildly more than it.
    fn retrieve(&self, signals: &[Signal], budget_tokens: u64) -> RetrieveFuture<'_>;
}

/// Result of fanning out to every provider.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Everything the providers returned, unranked.
    pub evidence: Vec<Evidence>,
    /// Wall-clock spent per provider, by name.
    pub timings: HashMap<String, Duration>,
    /// Evidence count per provider, by name.
    pub counts: HashMap<String, usize>,
}

/// Fan out to all providers concurrently.
///
/// Every provider starts at once; the join waits for all of them or the
/// deadline, whichever comes first. A provider that errors or times out is
/// logged and contributes nothing — retrieval failures are never fatal to
/// the turn. Cancellation abandons the in-flight futures and discards
/// their partial output.
pub async fn dispatch(
    providers: &[Arc<dyn EvidenceProvider>],
    signals: &[Signal],
    budget_for: impl Fn(ProviderKind) -> u64,
    deadline: Duration,
    cancel: &CancellationToken,
) -> DispatchOutcome {
    let tasks = providers.iter().map(|provider| {
        let name = provider.kind().name();
        let budget = budget_for(provider.kind());
        async move {
            let started = Instant::now();
            let result = tokio::time::timeout(deadline, provider.retrieve(signals, budget)).await;
            let elapsed = started.elapsed();
            let evidence = match result {
                Ok(Ok(evidence)) => evidence,
                Ok(Err(err)) => {
                    tracing::warn!(provider = name, error = %err, "evidence provider failed");
                    Vec::new()
                }
                Err(_elapsed) => {
                    tracing::warn!(provider = name, ?deadline, "evidence provider timed out");
                    Vec::new()
                }
            };
            (name, elapsed, evidence)
        }
    });

    let joined = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            tracing::debug!("evidence dispatch cancelled");
            return DispatchOutcome::default();
        }
        results = futures::future::join_all(tasks) => results,
    };

    let mut outcome = DispatchOutcome::default();
    for (name, elapsed, evidence) in joined {
        outcome.timings.insert(name.to_string(), elapsed);
        outcome.counts.insert(name.to_string(), evidence.len());
        outcome.evidence.extend(evidence);
    }
    outcome
}
