//! Per-turn telemetry with a bounded history.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a turn ultimately went, marked after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnOutcome {
    /// The user accepted the result.
    Success,
    /// The turn failed.
    Failure,
    /// The user moved on without resolution.
    Abandoned,
}

/// Telemetry for one evidence build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnTelemetry {
    /// Monotonic record id, assigned by the buffer.
    pub record_id: u64,
    /// Session the turn belongs to.
    pub session_id: String,
    /// When the build ran.
    pub timestamp: DateTime<Utc>,
    /// Time spent extracting signals.
    pub signal_extraction_ms: u64,
    /// Time spent reranking.
    pub rerank_ms: u64,
    /// End-to-end build time.
    pub total_ms: u64,
    /// Number of signals extracted.
    pub signal_count: usize,
    /// Wall-clock per provider, in milliseconds.
    pub provider_timings: HashMap<String, u64>,
    /// Evidence count per provider.
    pub provider_counts: HashMap<String, usize>,
    /// Item count before budget enforcement.
    pub evidence_count_before_budget: usize,
    /// Item count after budget enforcement.
    pub evidence_count_after_budget: usize,
    /// Tokens dropped by the budget pass.
    pub tokens_saved: u64,
    /// Outcome, once known.
    pub outcome: Option<TurnOutcome>,
}

/// Aggregate statistics over the buffered records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryStats {
    /// Records currently buffered.
    pub turns: usize,
    /// Mean end-to-end build time.
    pub avg_total_ms: f64,
    /// Mean signal count.
    pub avg_signal_count: f64,
    /// Mean tokens saved by budgeting.
    pub avg_tokens_saved: f64,
    /// Per-provider fraction of turns with at least one result.
    pub provider_hit_rates: HashMap<String, f64>,
}

/// Circular buffer of [`TurnTelemetry`] records.
///
/// Single-writer per session; wrap it in a mutex when shared.
pub struct TelemetryBuffer {
    records: VecDeque<TurnTelemetry>,
    capacity: usize,
    next_id: u64,
}

/// Default record capacity.
pub const DEFAULT_TELEMETRY_CAPACITY: usize = 1000;

impl TelemetryBuffer {
    /// Buffer with the default capacity of 1000 records.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TELEMETRY_CAPACITY)
    }

    /// Buffer with a custom capacity (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
            next_id: 0,
        }
    }

    /// Append a record, evicting the oldest when full. Returns the
    /// assigned record id, used to mark the outcome later.
    pub fn record(&mut self, mut telemetry: TurnTelemetry) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        telemetry.record_id = id;
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(telemetry);
        id
    }

    /// Mark the outcome of a previously recorded turn. Returns false when
    /// the record has already been evicted.
    pub fn mark_outcome(&mut self, record_id: u64, outcome: TurnOutcome) -> bool {
        match self.records.iter_mut().find(|r| r.record_id == record_id) {
            Some(record) => {
                record.outcome = Some(outcome);
                true
            }
            None => false,
        }
    }

    /// The buffered records, oldest first.
    #[must_use]
    pub fn records(&self) -> impl Iterator<Item = &TurnTelemetry> {
        self.records.iter()
    }

    /// Aggregate statistics over the buffer.
    #[must_use]
    pub fn stats(&self) -> TelemetryStats {
        let turns = self.records.len();
        if turns == 0 {
            return TelemetryStats::default();
        }
        let n = turns as f64;

        let mut hits: HashMap<String, usize> = HashMap::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        for record in &self.records {
            for (provider, count) in &record.provider_counts {
                *seen.entry(provider.clone()).or_default() += 1;
                if *count > 0 {
                    *hits.entry(provider.clone()).or_default() += 1;
                }
            }
        }
        let provider_hit_rates = seen
            .into_iter()
            .map(|(provider, total)| {
                let hit = hits.get(&provider).copied().unwrap_or(0);
                (provider, hit as f64 / total as f64)
            })
            .collect();

        TelemetryStats {
            turns,
            avg_total_ms: self.records.iter().map(|r| r.total_ms as f64).sum::<f64>() / n,
            avg_signal_count: self.records.iter().map(|r| r.signal_count as f64).sum::<f64>() / n,
            avg_tokens_saved: self.records.iter().map(|r| r.tokens_saved as f64).sum::<f64>() / n,
            provider_hit_rates,
        }
    }
}

impl Default for TelemetryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(session: &str, total_ms: u64, search_count: usize) -> TurnTelemetry {
        TurnTelemetry {
            record_id: 0,
            session_id: session.into(),
            timestamp: Utc::now(),
            signal_extraction_ms: 1,
            rerank_ms: 1,
            total_ms,
            signal_count: 4,
            provider_timings: HashMap::from([("search".to_string(), total_ms)]),
            provider_counts: HashMap::from([("search".to_string(), search_count)]),
            evidence_count_before_budget: 10,
            evidence_count_after_budget: 6,
            tokens_saved: 100,
            outcome: None,
        }
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut buffer = TelemetryBuffer::with_capacity(3);
        for i in 0..5 {
            buffer.record(record_with("s", i, 1));
        }
        let ids: Vec<u64> = buffer.records().map(|r| r.record_id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn outcome_can_be_marked_later() {
        let mut buffer = TelemetryBuffer::new();
        let id = buffer.record(record_with("s", 10, 1));
        assert!(buffer.mark_outcome(id, TurnOutcome::Success));
        assert_eq!(
            buffer.records().next().unwrap().outcome,
            Some(TurnOutcome::Success)
        );
    }

    #[test]
    fn marking_an_evicted_record_reports_false() {
        let mut buffer = TelemetryBuffer::with_capacity(1);
        let first = buffer.record(record_with("s", 1, 1));
        buffer.record(record_with("s", 2, 1));
        assert!(!buffer.mark_outcome(first, TurnOutcome::Failure));
    }

    #[test]
    fn stats_average_and_hit_rate() {
        let mut buffer = TelemetryBuffer::new();
        buffer.record(record_with("s", 10, 2));
        buffer.record(record_with("s", 30, 0));
        let stats = buffer.stats();
        assert_eq!(stats.turns, 2);
        assert_eq!(stats.avg_total_ms, 20.0);
        assert_eq!(stats.provider_hit_rates["search"], 0.5);
    }

    #[test]
    fn empty_buffer_stats_are_zero() {
        let stats = TelemetryBuffer::new().stats();
        assert_eq!(stats.turns, 0);
        assert!(stats.provider_hit_rates.is_empty());
    }
}
