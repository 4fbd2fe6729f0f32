#![deny(missing_docs)]
//! Compaction tracking for quill.
//!
//! The [`CompactionTracker`] watches conversation compactions, detects
//! cascades (compacting over messages that are themselves summaries or
//! derived from prior summaries), and keeps bounded aggregate statistics
//! that persist across sessions via [`persist`].

pub mod persist;

pub use persist::{load_stats, save_stats};

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quill_types::Message;

/// Default bound on the in-memory compaction history.
pub const DEFAULT_MAX_HISTORY: usize = 100;

/// One recorded compaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionRecord {
    /// Identifier of the compaction operation.
    pub compaction_id: String,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Token count of the replaced messages.
    pub original_tokens: u64,
    /// Token count of the summary.
    pub compressed_tokens: u64,
    /// How many messages were replaced.
    pub message_count: usize,
    /// Whether this compaction operated over prior summaries.
    pub is_cascade: bool,
}

/// Aggregate statistics exposed by the tracker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionStats {
    /// Compactions ever recorded (persists across sessions).
    pub total_compactions: u64,
    /// Cascade compactions ever recorded.
    pub cascade_compactions: u64,
    /// Original tokens ever replaced.
    pub total_original_tokens: u64,
    /// Summary tokens ever produced.
    pub total_compressed_tokens: u64,
    /// Compactions in the current session (resets on session change).
    pub session_compactions: u64,
}

impl CompactionStats {
    /// Overall compression ratio, `compressed / original`.
    ///
    /// Callers judging compaction quality pick their own threshold on this
    /// ratio; the tracker does not define a pass/fail criterion.
    #[must_use]
    pub fn compression_ratio(&self) -> f64 {
        if self.total_original_tokens == 0 {
            return 0.0;
        }
        self.total_compressed_tokens as f64 / self.total_original_tokens as f64
    }
}

/// Tracks compactions for one process.
///
/// Single-writer per session; wrap in a mutex when shared.
#[derive(Debug)]
pub struct CompactionTracker {
    /// Ids of messages consumed by a compaction, plus the summary ids that
    /// replaced them.
    compacted_ids: HashSet<String>,
    history: VecDeque<CompactionRecord>,
    max_history: usize,
    stats: CompactionStats,
}

impl CompactionTracker {
    /// Tracker with the default history bound of 100.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_history(DEFAULT_MAX_HISTORY)
    }

    /// Tracker with a custom history bound (minimum 1).
    #[must_use]
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            compacted_ids: HashSet::new(),
            history: VecDeque::new(),
            max_history: max_history.max(1),
            stats: CompactionStats::default(),
        }
    }

    /// Restore persistent totals and history loaded from disk.
    #[must_use]
    pub fn with_persisted(mut self, stats: CompactionStats, history: Vec<CompactionRecord>) -> Self {
        self.stats = CompactionStats {
            session_compactions: 0,
            ..stats
        };
        for record in history {
            self.push_history(record);
        }
        self
    }

    /// Remember which message ids a compaction consumed and the summary id
    /// that replaced them.
    pub fn track_compacted_messages(&mut self, original_ids: &[String], summary_id: &str) {
        for id in original_ids {
            self.compacted_ids.insert(id.clone());
        }
        self.compacted_ids.insert(summary_id.to_string());
    }

    /// Whether compacting over these messages would be a cascade: true iff
    /// any message is a summary, carries a non-empty condense id, or has an
    /// id this tracker has already seen compacted.
    #[must_use]
    pub fn is_cascade(&self, messages: &[Message]) -> bool {
        messages.iter().any(|msg| {
            msg.is_summary
                || msg.condense_id.as_deref().is_some_and(|c| !c.is_empty())
                || msg
                    .id
                    .as_deref()
                    .is_some_and(|id| self.compacted_ids.contains(id))
        })
    }

    /// Record a completed compaction.
    pub fn record(&mut self, record: CompactionRecord) {
        self.stats.total_compactions += 1;
        self.stats.session_compactions += 1;
        if record.is_cascade {
            self.stats.cascade_compactions += 1;
        }
        self.stats.total_original_tokens += record.original_tokens;
        self.stats.total_compressed_tokens += record.compressed_tokens;
        self.push_history(record);
    }

    fn push_history(&mut self, record: CompactionRecord) {
        if self.history.len() == self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }

    /// Reset the per-session counter; persistent totals are untouched.
    pub fn start_session(&mut self) {
        self.stats.session_compactions = 0;
    }

    /// Current aggregate statistics.
    #[must_use]
    pub fn stats(&self) -> &CompactionStats {
        &self.stats
    }

    /// Recorded history, oldest first, bounded by `max_history`.
    #[must_use]
    pub fn history(&self) -> impl Iterator<Item = &CompactionRecord> {
        self.history.iter()
    }
}

impl Default for CompactionTracker {
    fn default() -> Self {
        Self::new()
    }
}
