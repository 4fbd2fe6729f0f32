//! Compaction statistics persistence.
//!
//! A versioned JSON file holds the lifetime totals and a bounded history.
//! A missing file means empty state; a malformed one is logged and
//! replaced on the next save rather than aborting startup.

use std::path::Path;

use serde::{Deserialize, Serialize};

use quill_types::StorageError;

use crate::{CompactionRecord, CompactionStats, CompactionTracker};

/// Current persistence schema version.
const SCHEMA_VERSION: u32 = 1;

/// On-disk schema.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedStats {
    version: u32,
    total_compactions: u64,
    cascade_compactions: u64,
    total_original_tokens: u64,
    total_compressed_tokens: u64,
    history: Vec<CompactionRecord>,
}

/// Load persisted stats into a fresh tracker.
///
/// Best effort by design: a missing file yields an empty tracker, and a
/// corrupt or wrong-version file is logged and discarded.
#[must_use]
pub fn load_stats(path: &Path, max_history: usize) -> CompactionTracker {
    let tracker = CompactionTracker::with_max_history(max_history);
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return tracker,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read compaction stats");
            return tracker;
        }
    };
    let persisted: PersistedStats = match serde_json::from_str(&content) {
        Ok(persisted) => persisted,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "malformed compaction stats file, starting fresh"
            );
            return tracker;
        }
    };
    if persisted.version != SCHEMA_VERSION {
        tracing::warn!(
            path = %path.display(),
            version = persisted.version,
            "unknown compaction stats version, starting fresh"
        );
        return tracker;
    }
    tracker.with_persisted(
        CompactionStats {
            total_compactions: persisted.total_compactions,
            cascade_compactions: persisted.cascade_compactions,
            total_original_tokens: persisted.total_original_tokens,
            total_compressed_tokens: persisted.total_compressed_tokens,
            session_compactions: 0,
        },
        persisted.history,
    )
}

/// Write the tracker's persistent state to disk.
///
/// # Errors
///
/// [`StorageError::Io`] on filesystem failures, [`StorageError::Serialization`]
/// if encoding fails.
pub fn save_stats(tracker: &CompactionTracker, path: &Path) -> Result<(), StorageError> {
    let stats = tracker.stats();
    let persisted = PersistedStats {
        version: SCHEMA_VERSION,
        total_compactions: stats.total_compactions,
        cascade_compactions: stats.cascade_compactions,
        total_original_tokens: stats.total_original_tokens,
        total_compressed_tokens: stats.total_compressed_tokens,
        history: tracker.history().cloned().collect(),
    };
    let json = serde_json::to_string_pretty(&persisted)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)?;
    Ok(())
}
