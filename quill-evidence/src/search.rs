//! A filesystem search provider.
//!
//! Walks the workspace with gitignore rules applied and surfaces lines
//! matching the turn's signals. This is the reference [`EvidenceProvider`];
//! diff and LSP backends plug in the same way from their own crates.

use std::path::PathBuf;

use ignore::WalkBuilder;

use crate::provider::{EvidenceError, EvidenceProvider, RetrieveFuture};
use crate::types::{Evidence, LineRange, ProviderKind, Signal};

/// Context lines included around a matching line.
const CONTEXT_LINES: u32 = 2;

/// Rough chars-per-token ratio for snippet costing.
const CHARS_PER_TOKEN: usize = 4;

/// Signal-driven text search over the workspace.
pub struct GrepSearchProvider {
    root: PathBuf,
    max_results: usize,
    max_file_bytes: u64,
}

impl GrepSearchProvider {
    /// Search provider rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_results: 50,
            max_file_bytes: 512 * 1024,
        }
    }

    /// Cap the number of results returned.
    #[must_use]
    pub fn max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

impl EvidenceProvider for GrepSearchProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Search
    }

    fn retrieve(&self, signals: &[Signal], budget_tokens: u64) -> RetrieveFuture<'_> {
        let root = self.root.clone();
        let max_results = self.max_results;
        let max_file_bytes = self.max_file_bytes;
        let needles: Vec<Signal> = signals.to_vec();

        Box::pin(async move {
            if needles.is_empty() {
                return Ok(Vec::new());
            }
            let results = tokio::task::spawn_blocking(move || {
                search_workspace(&root, &needles, max_results, max_file_bytes, budget_tokens)
            })
            .await
            .map_err(|e| EvidenceError::RetrievalFailed(e.to_string()))?;
            Ok(results)
        })
    }
}

fn search_workspace(
    root: &PathBuf,
    signals: &[Signal],
    max_results: usize,
    max_file_bytes: u64,
    budget_tokens: u64,
) -> Vec<Evidence> {
    let mut results = Vec::new();
    let mut spent_tokens: u64 = 0;
    let walker = WalkBuilder::new(root).hidden(true).build();

    for entry in walker {
        if results.len() >= max_results || spent_tokens >= budget_tokens {
            break;
        }
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if entry.metadata().map(|m| m.len()).unwrap_or(u64::MAX) > max_file_bytes {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        let path = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();

        let lines: Vec<&str> = content.lines().collect();
        for (line_no, line) in lines.iter().enumerate() {
            let matched: Vec<Signal> = signals
                .iter()
                .filter(|signal| {
                    line.to_ascii_lowercase()
                        .contains(&signal.value.to_ascii_lowercase())
                })
                .cloned()
                .collect();
            if matched.is_empty() {
                continue;
            }

            let start = (line_no as u32).saturating_sub(CONTEXT_LINES);
            let end = ((line_no as u32) + CONTEXT_LINES + 1).min(lines.len() as u32);
            let snippet = lines[start as usize..end as usize].join("\n");
            let tokens = (snippet.len() / CHARS_PER_TOKEN).max(1) as u64;
            let base_score: f64 = matched.iter().map(|s| s.confidence).sum();

            spent_tokens += tokens;
            results.push(
                Evidence::new(
                    format!("search-{path}-{line_no}"),
                    ProviderKind::Search,
                    &path,
                    LineRange { start, end },
                    snippet,
                    tokens,
                    base_score,
                )
                .with_signals(matched),
            );
            if results.len() >= max_results || spent_tokens >= budget_tokens {
                break;
            }
        }
    }
    results
}
