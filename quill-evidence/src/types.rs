//! Evidence and signal types.

use serde::{Deserialize, Serialize};

/// What kind of token a signal carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    /// An identifier-looking token (CamelCase, snake_case).
    Symbol,
    /// A file-path-looking token.
    Path,
    /// An error class or message fragment.
    ErrorToken,
}

/// Where a signal was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// The user's message for this turn.
    UserMessage,
    /// The set of files currently open in the editor.
    WorkingSet,
    /// Recent error output.
    ErrorOutput,
    /// A stack trace frame.
    StackTrace,
}

/// A retrieval target extracted from the turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// What kind of token this is.
    pub signal_type: SignalType,
    /// The token itself.
    pub value: String,
    /// Where it came from.
    pub source: SignalSource,
    /// How confident the extractor is, in `[0, 1]`.
    pub confidence: f64,
}

impl Signal {
    /// Build a signal, clamping confidence into `[0, 1]`.
    #[must_use]
    pub fn new(
        signal_type: SignalType,
        value: impl Into<String>,
        source: SignalSource,
        confidence: f64,
    ) -> Self {
        Self {
            signal_type,
            value: value.into(),
            source,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Which retrieval backend produced a piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Recently changed hunks from version control.
    Diff,
    /// Definitions and references from the language server.
    Lsp,
    /// Text search over the workspace.
    Search,
}

impl ProviderKind {
    /// Stable name for telemetry keys and logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::Diff => "diff",
            ProviderKind::Lsp => "lsp",
            ProviderKind::Search => "search",
        }
    }
}

/// A line range within a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineRange {
    /// First line, zero-based.
    pub start: u32,
    /// One past the last line.
    pub end: u32,
}

/// Optional provenance details on a piece of evidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceMetadata {
    /// Depth of the stack frame this snippet came from (0 = innermost).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_depth: Option<u32>,
    /// Symbol kind reported by the language server (e.g. `"function"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_kind: Option<String>,
}

/// A retrieved code snippet with provenance and score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Unique id within the turn.
    pub id: String,
    /// Which backend produced it.
    pub provider: ProviderKind,
    /// File the snippet comes from.
    pub path: String,
    /// Line range of the snippet.
    pub range: LineRange,
    /// The snippet text.
    pub content: String,
    /// Token cost of including the snippet. Always positive.
    pub tokens: u64,
    /// Provider-assigned relevance before reranking. Never negative.
    pub base_score: f64,
    /// Signals that led to this snippet.
    #[serde(default)]
    pub matched_signals: Vec<Signal>,
    /// Optional provenance details.
    #[serde(default)]
    pub metadata: EvidenceMetadata,
    /// Score after reranking; set by the rerank phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f64>,
}

impl Evidence {
    /// Build evidence with the invariants enforced: `tokens` is floored at
    /// 1 and `base_score` at 0.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        provider: ProviderKind,
        path: impl Into<String>,
        range: LineRange,
        content: impl Into<String>,
        tokens: u64,
        base_score: f64,
    ) -> Self {
        Self {
            id: id.into(),
            provider,
            path: path.into(),
            range,
            content: content.into(),
            tokens: tokens.max(1),
            base_score: base_score.max(0.0),
            matched_signals: Vec::new(),
            metadata: EvidenceMetadata::default(),
            final_score: None,
        }
    }

    /// Attach matched signals.
    #[must_use]
    pub fn with_signals(mut self, signals: Vec<Signal>) -> Self {
        self.matched_signals = signals;
        self
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: EvidenceMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}
