//! Core message and request/response types.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message (instructions).
    System,
    /// User message.
    User,
    /// Assistant (model) message.
    Assistant,
}

/// Source for image content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    /// Raw base64-encoded image data.
    Base64 {
        /// The base64-encoded data.
        data: String,
    },
    /// URL pointing to an image.
    Url {
        /// The image URL.
        url: String,
    },
    /// A `data:<media-type>;base64,<payload>` URL.
    DataUrl {
        /// The full data URL.
        url: String,
    },
}

impl ImageSource {
    /// Extract the media type and base64 payload from a data URL.
    ///
    /// Returns `None` for `Base64` and `Url` sources, and for data URLs that
    /// are not base64-encoded.
    #[must_use]
    pub fn data_url_parts(&self) -> Option<(&str, &str)> {
        let ImageSource::DataUrl { url } = self else {
            return None;
        };
        let rest = url.strip_prefix("data:")?;
        let (media_type, payload) = rest.split_once(";base64,")?;
        Some((media_type, payload))
    }
}

/// Content of a tool result: plain text or structured JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    /// Plain text output.
    Text(String),
    /// Structured JSON output.
    Json(serde_json::Value),
}

impl ToolResultContent {
    /// Render the content as text for providers that only accept strings.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            ToolResultContent::Text(t) => t.clone(),
            ToolResultContent::Json(v) => v.to_string(),
        }
    }
}

impl From<String> for ToolResultContent {
    fn from(s: String) -> Self {
        ToolResultContent::Text(s)
    }
}

impl From<&str> for ToolResultContent {
    fn from(s: &str) -> Self {
        ToolResultContent::Text(s.to_string())
    }
}

/// Smallest and largest accepted image dimension, in pixels.
pub const IMAGE_DIMENSION_RANGE: (f64, f64) = (1.0, 16384.0);

/// Dimension assumed when an image does not declare one.
pub const DEFAULT_IMAGE_DIMENSION: f64 = 1024.0;

/// A single content part within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// Image content.
    Image {
        /// The image source.
        source: ImageSource,
        /// MIME type of the image (e.g. `"image/png"`).
        media_type: String,
        /// Pixel width, when known.
        #[serde(skip_serializing_if = "Option::is_none")]
        width: Option<f64>,
        /// Pixel height, when known.
        #[serde(skip_serializing_if = "Option::is_none")]
        height: Option<f64>,
    },
    /// A tool use request from the model.
    ToolUse {
        /// Unique identifier for this tool use.
        id: String,
        /// Name of the tool to invoke.
        name: String,
        /// Tool input parameters.
        input: serde_json::Value,
    },
    /// Result from a tool execution.
    ToolResult {
        /// The tool_use id this result corresponds to.
        tool_use_id: String,
        /// The result content.
        content: ToolResultContent,
        /// Whether the tool execution errored.
        is_error: bool,
    },
}

impl ContentPart {
    /// Normalized image dimensions: missing or non-finite values default to
    /// 1024, then both sides are clamped into `[1, 16384]`.
    ///
    /// Returns `None` for non-image parts.
    #[must_use]
    pub fn image_dimensions(&self) -> Option<(f64, f64)> {
        let ContentPart::Image { width, height, .. } = self else {
            return None;
        };
        Some((normalize_dimension(*width), normalize_dimension(*height)))
    }
}

/// Normalize one image dimension per the canonical-model rules.
#[must_use]
pub fn normalize_dimension(dim: Option<f64>) -> f64 {
    let (lo, hi) = IMAGE_DIMENSION_RANGE;
    match dim {
        Some(d) if d.is_finite() => d.clamp(lo, hi),
        _ => DEFAULT_IMAGE_DIMENSION,
    }
}

/// A message in a conversation.
///
/// Messages are append-only: once in the history they are never mutated.
/// Compaction replaces a contiguous range with a new message carrying
/// `is_summary = true` and the `condense_id` of the operation that produced
/// it; the replaced ids are reported to the compaction tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message author.
    pub role: Role,
    /// Content parts of the message.
    pub content: Vec<ContentPart>,
    /// Stable identifier, when the caller assigns one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Whether this message is a compaction summary.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_summary: bool,
    /// Identifier of the compaction that produced this summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condense_id: Option<String>,
}

impl Message {
    /// Create a message with the given role and content parts.
    #[must_use]
    pub fn new(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            role,
            content,
            id: None,
            is_summary: false,
            condense_id: None,
        }
    }

    /// Create a user message with a single text part.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentPart::Text { text: text.into() }])
    }

    /// Create an assistant message with a single text part.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(
            Role::Assistant,
            vec![ContentPart::Text { text: text.into() }],
        )
    }

    /// Create a system message with a single text part.
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentPart::Text { text: text.into() }])
    }

    /// Create a compaction summary message.
    #[must_use]
    pub fn summary(text: impl Into<String>, condense_id: impl Into<String>) -> Self {
        let mut msg = Self::assistant(text);
        msg.is_summary = true;
        msg.condense_id = Some(condense_id.into());
        msg
    }

    /// Attach a stable id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Concatenated text of all `Text` parts.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Verify the tool-use/tool-result pairing invariant over a conversation.
///
/// Every `ToolUse` emitted by an assistant must be answered by exactly one
/// `ToolResult` in a later message, and every `ToolResult` must reference a
/// previously seen `ToolUse`. Violations are protocol errors.
///
/// # Errors
///
/// Returns [`CoreError::Internal`] naming the offending id.
pub fn verify_tool_balance(messages: &[Message]) -> Result<(), CoreError> {
    let mut open: Vec<&str> = Vec::new();
    for msg in messages {
        for part in &msg.content {
            match part {
                ContentPart::ToolUse { id, .. } => open.push(id),
                ContentPart::ToolResult { tool_use_id, .. } => {
                    let Some(pos) = open.iter().position(|id| *id == tool_use_id) else {
                        return Err(CoreError::Internal(format!(
                            "tool_result references unknown tool_use id: {tool_use_id}"
                        )));
                    };
                    open.swap_remove(pos);
                }
                _ => {}
            }
        }
    }
    if let Some(id) = open.first() {
        return Err(CoreError::Internal(format!(
            "tool_use {id} has no matching tool_result"
        )));
    }
    Ok(())
}

/// Collect the `(id, name)` of every `ToolUse` that has no `ToolResult` yet.
///
/// A turn driver uses this after cancellation or an unhandled error to emit
/// synthetic error results so the history stays balanced.
#[must_use]
pub fn pending_tool_uses(messages: &[Message]) -> Vec<(String, String)> {
    let mut open: Vec<(String, String)> = Vec::new();
    for msg in messages {
        for part in &msg.content {
            match part {
                ContentPart::ToolUse { id, name, .. } => {
                    open.push((id.clone(), name.clone()));
                }
                ContentPart::ToolResult { tool_use_id, .. } => {
                    open.retain(|(id, _)| id != tool_use_id);
                }
                _ => {}
            }
        }
    }
    open
}

/// JSON Schema description of a tool, as sent to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name.
    pub name: String,
    /// Human-readable description for model grounding.
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: serde_json::Value,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Model produced a final response.
    EndTurn,
    /// Hit the max_tokens limit.
    MaxTokens,
    /// Hit a stop sequence.
    StopSequence,
    /// Model wants to use a tool.
    ToolUse,
    /// Content was filtered by safety.
    ContentFilter,
    /// The provider reported a failure mid-generation.
    Error,
}

/// Token usage from a single provider call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens generated.
    pub output_tokens: u64,
    /// Tokens read from cache (if supported).
    pub cache_read_tokens: Option<u64>,
    /// Tokens written to cache (if supported).
    pub cache_creation_tokens: Option<u64>,
    /// Tokens spent on reasoning/thinking (if reported).
    pub reasoning_tokens: Option<u64>,
}

/// A completion request to an LLM provider.
///
/// System instructions travel as `Role::System` messages; each transform
/// relocates them to wherever its wire format expects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier (empty = provider default).
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Available tools.
    pub tools: Vec<ToolSpec>,
    /// Maximum output tokens.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,
    /// Sequences that stop generation.
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    /// Whether to request prompt caching where the vendor supports it.
    #[serde(default)]
    pub enable_caching: bool,
    /// Provider-specific extra fields forwarded verbatim.
    pub extra: Option<serde_json::Value>,
}

/// A tool call extracted from a parsed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Vendor-assigned (or synthesized) call id.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Input arguments.
    pub input: serde_json::Value,
    /// Opaque vendor token carried alongside tool calls from thinking
    /// models (Gemini 2.5+); absent elsewhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

/// A completion response in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    /// Concatenated text content.
    pub content: String,
    /// Reasoning/thinking text, when the model emitted any.
    pub thinking: Option<String>,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolInvocation>,
    /// Why the model stopped.
    pub stop_reason: StopReason,
    /// Token usage.
    pub usage: TokenUsage,
}

/// Capability flags for a model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    /// Supports tool/function calling.
    pub tools: bool,
    /// Accepts image input.
    pub vision: bool,
    /// Emits reasoning/thinking content.
    pub reasoning: bool,
    /// Supports streamed output.
    pub streaming: bool,
    /// Supports prompt caching.
    pub prompt_cache: bool,
}

/// A pricing tier for long-context surcharges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTier {
    /// Input-token threshold above which this tier applies.
    pub threshold_tokens: u64,
    /// Input price per million tokens, in USD.
    pub input_per_mtok: rust_decimal::Decimal,
    /// Output price per million tokens, in USD.
    pub output_per_mtok: rust_decimal::Decimal,
}

/// Per-million-token pricing for a model, in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Input price per million tokens.
    pub input_per_mtok: rust_decimal::Decimal,
    /// Output price per million tokens.
    pub output_per_mtok: rust_decimal::Decimal,
    /// Cache-read price per million tokens, where supported.
    pub cache_read_per_mtok: Option<rust_decimal::Decimal>,
    /// Cache-write price per million tokens, where supported.
    pub cache_write_per_mtok: Option<rust_decimal::Decimal>,
    /// Long-context surcharge tiers, most vendors have none.
    #[serde(default)]
    pub tiers: Vec<PricingTier>,
}

/// Information about an available model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier as accepted by the API.
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Context window size in tokens.
    pub context_window: u64,
    /// Maximum output tokens per request.
    pub max_output_tokens: u64,
    /// Capability flags.
    pub capabilities: ModelCapabilities,
    /// Pricing, when known.
    pub pricing: Option<ModelPricing>,
}

/// Outcome of a credential validation probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialReport {
    /// Whether the credential (or local server) is usable.
    pub valid: bool,
    /// Human-readable failure description.
    pub error: Option<String>,
    /// Non-fatal observations (e.g. key looks unusual but worked).
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl CredentialReport {
    /// A passing report.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            valid: true,
            error: None,
            warnings: Vec::new(),
        }
    }

    /// A failing report with the given message.
    #[must_use]
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            warnings: Vec::new(),
        }
    }
}
