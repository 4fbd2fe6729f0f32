//! The provider-transform contract and its registry.
//!
//! A transform owns the bidirectional mapping between the canonical model
//! and one vendor's wire format. Lossy translations never fail the call;
//! they attach [`TransformWarning`]s the turn driver can log.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::types::{CompletionResult, Message, ToolSpec};

/// Severity of a transform warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningSeverity {
    /// Informational; nothing was lost.
    Info,
    /// Content was altered or degraded.
    Warning,
    /// Content was dropped.
    Error,
}

/// A non-fatal note about a lossy or degraded translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformWarning {
    /// Stable machine-readable code (e.g. `MISSING_TOOL_NAME`).
    pub code: String,
    /// How severe the loss is.
    pub severity: WarningSeverity,
    /// Human-readable description.
    pub message: String,
    /// The field that was affected, when identifiable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The original value, when small enough to carry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_value: Option<serde_json::Value>,
    /// The value actually sent, when small enough to carry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transformed_value: Option<serde_json::Value>,
}

impl TransformWarning {
    /// Create a warning with the given code, severity, and message.
    #[must_use]
    pub fn new(
        code: impl Into<String>,
        severity: WarningSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            severity,
            message: message.into(),
            field: None,
            original_value: None,
            transformed_value: None,
        }
    }

    /// Attach the affected field name.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Attach the original and transformed values.
    #[must_use]
    pub fn with_values(
        mut self,
        original: serde_json::Value,
        transformed: serde_json::Value,
    ) -> Self {
        self.original_value = Some(original);
        self.transformed_value = Some(transformed);
        self
    }
}

/// Warning code: a tool result could not be matched to a tool name.
pub const MISSING_TOOL_NAME: &str = "MISSING_TOOL_NAME";
/// Warning code: a content part has no representation in the target format.
pub const UNSUPPORTED_CONTENT_TYPE: &str = "UNSUPPORTED_CONTENT_TYPE";
/// Warning code: a thinking-model tool call had no thought signature.
pub const MISSING_THOUGHT_SIGNATURE: &str = "MISSING_THOUGHT_SIGNATURE";
/// Warning code: a system message was inlined as user content.
pub const SYSTEM_ROLE_INLINED: &str = "SYSTEM_ROLE_INLINED";

/// A transform operation's output plus any warnings it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformResult<T> {
    /// The transformed value.
    pub data: T,
    /// Non-fatal notes about lossy translations.
    pub warnings: Vec<TransformWarning>,
}

impl<T> TransformResult<T> {
    /// A clean result with no warnings.
    #[must_use]
    pub fn clean(data: T) -> Self {
        Self {
            data,
            warnings: Vec::new(),
        }
    }

    /// A result with warnings attached.
    #[must_use]
    pub fn with_warnings(data: T, warnings: Vec<TransformWarning>) -> Self {
        Self { data, warnings }
    }
}

/// Configuration passed to every transform operation.
#[derive(Debug, Clone, Default)]
pub struct TransformConfig {
    /// The target model id; transforms use it to detect model families
    /// (e.g. thinking-capable Gemini models).
    pub model_id: String,
    /// Whether to annotate the request with prompt-cache markers.
    pub enable_caching: bool,
}

impl TransformConfig {
    /// Config for the given model with caching disabled.
    #[must_use]
    pub fn for_model(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            enable_caching: false,
        }
    }
}

/// Per-vendor translation between the canonical model and a wire format.
///
/// Object safe: the registry stores transforms as `Arc<dyn ProviderTransform>`.
/// All operations are synchronous and must not perform I/O.
pub trait ProviderTransform: Send + Sync {
    /// Stable identifier for the vendor family (e.g. `"anthropic"`).
    fn provider_id(&self) -> &str;

    /// Map canonical messages into the vendor's request shape.
    ///
    /// The returned value is the vendor-specific message payload: an array
    /// for Anthropic/OpenAI, an object with `contents` plus an optional
    /// `systemInstruction` for Gemini.
    fn transform_messages(
        &self,
        messages: &[Message],
        cfg: &TransformConfig,
    ) -> TransformResult<serde_json::Value>;

    /// Map tool specs into the vendor's tool array.
    fn transform_tools(
        &self,
        tools: &[ToolSpec],
        cfg: &TransformConfig,
    ) -> TransformResult<serde_json::Value>;

    /// Parse a vendor response body into a canonical [`CompletionResult`].
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidRequest`] when required fields are
    /// missing or malformed.
    fn parse_response(
        &self,
        response: &serde_json::Value,
        cfg: &TransformConfig,
    ) -> Result<TransformResult<CompletionResult>, ProviderError>;

    /// Annotate a vendor request body with ephemeral-cache markers.
    ///
    /// The default is a no-op for vendors without prompt caching.
    fn apply_caching(
        &self,
        _body: &mut serde_json::Value,
        _cfg: &TransformConfig,
    ) -> Vec<TransformWarning> {
        Vec::new()
    }
}

/// Registry of provider transforms, keyed case-insensitively by provider id.
///
/// Read-mostly after startup: re-registration only happens on configuration
/// changes, so lookups share a read lock.
#[derive(Default)]
pub struct TransformRegistry {
    transforms: RwLock<HashMap<String, Arc<dyn ProviderTransform>>>,
}

impl TransformRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transform. Overwrites any prior registration for the id.
    pub fn register(&self, transform: Arc<dyn ProviderTransform>) {
        let key = transform.provider_id().to_ascii_lowercase();
        self.transforms
            .write()
            .expect("transform registry lock poisoned")
            .insert(key, transform);
    }

    /// Look up a transform by provider id, case-insensitively.
    #[must_use]
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn ProviderTransform>> {
        self.transforms
            .read()
            .expect("transform registry lock poisoned")
            .get(&provider_id.to_ascii_lowercase())
            .cloned()
    }

    /// All registered provider ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .transforms
            .read()
            .expect("transform registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StopReason;

    struct NullTransform(&'static str);

    impl ProviderTransform for NullTransform {
        fn provider_id(&self) -> &str {
            self.0
        }

        fn transform_messages(
            &self,
            _messages: &[Message],
            _cfg: &TransformConfig,
        ) -> TransformResult<serde_json::Value> {
            TransformResult::clean(serde_json::Value::Array(vec![]))
        }

        fn transform_tools(
            &self,
            _tools: &[ToolSpec],
            _cfg: &TransformConfig,
        ) -> TransformResult<serde_json::Value> {
            TransformResult::clean(serde_json::Value::Array(vec![]))
        }

        fn parse_response(
            &self,
            _response: &serde_json::Value,
            _cfg: &TransformConfig,
        ) -> Result<TransformResult<CompletionResult>, ProviderError> {
            Ok(TransformResult::clean(CompletionResult {
                content: String::new(),
                thinking: None,
                tool_calls: vec![],
                stop_reason: StopReason::EndTurn,
                usage: crate::types::TokenUsage::default(),
            }))
        }
    }

    #[test]
    fn registry_lookup_is_case_insensitive() {
        let registry = TransformRegistry::new();
        registry.register(Arc::new(NullTransform("Anthropic")));
        assert!(registry.get("anthropic").is_some());
        assert!(registry.get("ANTHROPIC").is_some());
        assert!(registry.get("gemini").is_none());
    }

    #[test]
    fn registry_overwrites_same_id() {
        let registry = TransformRegistry::new();
        registry.register(Arc::new(NullTransform("openai")));
        registry.register(Arc::new(NullTransform("openai")));
        assert_eq!(registry.ids(), vec!["openai".to_string()]);
    }

    #[test]
    fn default_apply_caching_is_noop() {
        let transform = NullTransform("x");
        let mut body = serde_json::json!({"messages": []});
        let warnings = transform.apply_caching(&mut body, &TransformConfig::default());
        assert!(warnings.is_empty());
        assert_eq!(body, serde_json::json!({"messages": []}));
    }

    #[test]
    fn warning_builder_attaches_context() {
        let warning = TransformWarning::new(
            MISSING_TOOL_NAME,
            WarningSeverity::Warning,
            "no name for tool_use id",
        )
        .with_field("tool_use_id")
        .with_values(serde_json::json!("tu_1"), serde_json::json!("tu-1"));
        assert_eq!(warning.code, MISSING_TOOL_NAME);
        assert_eq!(warning.field.as_deref(), Some("tool_use_id"));
        assert!(warning.original_value.is_some());
    }
}
