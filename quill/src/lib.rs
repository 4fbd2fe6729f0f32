#![deny(missing_docs)]
//! # quill — umbrella crate
//!
//! Single import surface for the quill coding-assistant core. Re-exports
//! the member crates behind feature flags, plus a `prelude` for the happy
//! path and [`default_transforms`] to assemble the provider-transform
//! registry.

pub use quill_types;

#[cfg(feature = "core")]
pub use quill_context;
#[cfg(feature = "core")]
pub use quill_evidence;
#[cfg(feature = "core")]
pub use quill_sandbox;
#[cfg(feature = "core")]
pub use quill_skills;
#[cfg(feature = "core")]
pub use quill_tool;

#[cfg(feature = "provider-anthropic")]
pub use quill_provider_anthropic;
#[cfg(feature = "provider-gemini")]
pub use quill_provider_gemini;
#[cfg(feature = "provider-openai")]
pub use quill_provider_openai;

/// Build a [`quill_types::TransformRegistry`] holding every transform this
/// build was compiled with.
#[must_use]
pub fn default_transforms() -> quill_types::TransformRegistry {
    let registry = quill_types::TransformRegistry::new();
    #[cfg(feature = "provider-anthropic")]
    registry.register(std::sync::Arc::new(
        quill_provider_anthropic::AnthropicTransform,
    ));
    #[cfg(feature = "provider-openai")]
    registry.register(std::sync::Arc::new(quill_provider_openai::OpenAiTransform));
    #[cfg(feature = "provider-gemini")]
    registry.register(std::sync::Arc::new(quill_provider_gemini::GeminiTransform));
    registry
}

/// Happy-path imports for composing a quill session.
pub mod prelude {
    pub use quill_types::{
        CompletionRequest, CompletionResult, ContentPart, CoreError, Message, ModelInfo, Provider,
        ProviderError, ProviderTransform, Role, StopReason, StreamEvent, StreamHandle, TokenUsage,
        ToolError, TransformConfig, TransformRegistry, TransformResult, pending_tool_uses,
        verify_tool_balance,
    };

    #[cfg(feature = "core")]
    pub use quill_tool::{
        AllowAll, DefinitionFilter, PermissionDecision, PermissionGate, Tool, ToolContext,
        ToolKind, ToolRegistry, dispatch,
    };

    #[cfg(feature = "core")]
    pub use quill_sandbox::{
        DangerousCommandDetector, PolicyDecision, PolicyEngine, SandboxConfig, ShellTool,
        TrustPreset, execute, security_check,
    };

    #[cfg(feature = "core")]
    pub use quill_evidence::{
        EngineConfig, Evidence, EvidenceEngine, EvidenceProvider, Intent, Signal, TurnContext,
    };

    #[cfg(feature = "core")]
    pub use quill_context::{CompactionRecord, CompactionTracker, load_stats, save_stats};

    #[cfg(feature = "core")]
    pub use quill_skills::{SkillFrontmatter, discover_instruction_files, parse_skill_file};

    #[cfg(feature = "provider-anthropic")]
    pub use quill_provider_anthropic::{Anthropic, AnthropicTransform};
    #[cfg(feature = "provider-gemini")]
    pub use quill_provider_gemini::{Gemini, GeminiTransform};
    #[cfg(feature = "provider-openai")]
    pub use quill_provider_openai::{OpenAi, OpenAiTransform};
}

#[cfg(test)]
mod tests {
    #[test]
    #[cfg(all(
        feature = "provider-anthropic",
        feature = "provider-openai",
        feature = "provider-gemini"
    ))]
    fn default_registry_holds_all_three_families() {
        let registry = super::default_transforms();
        assert_eq!(registry.ids(), vec!["anthropic", "gemini", "openai"]);
        assert!(registry.get("Gemini").is_some());
    }
}
