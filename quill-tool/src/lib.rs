#![deny(missing_docs)]
//! Tool interface and registry for quill.
//!
//! Defines the object-safe [`Tool`] trait and [`ToolRegistry`] for managing
//! collections of tools. Registration is last-writer-wins under a
//! case-insensitive name; the original casing is kept for display and for
//! the JSON-Schema export sent to models.

pub mod builtin;
pub mod dispatch;
pub mod schema;

pub use builtin::register_builtins;
pub use dispatch::{AllowAll, PermissionDecision, PermissionGate, RejectAll, dispatch};
pub use schema::{SchemaTarget, sanitize_schema, validate_input};

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use quill_types::{ToolError, ToolSpec};

/// What a tool does to the world, for permission gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Reads files or state; never mutates.
    Read,
    /// Writes files or state.
    Write,
    /// Runs subprocesses.
    Shell,
    /// Operates on the assistant itself (mode switches, budgets).
    Meta,
}

/// Runtime context provided to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Current working directory.
    pub cwd: PathBuf,
    /// Session identifier.
    pub session_id: String,
    /// Environment variables visible to the tool.
    pub environment: HashMap<String, String>,
    /// Token for cooperative cancellation.
    pub cancellation_token: CancellationToken,
}

impl Default for ToolContext {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/tmp")),
            session_id: String::new(),
            environment: HashMap::new(),
            cancellation_token: CancellationToken::new(),
        }
    }
}

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> =
    Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + 'a>>;

/// Object-safe trait for tool implementations.
///
/// Tools are stored as `Arc<dyn Tool>` in [`ToolRegistry`]. The structured
/// JSON result is wrapped into a canonical `ToolResult` by the dispatcher.
pub trait Tool: Send + Sync {
    /// The tool's unique name (alphanumeric plus underscores).
    fn name(&self) -> &str;

    /// Human-readable description for model grounding.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's input parameters.
    fn input_schema(&self) -> serde_json::Value;

    /// What the tool does to the world.
    fn kind(&self) -> ToolKind;

    /// Grouping category for display and filtering.
    fn category(&self) -> &str {
        "general"
    }

    /// Execute the tool with the given input.
    fn execute(&self, input: serde_json::Value, ctx: ToolContext) -> ToolFuture<'_>;
}

/// One exported tool definition, as sent to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Display name (original registration casing).
    pub name: String,
    /// Description for grounding.
    pub description: String,
    /// Sanitized JSON Schema for the input.
    pub parameters: serde_json::Value,
    /// Tool kind.
    pub kind: ToolKind,
}

impl ToolDefinition {
    /// Convert to the provider-facing [`ToolSpec`].
    #[must_use]
    pub fn into_spec(self) -> ToolSpec {
        ToolSpec {
            name: self.name,
            description: self.description,
            input_schema: self.parameters,
        }
    }
}

/// Filter for [`ToolRegistry::definitions`].
#[derive(Debug, Clone)]
pub struct DefinitionFilter {
    /// Restrict to these kinds; `None` = all kinds.
    pub kinds: Option<Vec<ToolKind>>,
    /// Skip disabled tools. Defaults to true.
    pub enabled_only: bool,
    /// Schema dialect of the consumer.
    pub target: SchemaTarget,
}

impl Default for DefinitionFilter {
    fn default() -> Self {
        Self::all_enabled()
    }
}

impl DefinitionFilter {
    /// The default export filter: every enabled tool, standard schemas.
    #[must_use]
    pub fn all_enabled() -> Self {
        Self {
            kinds: None,
            enabled_only: true,
            target: SchemaTarget::Standard,
        }
    }

    /// Restrict to the given kinds.
    #[must_use]
    pub fn with_kinds(mut self, kinds: Vec<ToolKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    /// Export schemas for a Gemini-style consumer.
    #[must_use]
    pub fn for_gemini(mut self) -> Self {
        self.target = SchemaTarget::Gemini;
        self
    }
}

struct RegistryEntry {
    tool: Arc<dyn Tool>,
    /// Casing from the most recent registration, used for display.
    display_name: String,
    enabled: bool,
}

/// Registry of tools available to a session.
///
/// Read-mostly after startup; re-registration (dynamic tools) takes the
/// write lock briefly and is safe against concurrent readers.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, RegistryEntry>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Silently overwrites a prior registration of the
    /// same case-insensitive name; dynamic tools may re-register.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let display_name = tool.name().to_string();
        let key = display_name.to_ascii_lowercase();
        self.tools.write().expect("tool registry lock poisoned").insert(
            key,
            RegistryEntry {
                tool,
                display_name,
                enabled: true,
            },
        );
    }

    /// Look up a tool by name, case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .get(&name.to_ascii_lowercase())
            .map(|entry| Arc::clone(&entry.tool))
    }

    /// Whether a tool with this name is registered.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .contains_key(&name.to_ascii_lowercase())
    }

    /// All registered tools, sorted by display name.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        let guard = self.tools.read().expect("tool registry lock poisoned");
        let mut entries: Vec<_> = guard.values().collect();
        entries.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        entries.iter().map(|e| Arc::clone(&e.tool)).collect()
    }

    /// All registered tools of the given kind, sorted by display name.
    #[must_use]
    pub fn list_by_kind(&self, kind: ToolKind) -> Vec<Arc<dyn Tool>> {
        self.list()
            .into_iter()
            .filter(|tool| tool.kind() == kind)
            .collect()
    }

    /// Enable or disable a tool. Returns false if the name is unknown.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut guard = self.tools.write().expect("tool registry lock poisoned");
        match guard.get_mut(&name.to_ascii_lowercase()) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Whether a tool is currently enabled. Unknown names report false.
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .get(&name.to_ascii_lowercase())
            .is_some_and(|entry| entry.enabled)
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read().expect("tool registry lock poisoned").len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Export tool definitions for model consumption.
    ///
    /// Schemas are sanitized per the filter's [`SchemaTarget`]: `$schema`,
    /// `$id`, `$ref`, `patternProperties`, and `propertyNames` are always
    /// stripped; Gemini-style consumers additionally get
    /// `exclusiveMinimum`/`exclusiveMaximum` folded into
    /// `minimum`/`maximum`.
    #[must_use]
    pub fn definitions(&self, filter: &DefinitionFilter) -> Vec<ToolDefinition> {
        let guard = self.tools.read().expect("tool registry lock poisoned");
        let mut entries: Vec<_> = guard
            .values()
            .filter(|entry| !filter.enabled_only || entry.enabled)
            .filter(|entry| {
                filter
                    .kinds
                    .as_ref()
                    .is_none_or(|kinds| kinds.contains(&entry.tool.kind()))
            })
            .collect();
        entries.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        entries
            .into_iter()
            .map(|entry| ToolDefinition {
                name: entry.display_name.clone(),
                description: entry.tool.description().to_string(),
                parameters: sanitize_schema(&entry.tool.input_schema(), filter.target),
                kind: entry.tool.kind(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "Echo"
        }
        fn description(&self) -> &str {
            "Echoes input back"
        }
        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {"msg": {"type": "string"}}})
        }
        fn kind(&self) -> ToolKind {
            ToolKind::Read
        }
        fn execute(&self, input: serde_json::Value, _ctx: ToolContext) -> ToolFuture<'_> {
            Box::pin(async move { Ok(json!({"echoed": input})) })
        }
    }

    struct ShellishTool;

    impl Tool for ShellishTool {
        fn name(&self) -> &str {
            "run_command"
        }
        fn description(&self) -> &str {
            "Runs a command"
        }
        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        fn kind(&self) -> ToolKind {
            ToolKind::Shell
        }
        fn execute(&self, _input: serde_json::Value, _ctx: ToolContext) -> ToolFuture<'_> {
            Box::pin(async { Ok(json!({})) })
        }
    }

    fn _assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn tool_is_object_safe() {
        _assert_send_sync::<Arc<dyn Tool>>();
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        assert!(reg.get("echo").is_some());
        assert!(reg.get("ECHO").is_some());
        assert!(reg.get("Echo").is_some());
        assert!(reg.get("missing").is_none());
    }

    #[test]
    fn registration_is_last_writer_wins() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        reg.register(Arc::new(EchoTool));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn display_name_preserves_original_casing() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        let defs = reg.definitions(&DefinitionFilter::all_enabled());
        assert_eq!(defs[0].name, "Echo");
    }

    #[test]
    fn list_by_kind_filters() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        reg.register(Arc::new(ShellishTool));
        assert_eq!(reg.list_by_kind(ToolKind::Shell).len(), 1);
        assert_eq!(reg.list_by_kind(ToolKind::Read).len(), 1);
        assert_eq!(reg.list_by_kind(ToolKind::Write).len(), 0);
    }

    #[test]
    fn disabled_tools_are_excluded_from_definitions() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        reg.register(Arc::new(ShellishTool));
        assert!(reg.set_enabled("echo", false));
        let defs = reg.definitions(&DefinitionFilter::all_enabled());
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "run_command");
        assert!(!reg.is_enabled("echo"));
    }

    #[test]
    fn set_enabled_unknown_tool_reports_false() {
        let reg = ToolRegistry::new();
        assert!(!reg.set_enabled("ghost", true));
    }

    #[test]
    fn definitions_filter_by_kind() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        reg.register(Arc::new(ShellishTool));
        let defs = reg.definitions(
            &DefinitionFilter::all_enabled().with_kinds(vec![ToolKind::Shell]),
        );
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].kind, ToolKind::Shell);
    }

    #[tokio::test]
    async fn execute_through_registry() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        let tool = reg.get("echo").unwrap();
        let out = tool
            .execute(json!({"msg": "hi"}), ToolContext::default())
            .await
            .unwrap();
        assert_eq!(out, json!({"echoed": {"msg": "hi"}}));
    }
}
