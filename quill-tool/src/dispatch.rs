//! Tool dispatch: lookup, validation, permission gating, execution.
//!
//! Every outcome becomes a `ToolResult` content part so the canonical
//! history stays balanced, including rejections and cancellations.

use serde_json::Value;

use quill_types::{ContentPart, ToolError, ToolResultContent};

use crate::schema::validate_input;
use crate::{Tool, ToolContext, ToolKind, ToolRegistry};

/// Decision from the permission gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    /// Allow this call only.
    Once,
    /// Allow this call and remember the grant.
    Always,
    /// Reject the call.
    Reject,
}

/// Gate consulted before `Shell` and `Write` tools run.
///
/// The interactive confirmation UI lives outside this crate; tests and
/// non-interactive callers use [`AllowAll`].
pub trait PermissionGate: Send + Sync {
    /// Decide whether the given call may proceed.
    fn decide(&self, tool: &dyn Tool, input: &Value) -> PermissionDecision;
}

/// A gate that grants everything.
pub struct AllowAll;

impl PermissionGate for AllowAll {
    fn decide(&self, _tool: &dyn Tool, _input: &Value) -> PermissionDecision {
        PermissionDecision::Always
    }
}

/// A gate that rejects everything.
pub struct RejectAll;

impl PermissionGate for RejectAll {
    fn decide(&self, _tool: &dyn Tool, _input: &Value) -> PermissionDecision {
        PermissionDecision::Reject
    }
}

/// Resolve and run one tool use, producing the paired `ToolResult` part.
///
/// Failure modes all land in the result rather than an `Err`:
/// - unknown tool → `is_error` with the lookup failure
/// - schema mismatch → `is_error` with the validation failure
/// - permission `Reject` → `is_error`, `"permission denied"`
/// - cancellation mid-call → `is_error`, `"cancelled"`
pub async fn dispatch(
    registry: &ToolRegistry,
    gate: &dyn PermissionGate,
    tool_use_id: &str,
    name: &str,
    input: Value,
    ctx: ToolContext,
) -> ContentPart {
    match run(registry, gate, name, input, ctx).await {
        Ok(value) => ContentPart::ToolResult {
            tool_use_id: tool_use_id.to_string(),
            content: ToolResultContent::Json(value),
            is_error: false,
        },
        Err(err) => {
            tracing::warn!(tool = name, error = %err, "tool call failed");
            let content = match &err {
                ToolError::PermissionDenied(_) => "permission denied".to_string(),
                ToolError::Cancelled => "cancelled".to_string(),
                other => other.to_string(),
            };
            ContentPart::ToolResult {
                tool_use_id: tool_use_id.to_string(),
                content: ToolResultContent::Text(content),
                is_error: true,
            }
        }
    }
}

async fn run(
    registry: &ToolRegistry,
    gate: &dyn PermissionGate,
    name: &str,
    input: Value,
    ctx: ToolContext,
) -> Result<Value, ToolError> {
    let tool = registry
        .get(name)
        .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

    if !registry.is_enabled(name) {
        return Err(ToolError::NotFound(format!("{name} (disabled)")));
    }

    validate_input(&input, &tool.input_schema())?;

    if matches!(tool.kind(), ToolKind::Shell | ToolKind::Write)
        && gate.decide(tool.as_ref(), &input) == PermissionDecision::Reject
    {
        return Err(ToolError::PermissionDenied(name.to_string()));
    }

    let cancel = ctx.cancellation_token.clone();
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ToolError::Cancelled),
        result = tool.execute(input, ctx) => result,
    }
}
