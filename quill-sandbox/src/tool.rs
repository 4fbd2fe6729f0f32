//! The shell tool: sandboxed command execution behind the security check.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use quill_tool::{Tool, ToolContext, ToolFuture, ToolKind};
use quill_types::ToolError;

use crate::config::SandboxConfig;
use crate::dangerous::DangerousCommandDetector;
use crate::exec::execute;
use crate::policy::{PolicyDecision, PolicyEngine, security_check};

#[derive(Debug, Deserialize, JsonSchema)]
struct ShellInput {
    /// The shell command to run.
    command: String,
    /// Override for the wall-clock budget, in milliseconds.
    timeout_ms: Option<u64>,
}

/// Runs shell commands inside the sandbox.
///
/// Every command passes [`security_check`] first: a `deny` becomes a
/// permission error, an `ask` is treated as denied here (interactive
/// confirmation is the permission gate's job, upstream in dispatch).
pub struct ShellTool {
    config: SandboxConfig,
    engine: Arc<PolicyEngine>,
    detector: Arc<DangerousCommandDetector>,
}

impl ShellTool {
    /// Build a shell tool over the given sandbox configuration and policy.
    #[must_use]
    pub fn new(
        config: SandboxConfig,
        engine: Arc<PolicyEngine>,
        detector: Arc<DangerousCommandDetector>,
    ) -> Self {
        Self {
            config,
            engine,
            detector,
        }
    }
}

impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run a shell command in the sandbox and return its output and exit code."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(ShellInput)).expect("derived schema serializes")
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Shell
    }

    fn category(&self) -> &str {
        "execution"
    }

    fn execute(&self, input: serde_json::Value, ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin(async move {
            let args: ShellInput =
                serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))?;

            let verdict = security_check(&args.command, &self.engine, &self.detector);
            match verdict.decision {
                PolicyDecision::Allow => {}
                PolicyDecision::Deny => {
                    return Err(ToolError::PermissionDenied(verdict.reason));
                }
                PolicyDecision::Ask => {
                    return Err(ToolError::PermissionDenied(format!(
                        "requires confirmation: {}",
                        verdict.reason
                    )));
                }
            }

            let mut config = self.config.clone();
            if let Some(timeout_ms) = args.timeout_ms {
                config.resources.wall_time_ms = timeout_ms.min(config.resources.wall_time_ms);
            }
            config.working_dir = ctx.cwd.clone();
            // The environment is scrubbed; the shell still needs a PATH.
            config
                .environment
                .entry("PATH".to_string())
                .or_insert_with(|| "/usr/local/bin:/usr/bin:/bin".to_string());

            let argv = vec!["/bin/sh".to_string(), "-c".to_string(), args.command];
            let result = execute(&argv, None, &config, ctx.cancellation_token.clone())
                .await
                .map_err(|e| match e {
                    quill_types::SandboxError::ExecutionFailed(msg) if msg == "cancelled" => {
                        ToolError::Cancelled
                    }
                    other => ToolError::ExecutionFailed(Box::new(other)),
                })?;

            Ok(json!({
                "exit_code": result.exit_code,
                "stdout": result.stdout,
                "stderr": result.stderr,
                "wall_ms": result.wall_ms,
                "truncated": {
                    "stdout": result.truncated.stdout,
                    "stderr": result.truncated.stderr,
                },
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrustPreset;

    fn shell_tool() -> ShellTool {
        ShellTool::new(
            SandboxConfig::from_preset(TrustPreset::Default, std::env::temp_dir()),
            Arc::new(PolicyEngine::new(PolicyDecision::Allow)),
            Arc::new(DangerousCommandDetector::new()),
        )
    }

    #[tokio::test]
    async fn runs_an_allowed_command() {
        let out = shell_tool()
            .execute(json!({"command": "echo sandboxed"}), ToolContext::default())
            .await
            .unwrap();
        assert_eq!(out["exit_code"], 0);
        assert_eq!(out["stdout"].as_str().unwrap().trim(), "sandboxed");
    }

    #[tokio::test]
    async fn denies_critical_commands() {
        let err = shell_tool()
            .execute(json!({"command": "sudo rm -rf /"}), ToolContext::default())
            .await
            .unwrap_err();
        match err {
            ToolError::PermissionDenied(reason) => {
                assert!(reason.contains("rm-root"), "reason: {reason}");
            }
            other => panic!("expected PermissionDenied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn high_severity_requires_confirmation() {
        let err = shell_tool()
            .execute(json!({"command": "sudo apt update"}), ToolContext::default())
            .await
            .unwrap_err();
        match err {
            ToolError::PermissionDenied(reason) => {
                assert!(reason.contains("requires confirmation"), "reason: {reason}");
            }
            other => panic!("expected PermissionDenied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_override_cannot_exceed_the_preset() {
        let tool = shell_tool();
        // A huge override is clamped to the preset's wall budget, and a tiny
        // one takes effect.
        let out = tool
            .execute(
                json!({"command": "sleep 2", "timeout_ms": 50}),
                ToolContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(out["exit_code"], crate::exec::EXIT_CODE_TIMEOUT);
    }

    #[test]
    fn schema_declares_command_required() {
        let schema = shell_tool().input_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert!(required.contains(&"command"));
    }
}
