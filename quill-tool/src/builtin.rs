//! Built-in filesystem tools.
//!
//! The shell tool lives in `quill-sandbox`, next to the policy engine that
//! gates it. Input schemas are derived with `schemars`; the registry's
//! export pass strips the draft keys the derive adds.

use std::path::Path;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use quill_types::ToolError;

use crate::{Tool, ToolContext, ToolFuture, ToolKind};

fn schema_of<T: JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(T)).expect("derived schema serializes")
}

fn parse_input<T: for<'de> Deserialize<'de>>(input: serde_json::Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))
}

/// Resolve a possibly relative path against the tool context's cwd.
fn resolve(ctx: &ToolContext, path: &str) -> std::path::PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        ctx.cwd.join(p)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ReadFileInput {
    /// Path of the file to read, absolute or relative to the working directory.
    path: String,
    /// Maximum bytes to return. Defaults to 64 KiB.
    max_bytes: Option<u64>,
}

/// Reads a file from the workspace.
pub struct ReadFileTool;

impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file and return its contents. Large files are truncated."
    }

    fn input_schema(&self) -> serde_json::Value {
        schema_of::<ReadFileInput>()
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Read
    }

    fn category(&self) -> &str {
        "filesystem"
    }

    fn execute(&self, input: serde_json::Value, ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin(async move {
            let args: ReadFileInput = parse_input(input)?;
            let path = resolve(&ctx, &args.path);
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| ToolError::ExecutionFailed(Box::new(e)))?;
            let limit = args.max_bytes.unwrap_or(64 * 1024) as usize;
            let truncated = bytes.len() > limit;
            let shown = if truncated { &bytes[..limit] } else { &bytes[..] };
            let content = String::from_utf8_lossy(shown).into_owned();
            Ok(json!({
                "path": path.display().to_string(),
                "content": content,
                "truncated": truncated,
            }))
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct WriteFileInput {
    /// Path of the file to write.
    path: String,
    /// Full new contents of the file.
    content: String,
}

/// Writes a file, creating parent directories as needed.
pub struct WriteFileTool;

impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write the given content to a file, replacing any existing contents."
    }

    fn input_schema(&self) -> serde_json::Value {
        schema_of::<WriteFileInput>()
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Write
    }

    fn category(&self) -> &str {
        "filesystem"
    }

    fn execute(&self, input: serde_json::Value, ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin(async move {
            let args: WriteFileInput = parse_input(input)?;
            let path = resolve(&ctx, &args.path);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ToolError::ExecutionFailed(Box::new(e)))?;
            }
            tokio::fs::write(&path, args.content.as_bytes())
                .await
                .map_err(|e| ToolError::ExecutionFailed(Box::new(e)))?;
            Ok(json!({
                "path": path.display().to_string(),
                "bytes_written": args.content.len(),
            }))
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ListDirInput {
    /// Directory to list. Defaults to the working directory.
    path: Option<String>,
}

/// Lists a directory's entries.
pub struct ListDirTool;

impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the entries of a directory."
    }

    fn input_schema(&self) -> serde_json::Value {
        schema_of::<ListDirInput>()
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Read
    }

    fn category(&self) -> &str {
        "filesystem"
    }

    fn execute(&self, input: serde_json::Value, ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin(async move {
            let args: ListDirInput = parse_input(input)?;
            let path = resolve(&ctx, args.path.as_deref().unwrap_or("."));
            let mut reader = tokio::fs::read_dir(&path)
                .await
                .map_err(|e| ToolError::ExecutionFailed(Box::new(e)))?;
            let mut entries = Vec::new();
            while let Some(entry) = reader
                .next_entry()
                .await
                .map_err(|e| ToolError::ExecutionFailed(Box::new(e)))?
            {
                let is_dir = entry
                    .file_type()
                    .await
                    .map(|t| t.is_dir())
                    .unwrap_or(false);
                entries.push(json!({
                    "name": entry.file_name().to_string_lossy(),
                    "is_dir": is_dir,
                }));
            }
            entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
            Ok(json!({
                "path": path.display().to_string(),
                "entries": entries,
            }))
        })
    }
}

/// Register the built-in filesystem tools.
pub fn register_builtins(registry: &crate::ToolRegistry) {
    registry.register(std::sync::Arc::new(ReadFileTool));
    registry.register(std::sync::Arc::new(WriteFileTool));
    registry.register(std::sync::Arc::new(ListDirTool));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DefinitionFilter, ToolRegistry};

    fn ctx_in(dir: &std::path::Path) -> ToolContext {
        ToolContext {
            cwd: dir.to_path_buf(),
            ..ToolContext::default()
        }
    }

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());

        let out = WriteFileTool
            .execute(
                json!({"path": "notes/hello.txt", "content": "hi there"}),
                ctx.clone(),
            )
            .await
            .unwrap();
        assert_eq!(out["bytes_written"], 8);

        let out = ReadFileTool
            .execute(json!({"path": "notes/hello.txt"}), ctx)
            .await
            .unwrap();
        assert_eq!(out["content"], "hi there");
        assert_eq!(out["truncated"], false);
    }

    #[tokio::test]
    async fn read_truncates_at_max_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        std::fs::write(dir.path().join("big.txt"), "a".repeat(100)).unwrap();

        let out = ReadFileTool
            .execute(json!({"path": "big.txt", "max_bytes": 10}), ctx)
            .await
            .unwrap();
        assert_eq!(out["content"].as_str().unwrap().len(), 10);
        assert_eq!(out["truncated"], true);
    }

    #[tokio::test]
    async fn read_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = ReadFileTool
            .execute(json!({"path": "nope.txt"}), ctx_in(dir.path()))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn list_dir_sorts_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let out = ListDirTool
            .execute(json!({}), ctx_in(dir.path()))
            .await
            .unwrap();
        let names: Vec<&str> = out["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
    }

    #[test]
    fn builtin_schemas_export_clean() {
        let reg = ToolRegistry::new();
        register_builtins(&reg);
        for def in reg.definitions(&DefinitionFilter::all_enabled()) {
            assert!(def.parameters.get("$schema").is_none(), "{}", def.name);
            assert!(def.parameters["properties"].is_object(), "{}", def.name);
        }
    }
}
