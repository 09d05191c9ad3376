// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolResult};
use crate::workspace::Workspace;

pub struct ListTool {
    workspace: Arc<Workspace>,
}

impl ListTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ListTool {
    fn name(&self) -> &str {
        "list"
    }

    fn description(&self) -> &str {
        "List one directory level. Directories carry a trailing '/'.\n\
         Defaults to the working directory; pass 'path' for a subtree."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to list (optional)" }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let root = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => self.workspace.resolve(p),
            None => self.workspace.primary(),
        };

        let mut read_dir = match tokio::fs::read_dir(&root).await {
            Ok(rd) => rd,
            Err(e) => {
                return ToolResult::err(call, format!("cannot list {}: {e}", root.display()))
            }
        };

        let mut entries: Vec<String> = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(if is_dir { format!("{name}/") } else { name });
        }
        entries.sort();

        ToolResult::ok(call, json!({ "entries": entries }))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn setup() -> (ListTool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        std::fs::write(dir.path().join("file.txt"), "").unwrap();
        let tool = ListTool::new(Arc::new(Workspace::new(dir.path())));
        (tool, dir)
    }

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall { id: "l1".into(), name: "list".into(), args }
    }

    #[tokio::test]
    async fn lists_sorted_with_dir_suffix() {
        let (tool, _dir) = setup();
        let out = tool.execute(&call(json!({}))).await;
        assert!(!out.is_error);
        let entries = out.output["entries"].as_array().unwrap();
        assert_eq!(entries[0], "file.txt");
        assert_eq!(entries[1], "subdir/");
    }

    #[tokio::test]
    async fn lists_explicit_subdirectory() {
        let (tool, dir) = setup();
        std::fs::write(dir.path().join("subdir/inner.rs"), "").unwrap();
        let out = tool.execute(&call(json!({"path": "subdir"}))).await;
        assert_eq!(out.output["entries"][0], "inner.rs");
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let (tool, _dir) = setup();
        assert!(tool.execute(&call(json!({"path": "ghost"}))).await.is_error);
    }
}
