// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use otto_channels::{UiQueue, UiUpdate};

use crate::diff::diff_summary;
use crate::patch::write_atomic;
use crate::tool::{Tool, ToolCall, ToolResult};
use crate::workspace::Workspace;

pub struct WriteTool {
    workspace: Arc<Workspace>,
    ui: Arc<UiQueue>,
}

impl WriteTool {
    pub fn new(workspace: Arc<Workspace>, ui: Arc<UiQueue>) -> Self {
        Self { workspace, ui }
    }
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Write a file, replacing any existing content. Parent directories are\n\
         created as needed. The replacement is atomic; a diff summary of the\n\
         change is shown to the user."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File to write" },
                "content": { "type": "string", "description": "Full new file content" }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(path) = call.args.get("path").and_then(|v| v.as_str()) else {
            return ToolResult::err(call, "missing 'path' parameter");
        };
        let Some(content) = call.args.get("content").and_then(|v| v.as_str()) else {
            return ToolResult::err(call, "missing 'content' parameter");
        };

        let resolved = self.workspace.resolve(path);
        debug!(path = %resolved.display(), bytes = content.len(), "write tool");

        if let Some(parent) = resolved.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return ToolResult::err(call, format!("cannot create {}: {e}", parent.display()));
                }
            }
        }

        let old = tokio::fs::read_to_string(&resolved).await.unwrap_or_default();
        if let Err(e) = write_atomic(&resolved, content) {
            return ToolResult::err(call, format!("cannot write {path}: {e}"));
        }

        self.ui.post(UiUpdate::line(diff_summary(path, &old, content)));
        ToolResult::ok(call, json!({ "status": "ok" }))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
