// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use otto_channels::{UiQueue, UiUpdate};

use crate::patch::{self, PatchError};
use crate::tool::{Tool, ToolCall, ToolResult};
use crate::workspace::Workspace;

pub struct PatchTool {
    workspace: Arc<Workspace>,
    ui: Arc<UiQueue>,
}

impl PatchTool {
    pub fn new(workspace: Arc<Workspace>, ui: Arc<UiQueue>) -> Self {
        Self { workspace, ui }
    }
}

#[async_trait]
impl Tool for PatchTool {
    fn name(&self) -> &str {
        "patch"
    }

    fn description(&self) -> &str {
        "Apply a multi-file patch. Format:\n\
         *** Begin Patch\n\
         *** Update File: path/to/file\n\
         @@\n\
         -old line\n\
         +new line\n\
         @@\n\
         *** End Patch\n\
         The '-' lines must match the file content exactly; the first\n\
         occurrence is replaced by the '+' lines. Operations apply in order\n\
         and stop at the first failure."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The full patch text including Begin/End markers"
                }
            },
            "required": ["content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(content) = call.args.get("content").and_then(|v| v.as_str()) else {
            return ToolResult::err(call, "missing 'content' parameter");
        };

        let parsed = match patch::parse(content) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(call, e.to_string()),
        };
        debug!(operations = parsed.operations.len(), "patch tool");

        match patch::apply(&parsed, &self.workspace.primary()) {
            Ok(applied) => {
                let files: Vec<&str> =
                    parsed.operations.iter().map(|op| op.path.as_str()).collect();
                self.ui.post(UiUpdate::status(format!(
                    "patch applied: {} operation(s) ({})",
                    applied,
                    files.join(", ")
                )));
                ToolResult::ok(
                    call,
                    json!({ "status": "success", "operations_applied": applied }),
                )
            }
            Err(PatchError::Apply { path, message, applied }) => ToolResult {
                tool_id: call.id.clone(),
                tool_name: call.name.clone(),
                output: json!({
                    "error": format!("patch failed for {path}: {message}"),
                    "operations_applied": applied,
                }),
                is_error: true,
            },
            Err(e) => ToolResult::err(call, e.to_string()),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
