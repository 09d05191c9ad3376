// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolResult};
use crate::workspace::Workspace;

/// Default window when the model does not pass `limit`.
const DEFAULT_LIMIT: usize = 2_000;

pub struct ReadTool {
    workspace: Arc<Workspace>,
}

impl ReadTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read a file. Relative paths resolve against the working directory.\n\
         'offset' skips that many leading lines; 'limit' caps the number of\n\
         lines returned (default 2000). The result reports whether content\n\
         was truncated."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File to read" },
                "offset": {
                    "type": "integer",
                    "description": "Lines to skip from the start (optional)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum lines to return (optional, default 2000)"
                }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(path) = call.args.get("path").and_then(|v| v.as_str()) else {
            return ToolResult::err(call, "missing 'path' parameter");
        };
        let offset = call.args.get("offset").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let limit = call
            .args
            .get("limit")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_LIMIT as u64) as usize;

        let resolved = self.workspace.resolve(path);
        let text = match tokio::fs::read_to_string(&resolved).await {
            Ok(t) => t,
            Err(e) => return ToolResult::err(call, format!("cannot read {path}: {e}")),
        };

        let lines: Vec<&str> = text.lines().collect();
        let window: Vec<&str> = lines.iter().skip(offset).take(limit).copied().collect();
        let truncated = offset + window.len() < lines.len();

        ToolResult::ok(
            call,
            json!({ "content": window.join("\n"), "truncated": truncated }),
        )
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
