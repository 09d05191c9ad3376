// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::tool::{Tool, ToolCall, ToolResult};
use crate::workspace::Workspace;

const DEFAULT_MAX_RESULTS: usize = 100;

/// Files larger than this are skipped; regex matching megabyte blobs is
/// never what the model wants.
const MAX_FILE_BYTES: u64 = 1_048_576;

pub struct GrepTool {
    workspace: Arc<Workspace>,
}

impl GrepTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents with a regular expression. Returns\n\
         path:line:text matches, skipping .git/, target/, node_modules/ and\n\
         binary files. 'path' narrows the search root; max_results defaults\n\
         to 100."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Regular expression to search for" },
                "path": { "type": "string", "description": "Directory or file to search (optional)" },
                "max_results": { "type": "integer", "description": "Maximum matches (default 100)" }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(pattern) = call.args.get("pattern").and_then(|v| v.as_str()) else {
            return ToolResult::err(call, "missing 'pattern' parameter");
        };
        let max_results = call
            .args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_RESULTS as u64) as usize;
        let root = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => self.workspace.resolve(p),
            None => self.workspace.primary(),
        };

        let re = match regex::Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => return ToolResult::err(call, format!("invalid regex: {e}")),
        };

        let mut matches: Vec<String> = Vec::new();
        let mut truncated = false;

        'walk: for entry in WalkDir::new(&root)
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e.path()))
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                continue; // binary or unreadable
            };
            let display = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .display()
                .to_string();
            for (lineno, line) in content.lines().enumerate() {
                if re.is_match(line) {
                    if matches.len() == max_results {
                        truncated = true;
                        break 'walk;
                    }
                    matches.push(format!("{display}:{}:{}", lineno + 1, line));
                }
            }
        }

        ToolResult::ok(call, json!({ "matches": matches, "truncated": truncated }))
    }
}

fn is_skipped_dir(path: &Path) -> bool {
    matches!(
        path.file_name().and_then(|n| n.to_str()),
        Some(".git") | Some("target") | Some("node_modules")
    )
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
