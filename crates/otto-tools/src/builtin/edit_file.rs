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

pub struct EditTool {
    workspace: Arc<Workspace>,
    ui: Arc<UiQueue>,
}

impl EditTool {
    pub fn new(workspace: Arc<Workspace>, ui: Arc<UiQueue>) -> Self {
        Self { workspace, ui }
    }
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Replace text in a file. 'old_string' must match exactly (or as a\n\
         regular expression with use_regex). By default only the first\n\
         occurrence is replaced; set replace_all for every occurrence.\n\
         Fails when old_string is not found."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File to edit" },
                "old_string": { "type": "string", "description": "Text to find" },
                "new_string": { "type": "string", "description": "Replacement text" },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence (default: first only)"
                },
                "use_regex": {
                    "type": "boolean",
                    "description": "Treat old_string as a regular expression"
                }
            },
            "required": ["path", "old_string", "new_string"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(path) = call.args.get("path").and_then(|v| v.as_str()) else {
            return ToolResult::err(call, "missing 'path' parameter");
        };
        let Some(old_string) = call.args.get("old_string").and_then(|v| v.as_str()) else {
            return ToolResult::err(call, "missing 'old_string' parameter");
        };
        let Some(new_string) = call.args.get("new_string").and_then(|v| v.as_str()) else {
            return ToolResult::err(call, "missing 'new_string' parameter");
        };
        let replace_all = call.args.get("replace_all").and_then(|v| v.as_bool()).unwrap_or(false);
        let use_regex = call.args.get("use_regex").and_then(|v| v.as_bool()).unwrap_or(false);
        if old_string.is_empty() {
            return ToolResult::err(call, "'old_string' must not be empty");
        }

        let resolved = self.workspace.resolve(path);
        let content = match tokio::fs::read_to_string(&resolved).await {
            Ok(c) => c,
            Err(e) => return ToolResult::err(call, format!("cannot read {path}: {e}")),
        };

        let (updated, replacements) = if use_regex {
            let re = match regex::Regex::new(old_string) {
                Ok(re) => re,
                Err(e) => return ToolResult::err(call, format!("invalid regex: {e}")),
            };
            let count = re.find_iter(&content).count();
            if count == 0 {
                return ToolResult::err(call, format!("pattern not found in {path}"));
            }
            let limit = if replace_all { 0 } else { 1 };
            let updated = re.replacen(&content, limit, new_string).into_owned();
            (updated, if replace_all { count } else { 1 })
        } else {
            let count = content.matches(old_string).count();
            if count == 0 {
                return ToolResult::err(call, format!("old_string not found in {path}"));
            }
            if replace_all {
                (content.replace(old_string, new_string), count)
            } else {
                (content.replacen(old_string, new_string, 1), 1)
            }
        };

        debug!(path = %resolved.display(), replacements, "edit tool");
        if let Err(e) = write_atomic(&resolved, &updated) {
            return ToolResult::err(call, format!("cannot write {path}: {e}"));
        }

        self.ui.post(UiUpdate::line(diff_summary(path, &content, &updated)));
        ToolResult::ok(call, json!({ "status": "ok", "replacements": replacements }))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn setup(content: &str) -> (EditTool, Arc<UiQueue>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), content).unwrap();
        let ui = Arc::new(UiQueue::with_capacity(16));
        let tool = EditTool::new(Arc::new(Workspace::new(dir.path())), Arc::clone(&ui));
        (tool, ui, dir)
    }

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall { id: "e1".into(), name: "edit".into(), args }
    }

    fn read(dir: &tempfile::TempDir) -> String {
        std::fs::read_to_string(dir.path().join("f.txt")).unwrap()
    }

    #[tokio::test]
    async fn replaces_first_occurrence_by_default() {
        let (tool, _ui, dir) = setup("x x x\n");
        let out = tool
            .execute(&call(json!({"path": "f.txt", "old_string": "x", "new_string": "y"})))
            .await;
        assert!(!out.is_error);
        assert_eq!(out.output["replacements"], 1);
        assert_eq!(read(&dir), "y x x\n");
    }

    #[tokio::test]
    async fn replace_all_counts_every_occurrence() {
        let (tool, _ui, dir) = setup("x x x\n");
        let out = tool
            .execute(&call(json!({
                "path": "f.txt", "old_string": "x", "new_string": "y", "replace_all": true
            })))
            .await;
        assert_eq!(out.output["replacements"], 3);
        assert_eq!(read(&dir), "y y y\n");
    }

    #[tokio::test]
    async fn regex_mode_replaces_matches() {
        let (tool, _ui, dir) = setup("v1.2 and v3.4\n");
        let out = tool
            .execute(&call(json!({
                "path": "f.txt", "old_string": r"v\d+\.\d+", "new_string": "vX",
                "use_regex": true, "replace_all": true
            })))
            .await;
        assert_eq!(out.output["replacements"], 2);
        assert_eq!(read(&dir), "vX and vX\n");
    }

    #[tokio::test]
    async fn invalid_regex_is_an_error() {
        let (tool, _ui, _dir) = setup("abc\n");
        let out = tool
            .execute(&call(json!({
                "path": "f.txt", "old_string": "(", "new_string": "x", "use_regex": true
            })))
            .await;
        assert!(out.is_error);
        assert!(out.output["error"].as_str().unwrap().contains("regex"));
    }

    #[tokio::test]
    async fn not_found_is_an_error_and_file_is_unchanged() {
        let (tool, _ui, dir) = setup("abc\n");
        let out = tool
            .execute(&call(json!({"path": "f.txt", "old_string": "zzz", "new_string": "x"})))
            .await;
        assert!(out.is_error);
        assert!(out.output["error"].as_str().unwrap().contains("not found"));
        assert_eq!(read(&dir), "abc\n");
    }

    #[tokio::test]
    async fn posts_diff_summary_on_success() {
        let (tool, ui, _dir) = setup("old\n");
        tool.execute(&call(json!({"path": "f.txt", "old_string": "old", "new_string": "new"})))
            .await;
        let update = ui.poll().expect("diff posted");
        assert!(update.payload.unwrap().contains("f.txt"));
    }

    #[tokio::test]
    async fn empty_old_string_is_rejected() {
        let (tool, _ui, _dir) = setup("abc\n");
        let out = tool
            .execute(&call(json!({"path": "f.txt", "old_string": "", "new_string": "x"})))
            .await;
        assert!(out.is_error);
    }
}
