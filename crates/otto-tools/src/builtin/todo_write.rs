// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use otto_channels::{UiQueue, UiUpdate};

use crate::tool::{Tool, ToolCall, ToolResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoItem {
    pub content: String,
    /// Present-continuous form shown while the item is in progress.
    pub active_form: String,
    pub status: String,
}

const VALID_STATUSES: [&str; 3] = ["pending", "in_progress", "completed"];

pub struct TodoWriteTool {
    todos: Mutex<Vec<TodoItem>>,
    ui: Arc<UiQueue>,
}

impl TodoWriteTool {
    pub fn new(ui: Arc<UiQueue>) -> Self {
        Self { todos: Mutex::new(Vec::new()), ui }
    }
}

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "todo_write"
    }

    fn description(&self) -> &str {
        "Replace the session todo list. Each item needs 'content' (imperative\n\
         form), 'activeForm' (present continuous, shown while in progress),\n\
         and 'status' (pending | in_progress | completed). Calling todo_write\n\
         replaces the entire list, so include every item still relevant.\n\
         Keep at most one item in_progress; mark items completed immediately\n\
         after finishing them."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "description": "Todo items replacing the existing list",
                    "items": {
                        "type": "object",
                        "properties": {
                            "content": { "type": "string", "description": "Task description" },
                            "activeForm": {
                                "type": "string",
                                "description": "Present-continuous label, e.g. 'Running tests'"
                            },
                            "status": {
                                "type": "string",
                                "enum": ["pending", "in_progress", "completed"],
                                "description": "Current status"
                            }
                        },
                        "required": ["content", "activeForm", "status"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["todos"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(todos_value) = call.args.get("todos").and_then(|v| v.as_array()) else {
            return ToolResult::err(call, "missing 'todos' array");
        };

        let mut items: Vec<TodoItem> = Vec::with_capacity(todos_value.len());
        for raw in todos_value {
            let Some(content) = raw.get("content").and_then(|v| v.as_str()) else {
                return ToolResult::err(call, "todo item missing 'content'");
            };
            let active_form = raw
                .get("activeForm")
                .and_then(|v| v.as_str())
                .unwrap_or(content)
                .to_string();
            let Some(status) = raw.get("status").and_then(|v| v.as_str()) else {
                return ToolResult::err(call, format!("todo '{content}' missing 'status'"));
            };
            if !VALID_STATUSES.contains(&status) {
                return ToolResult::err(
                    call,
                    format!("invalid status '{status}' for todo '{content}'"),
                );
            }
            items.push(TodoItem {
                content: content.to_string(),
                active_form,
                status: status.to_string(),
            });
        }

        let in_progress = items.iter().filter(|t| t.status == "in_progress").count();
        if in_progress > 1 {
            return ToolResult::err(call, "at most one todo can be 'in_progress' at a time");
        }

        debug!(count = items.len(), "todo_write tool");
        let added = items.len();
        let rendered = render_todos(&items);
        *self.todos.lock().unwrap() = items;
        self.ui.post(UiUpdate::todo_update(rendered));

        ToolResult::ok(call, json!({ "added": added }))
    }
}

fn render_todos(items: &[TodoItem]) -> String {
    if items.is_empty() {
        return "Todo list cleared.".to_string();
    }
    let lines: Vec<String> = items
        .iter()
        .map(|t| {
            let icon = match t.status.as_str() {
                "completed" => "✓",
                "in_progress" => "→",
                _ => "○",
            };
            let label = if t.status == "in_progress" { &t.active_form } else { &t.content };
            format!("{icon} {label}")
        })
        .collect();
    lines.join("\n")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn make_tool() -> (TodoWriteTool, Arc<UiQueue>) {
        let ui = Arc::new(UiQueue::with_capacity(16));
        (TodoWriteTool::new(Arc::clone(&ui)), ui)
    }

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall { id: "t1".into(), name: "todo_write".into(), args }
    }

    #[tokio::test]
    async fn replaces_list_and_posts_update() {
        let (tool, ui) = make_tool();
        let out = tool
            .execute(&call(json!({
                "todos": [
                    {"content": "Fix the bug", "activeForm": "Fixing the bug", "status": "in_progress"},
                    {"content": "Add tests", "activeForm": "Adding tests", "status": "pending"}
                ]
            })))
            .await;
        assert!(!out.is_error, "{:?}", out.output);
        assert_eq!(out.output["added"], 2);

        let update = ui.poll().expect("todo update posted");
        assert_eq!(update.kind, otto_channels::UiUpdateKind::TodoUpdate);
        let text = update.payload.unwrap();
        // In-progress items render their active form.
        assert!(text.contains("Fixing the bug"));
        assert!(text.contains("Add tests"));
    }

    #[tokio::test]
    async fn rejects_two_in_progress_items() {
        let (tool, _ui) = make_tool();
        let out = tool
            .execute(&call(json!({
                "todos": [
                    {"content": "a", "activeForm": "a", "status": "in_progress"},
                    {"content": "b", "activeForm": "b", "status": "in_progress"}
                ]
            })))
            .await;
        assert!(out.is_error);
        assert!(out.output["error"].as_str().unwrap().contains("at most one"));
    }

    #[tokio::test]
    async fn rejects_unknown_status() {
        let (tool, _ui) = make_tool();
        let out = tool
            .execute(&call(json!({
                "todos": [{"content": "a", "activeForm": "a", "status": "cancelled"}]
            })))
            .await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn empty_list_clears() {
        let (tool, ui) = make_tool();
        let out = tool.execute(&call(json!({"todos": []}))).await;
        assert_eq!(out.output["added"], 0);
        assert!(ui.poll().unwrap().payload.unwrap().contains("cleared"));
    }

    #[tokio::test]
    async fn missing_todos_is_an_error() {
        let (tool, _ui) = make_tool();
        assert!(tool.execute(&call(json!({}))).await.is_error);
    }
}
