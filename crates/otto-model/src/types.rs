// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Content blocks ───────────────────────────────────────────────────────────

/// A single typed block inside a message.
///
/// Assistant messages carry `Text` and `ToolCall` blocks; tool-result
/// messages carry `ToolResult` blocks whose `tool_id` answers a prior call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolCall {
        /// Identifier assigned by the provider (or synthesized when absent).
        id: String,
        name: String,
        /// Parsed JSON argument object.
        params: Value,
    },
    ToolResult {
        /// Must equal the `id` of a prior `ToolCall` in this conversation.
        tool_id: String,
        tool_name: String,
        output: Value,
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, params: Value) -> Self {
        Self::ToolCall { id: id.into(), name: name.into(), params }
    }
}

/// Borrowed view of one tool call inside an assistant message.
#[derive(Debug, Clone, Copy)]
pub struct ToolCallRef<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub params: &'a Value,
}

// ─── Message types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// A tool-result message answering the immediately preceding assistant
    /// message's tool calls.
    Tool,
}

/// A single message in the conversation history.  Append-only; blocks are
/// never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub blocks: Vec<ContentBlock>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, blocks: vec![ContentBlock::text(text)] }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, blocks: vec![ContentBlock::text(text)] }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, blocks: vec![ContentBlock::text(text)] }
    }

    /// An assistant turn mixing optional text with tool calls.
    pub fn assistant_with_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self { role: Role::Assistant, blocks }
    }

    /// A tool-result message.  The caller is responsible for passing one
    /// `ToolResult` block per answered call, in call-declaration order.
    pub fn tool_results(blocks: Vec<ContentBlock>) -> Self {
        Self { role: Role::Tool, blocks }
    }

    /// Concatenated text content of this message.
    pub fn text(&self) -> String {
        let parts: Vec<&str> = self
            .blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        parts.join("\n")
    }

    /// All tool calls declared by this message, in block order.
    pub fn tool_calls(&self) -> Vec<ToolCallRef<'_>> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolCall { id, name, params } => {
                    Some(ToolCallRef { id, name, params })
                }
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolCall { .. }))
    }
}

// ─── Requests and usage ───────────────────────────────────────────────────────

/// A tool schema provided to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: Value,
}

/// Request sent to a model provider.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Mark the system block and the last user message with a cache
    /// breakpoint so supporting providers may reuse a prefix cache.
    pub cache_hints: bool,
}

/// Token usage reported by the provider for one call.
///
/// Providers report caching differently; we record exactly what was
/// observed.  `cache_hit_tokens` is the prefix-cache read count,
/// `cache_miss_tokens` the uncached (or cache-write) side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cached_tokens: u32,
    pub cache_hit_tokens: u32,
    pub cache_miss_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_message_has_role_and_text() {
        let m = Message::user("hello");
        assert_eq!(m.role, Role::User);
        assert_eq!(m.text(), "hello");
    }

    #[test]
    fn assistant_text_concatenates_blocks() {
        let m = Message::assistant_with_blocks(vec![
            ContentBlock::text("one"),
            ContentBlock::tool_call("call_1", "shell", json!({})),
            ContentBlock::text("two"),
        ]);
        assert_eq!(m.text(), "one\ntwo");
    }

    #[test]
    fn tool_calls_preserve_block_order() {
        let m = Message::assistant_with_blocks(vec![
            ContentBlock::tool_call("call_1", "read", json!({"path": "a"})),
            ContentBlock::tool_call("call_2", "shell", json!({"command": "ls"})),
        ]);
        let calls = m.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[1].id, "call_2");
        assert_eq!(calls[1].name, "shell");
    }

    #[test]
    fn has_tool_calls_false_for_plain_text() {
        assert!(!Message::assistant("just text").has_tool_calls());
    }

    #[test]
    fn tool_result_block_round_trips_through_serde() {
        let block = ContentBlock::ToolResult {
            tool_id: "call_9".into(),
            tool_name: "shell".into(),
            output: json!({"exit_code": 0, "output": "ok"}),
            is_error: false,
        };
        let text = serde_json::to_string(&block).unwrap();
        let back: ContentBlock = serde_json::from_str(&text).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn usage_total_is_prompt_plus_completion() {
        let u = Usage { prompt_tokens: 10, completion_tokens: 5, ..Default::default() };
        assert_eq!(u.total_tokens(), 15);
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }
}
