// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use otto_model::{ContentBlock, Message, Role};
use otto_tools::{ToolResult, Workspace};

use crate::prompts;

/// The canonical conversation: an append-only message log plus session
/// metadata.  The worker thread is the only writer; other threads observe
/// the interrupt flag and the string snapshots posted to the UI queue.
pub struct ConversationState {
    pub model: String,
    /// Correlates audit rows across the session.
    pub session_id: String,
    pub messages: Vec<Message>,
    /// Set by the UI thread on interrupt; checked at every cancellation
    /// point in the pipeline and the tool engine.
    pub interrupt: Arc<AtomicBool>,
    workspace: Arc<Workspace>,
    /// Extra context the user provided at startup, folded into the system
    /// prompt.
    user_context: Option<String>,
    /// Tool descriptions listed in the system prompt.
    tool_names: Vec<String>,
}

impl ConversationState {
    pub fn new(
        model: impl Into<String>,
        workspace: Arc<Workspace>,
        tool_names: Vec<String>,
        user_context: Option<String>,
    ) -> Self {
        let mut state = Self {
            model: model.into(),
            session_id: uuid::Uuid::new_v4().to_string(),
            messages: Vec::new(),
            interrupt: Arc::new(AtomicBool::new(false)),
            workspace,
            user_context,
            tool_names,
        };
        state.messages.push(state.build_system_message());
        state
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    fn build_system_message(&self) -> Message {
        Message::system(prompts::system_prompt(
            &self.workspace.directories(),
            &self.tool_names,
            self.user_context.as_deref(),
        ))
    }

    pub fn append_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    pub fn append_assistant(&mut self, message: Message) {
        debug_assert_eq!(message.role, Role::Assistant);
        self.messages.push(message);
    }

    /// Append the tool-result message answering the immediately preceding
    /// assistant turn.  `results` must be in call-declaration order; the
    /// engine guarantees that.
    pub fn append_tool_results(&mut self, results: Vec<ToolResult>) {
        let blocks: Vec<ContentBlock> = results
            .into_iter()
            .map(|r| ContentBlock::ToolResult {
                tool_id: r.tool_id,
                tool_name: r.tool_name,
                output: r.output,
                is_error: r.is_error,
            })
            .collect();
        self.messages.push(Message::tool_results(blocks));
    }

    /// Drop everything but a freshly built system message.
    pub fn clear(&mut self) {
        self.messages.clear();
        let system = self.build_system_message();
        self.messages.push(system);
    }

    /// Add a working directory and rebuild the system prompt in place.
    /// Returns false when the directory was already in the set.
    pub fn add_directory(&mut self, path: impl Into<std::path::PathBuf>) -> bool {
        if !self.workspace.add_directory(path) {
            return false;
        }
        let system = self.build_system_message();
        if let Some(first) = self.messages.first_mut() {
            if first.role == Role::System {
                *first = system;
                return true;
            }
        }
        self.messages.insert(0, system);
        true
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn state() -> ConversationState {
        ConversationState::new(
            "test-model",
            Arc::new(Workspace::new("/work")),
            vec!["shell".into(), "read".into()],
            None,
        )
    }

    #[test]
    fn starts_with_a_system_message() {
        let s = state();
        assert_eq!(s.messages.len(), 1);
        assert_eq!(s.messages[0].role, Role::System);
        assert!(s.messages[0].text().contains("/work"));
    }

    #[test]
    fn appends_are_ordered() {
        let mut s = state();
        s.append_user("hi");
        s.append_assistant(Message::assistant("hello"));
        assert_eq!(s.messages.len(), 3);
        assert_eq!(s.messages[1].role, Role::User);
        assert_eq!(s.messages[2].role, Role::Assistant);
    }

    #[test]
    fn tool_results_become_one_message_in_order() {
        let mut s = state();
        let call_a = otto_tools::ToolCall { id: "call_1".into(), name: "shell".into(), args: json!({}) };
        let call_b = otto_tools::ToolCall { id: "call_2".into(), name: "read".into(), args: json!({}) };
        s.append_tool_results(vec![
            ToolResult::ok(&call_a, json!({"exit_code": 0})),
            ToolResult::err(&call_b, "nope"),
        ]);
        let msg = s.messages.last().unwrap();
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.blocks.len(), 2);
        match &msg.blocks[0] {
            ContentBlock::ToolResult { tool_id, is_error, .. } => {
                assert_eq!(tool_id, "call_1");
                assert!(!is_error);
            }
            other => panic!("unexpected block {other:?}"),
        }
        match &msg.blocks[1] {
            ContentBlock::ToolResult { tool_id, is_error, .. } => {
                assert_eq!(tool_id, "call_2");
                assert!(is_error);
            }
            other => panic!("unexpected block {other:?}"),
        }
    }

    #[test]
    fn clear_resets_to_system_only() {
        let mut s = state();
        s.append_user("one");
        s.append_assistant(Message::assistant("two"));
        s.clear();
        assert_eq!(s.messages.len(), 1);
        assert_eq!(s.messages[0].role, Role::System);
    }

    #[test]
    fn add_directory_rebuilds_system_prompt() {
        let mut s = state();
        assert!(s.add_directory("/other"));
        assert!(s.messages[0].text().contains("/other"));
        assert!(!s.add_directory("/other"), "duplicate directories are rejected");
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(state().session_id, state().session_id);
    }
}
