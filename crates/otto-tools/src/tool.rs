// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim).
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments.
    pub args: Value,
}

/// The result of executing (or failing to execute) a tool call.
///
/// One result exists per call, always: cancellation, timeout, and dispatch
/// failures all produce an error-shaped result rather than a missing slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_id: String,
    pub tool_name: String,
    /// Structured output returned to the model.
    pub output: Value,
    pub is_error: bool,
}

impl ToolResult {
    /// Successful structured result.
    pub fn ok(call: &ToolCall, output: Value) -> Self {
        Self {
            tool_id: call.id.clone(),
            tool_name: call.name.clone(),
            output,
            is_error: false,
        }
    }

    /// Error result with a plain message.
    pub fn err(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            tool_id: call.id.clone(),
            tool_name: call.name.clone(),
            output: json!({ "error": message.into() }),
            is_error: true,
        }
    }

    /// The call was cancelled before the tool ran.
    pub fn cancelled_before_start(call: &ToolCall) -> Self {
        Self::err(call, "Tool execution cancelled before start")
    }

    /// The call was cancelled (interrupt or timeout) while the tool ran.
    pub fn cancelled_during_execution(call: &ToolCall) -> Self {
        Self::err(call, "Tool execution cancelled during execution")
    }
}

/// Trait that every built-in tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters.
    fn parameters_schema(&self) -> Value;
    /// Execution deadline for this call, when the tool defines one.
    /// `None` lets the engine apply its default.
    fn timeout_for(&self, _call: &ToolCall) -> Option<Duration> {
        None
    }
    /// Execute the tool.  Failures are reported via [`ToolResult::err`],
    /// never panics.
    async fn execute(&self, call: &ToolCall) -> ToolResult;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn call() -> ToolCall {
        ToolCall { id: "call_1".into(), name: "shell".into(), args: json!({}) }
    }

    #[test]
    fn ok_result_carries_call_identity() {
        let r = ToolResult::ok(&call(), json!({"exit_code": 0}));
        assert_eq!(r.tool_id, "call_1");
        assert_eq!(r.tool_name, "shell");
        assert!(!r.is_error);
    }

    #[test]
    fn err_result_wraps_message() {
        let r = ToolResult::err(&call(), "boom");
        assert!(r.is_error);
        assert_eq!(r.output["error"], "boom");
    }

    #[test]
    fn cancellation_results_mention_cancelled() {
        let before = ToolResult::cancelled_before_start(&call());
        let during = ToolResult::cancelled_during_execution(&call());
        assert!(before.output["error"].as_str().unwrap().contains("cancelled"));
        assert!(during.output["error"].as_str().unwrap().contains("cancelled"));
        assert!(before.is_error && during.is_error);
    }
}
