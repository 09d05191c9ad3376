// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! OpenAI chat-completions wire codec.
//!
//! Translates the internal block-structured message log into the
//! `/chat/completions` request shape and parses responses back.  Decoding is
//! panic-free: unknown fields are ignored, a missing `tool_calls` array
//! decodes as no calls, and malformed argument strings fall back to `{}`.

use serde_json::{json, Value};

use crate::error::CallError;
use crate::types::{CompletionRequest, ContentBlock, Message, Role, Usage};

/// Build the full request body for an OpenAI-compatible endpoint.
pub fn build_request(req: &CompletionRequest) -> Value {
    let mut body = json!({
        "model": req.model,
        "messages": wire_messages(&req.messages),
        "max_tokens": req.max_tokens,
        "temperature": req.temperature,
    });
    if !req.tools.is_empty() {
        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        body["tools"] = json!(tools);
    }
    body
}

/// Serialize the message log into OpenAI wire messages.
///
/// A tool-result message expands into one `{role:"tool"}` entry per result
/// block, preserving block order so each entry lines up with the preceding
/// assistant message's `tool_calls`.
pub fn wire_messages(messages: &[Message]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len());
    for m in messages {
        match m.role {
            Role::System => out.push(json!({ "role": "system", "content": m.text() })),
            Role::User => out.push(json!({ "role": "user", "content": m.text() })),
            Role::Assistant => {
                let text = m.text();
                let content = if text.is_empty() { Value::Null } else { Value::String(text) };
                let tool_calls: Vec<Value> = m
                    .tool_calls()
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.params.to_string(),
                            }
                        })
                    })
                    .collect();
                let mut msg = json!({ "role": "assistant", "content": content });
                if !tool_calls.is_empty() {
                    msg["tool_calls"] = json!(tool_calls);
                }
                out.push(msg);
            }
            Role::Tool => {
                for block in &m.blocks {
                    if let ContentBlock::ToolResult { tool_id, output, .. } = block {
                        let content = match output {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        out.push(json!({
                            "role": "tool",
                            "tool_call_id": tool_id,
                            "content": content,
                        }));
                    }
                }
            }
        }
    }
    out
}

/// Parse an OpenAI-shaped response body into an assistant message plus usage.
pub fn parse_response(body: &Value) -> Result<(Message, Usage), CallError> {
    let message = body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| CallError::Parse {
            message: "response has no choices[0].message".into(),
            raw: body.to_string(),
        })?;

    let mut blocks = Vec::new();
    if let Some(text) = message.get("content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            blocks.push(ContentBlock::text(text));
        }
    }
    if let Some(calls) = message.get("tool_calls").and_then(|v| v.as_array()) {
        for (i, call) in calls.iter().enumerate() {
            let id = call
                .get("id")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                // Providers occasionally omit ids; synthesize a stable one so
                // the result can still be paired on the next turn.
                .unwrap_or_else(|| format!("call_synthetic_{i}"));
            let name = call
                .get("function")
                .and_then(|f| f.get("name"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if name.is_empty() {
                continue;
            }
            let params = call
                .get("function")
                .and_then(|f| f.get("arguments"))
                .and_then(|v| v.as_str())
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_else(|| json!({}));
            blocks.push(ContentBlock::ToolCall { id, name, params });
        }
    }

    Ok((Message::assistant_with_blocks(blocks), parse_usage(body)))
}

/// Extract token counters from an OpenAI-shaped `usage` object.
///
/// `prompt_tokens_details.cached_tokens` is the prefix-cache read count when
/// the provider reports one; the miss side is derived, not guessed, as
/// `prompt - hit`.
pub fn parse_usage(body: &Value) -> Usage {
    let usage = &body["usage"];
    let prompt = usage["prompt_tokens"].as_u64().unwrap_or(0) as u32;
    let completion = usage["completion_tokens"].as_u64().unwrap_or(0) as u32;
    let cached = usage["prompt_tokens_details"]["cached_tokens"]
        .as_u64()
        .unwrap_or(0) as u32;
    Usage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        cached_tokens: cached,
        cache_hit_tokens: cached,
        cache_miss_tokens: prompt.saturating_sub(cached),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_with(messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest {
            model: "test-model".into(),
            messages,
            max_tokens: 1024,
            temperature: 0.2,
            ..Default::default()
        }
    }

    // ── Encoding ──────────────────────────────────────────────────────────────

    #[test]
    fn system_message_is_first() {
        let body = build_request(&request_with(vec![
            Message::system("sys"),
            Message::user("hi"),
        ]));
        let msgs = body["messages"].as_array().unwrap();
        assert_eq!(msgs[0]["role"], "system");
        assert_eq!(msgs[0]["content"], "sys");
        assert_eq!(msgs[1]["role"], "user");
    }

    #[test]
    fn assistant_tool_calls_serialize_as_function_entries() {
        let m = Message::assistant_with_blocks(vec![
            ContentBlock::text("running"),
            ContentBlock::tool_call("call_1", "shell", json!({"command": "ls"})),
        ]);
        let msgs = wire_messages(&[m]);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["content"], "running");
        let tc = &msgs[0]["tool_calls"][0];
        assert_eq!(tc["id"], "call_1");
        assert_eq!(tc["type"], "function");
        assert_eq!(tc["function"]["name"], "shell");
        // Arguments travel as a JSON-encoded string.
        let args: Value =
            serde_json::from_str(tc["function"]["arguments"].as_str().unwrap()).unwrap();
        assert_eq!(args["command"], "ls");
    }

    #[test]
    fn assistant_without_text_has_null_content() {
        let m = Message::assistant_with_blocks(vec![ContentBlock::tool_call(
            "call_1",
            "read",
            json!({"path": "x"}),
        )]);
        let msgs = wire_messages(&[m]);
        assert!(msgs[0]["content"].is_null());
    }

    #[test]
    fn tool_result_message_expands_one_wire_entry_per_block() {
        let m = Message::tool_results(vec![
            ContentBlock::ToolResult {
                tool_id: "call_1".into(),
                tool_name: "shell".into(),
                output: json!({"exit_code": 0, "output": "done"}),
                is_error: false,
            },
            ContentBlock::ToolResult {
                tool_id: "call_2".into(),
                tool_name: "read".into(),
                output: json!({"error": "cancelled"}),
                is_error: true,
            },
        ]);
        let msgs = wire_messages(&[m]);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["role"], "tool");
        assert_eq!(msgs[0]["tool_call_id"], "call_1");
        assert_eq!(msgs[1]["tool_call_id"], "call_2");
        // Content is the stringified output object.
        assert!(msgs[0]["content"].as_str().unwrap().contains("exit_code"));
    }

    #[test]
    fn tools_are_declared_as_functions() {
        let mut req = request_with(vec![Message::user("x")]);
        req.tools.push(crate::types::ToolSchema {
            name: "grep".into(),
            description: "search".into(),
            parameters: json!({"type": "object"}),
        });
        let body = build_request(&req);
        assert_eq!(body["tools"][0]["function"]["name"], "grep");
    }

    // ── Decoding ──────────────────────────────────────────────────────────────

    #[test]
    fn parses_text_response() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "hello"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2}
        });
        let (msg, usage) = parse_response(&body).unwrap();
        assert_eq!(msg.text(), "hello");
        assert!(!msg.has_tool_calls());
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 2);
    }

    #[test]
    fn parses_tool_calls_preserving_ids() {
        let body = json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [
                    {"id": "call_abc", "type": "function",
                     "function": {"name": "shell", "arguments": "{\"command\":\"ls\"}"}},
                    {"id": "call_def", "type": "function",
                     "function": {"name": "read", "arguments": "{\"path\":\"f\"}"}}
                ]
            }}]
        });
        let (msg, _) = parse_response(&body).unwrap();
        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_abc");
        assert_eq!(calls[0].params["command"], "ls");
        assert_eq!(calls[1].id, "call_def");
    }

    #[test]
    fn synthesizes_id_when_missing() {
        let body = json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{"type": "function",
                    "function": {"name": "shell", "arguments": "{}"}}]
            }}]
        });
        let (msg, _) = parse_response(&body).unwrap();
        assert_eq!(msg.tool_calls()[0].id, "call_synthetic_0");
    }

    #[test]
    fn malformed_arguments_fall_back_to_empty_object() {
        let body = json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{"id": "c1", "type": "function",
                    "function": {"name": "shell", "arguments": "{not json"}}]
            }}]
        });
        let (msg, _) = parse_response(&body).unwrap();
        assert_eq!(*msg.tool_calls()[0].params, json!({}));
    }

    #[test]
    fn missing_choices_is_a_parse_error_not_a_panic() {
        let err = parse_response(&json!({"unexpected": true})).unwrap_err();
        assert!(matches!(err, CallError::Parse { .. }));
    }

    #[test]
    fn missing_tool_calls_decodes_as_none() {
        let body = json!({"choices": [{"message": {"content": "plain"}}]});
        let (msg, _) = parse_response(&body).unwrap();
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn cached_tokens_split_into_hit_and_miss() {
        let usage = parse_usage(&json!({
            "usage": {
                "prompt_tokens": 100,
                "completion_tokens": 10,
                "prompt_tokens_details": {"cached_tokens": 60}
            }
        }));
        assert_eq!(usage.cache_hit_tokens, 60);
        assert_eq!(usage.cache_miss_tokens, 40);
        assert_eq!(usage.cached_tokens, 60);
    }

    // ── Pairing invariant across a full round ─────────────────────────────────

    #[test]
    fn encoded_results_follow_assistant_in_call_order() {
        let assistant = Message::assistant_with_blocks(vec![
            ContentBlock::tool_call("call_1", "shell", json!({})),
            ContentBlock::tool_call("call_2", "read", json!({})),
        ]);
        let results = Message::tool_results(vec![
            ContentBlock::ToolResult {
                tool_id: "call_1".into(),
                tool_name: "shell".into(),
                output: json!({"error": "cancelled before start"}),
                is_error: true,
            },
            ContentBlock::ToolResult {
                tool_id: "call_2".into(),
                tool_name: "read".into(),
                output: json!({"error": "cancelled before start"}),
                is_error: true,
            },
        ]);
        let msgs = wire_messages(&[assistant, results]);
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0]["role"], "assistant");
        assert_eq!(msgs[1]["role"], "tool");
        assert_eq!(msgs[1]["tool_call_id"], "call_1");
        assert_eq!(msgs[2]["role"], "tool");
        assert_eq!(msgs[2]["tool_call_id"], "call_2");
    }
}
