// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! AWS Bedrock driver for Anthropic models: native messages API with SigV4.
//!
//! Uses the non-streaming `POST /model/{modelId}/invoke` endpoint.  The
//! internal message log is translated into Anthropic message JSON: the
//! system prompt travels out-of-band, tool calls become `tool_use` blocks,
//! tool results become `tool_result` blocks on user-role messages.  The full
//! SigV4 signing algorithm is implemented locally with `sha2` and `hex` to
//! avoid pulling in the AWS SDK.
//!
//! Credential rotation (external detection + login command) is delegated to
//! [`CredentialStore`]; see that module for the protocol.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use otto_config::ModelConfig;

use crate::credentials::{AwsCredentials, CredentialStore};
use crate::error::CallError;
use crate::provider::{parse_retry_after, AuthRefresh, ModelProvider, ProviderResponse};
use crate::types::{CompletionRequest, ContentBlock, Message, Role, Usage};

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

pub struct BedrockProvider {
    model: String,
    region: String,
    cache_prompts: bool,
    credentials: Arc<CredentialStore>,
    client: reqwest::Client,
}

impl BedrockProvider {
    pub fn new(
        model: String,
        region: Option<String>,
        cache_prompts: bool,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        let region = region
            .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok())
            .or_else(|| std::env::var("AWS_REGION").ok())
            .unwrap_or_else(|| "us-east-1".into());
        Self {
            model,
            region,
            cache_prompts,
            credentials,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &ModelConfig) -> anyhow::Result<Self> {
        let credentials = Arc::new(CredentialStore::new(
            config.aws_profile.clone(),
            config.login_command.clone(),
        ));
        Ok(Self::new(
            config.name.clone(),
            config.aws_region.clone(),
            config.cache_prompts,
            credentials,
        ))
    }

    fn host(&self) -> String {
        format!("bedrock-runtime.{}.amazonaws.com", self.region)
    }

    fn invoke_path(&self) -> String {
        format!("/model/{}/invoke", urlencoded(&self.model))
    }
}

#[async_trait]
impl ModelProvider for BedrockProvider {
    fn name(&self) -> &str {
        "bedrock"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn api_base_url(&self) -> String {
        format!("https://{}", self.host())
    }

    fn audit_headers(&self) -> Value {
        serde_json::json!({
            "content-type": "application/json",
            "host": self.host(),
            "authorization": "AWS4-HMAC-SHA256 <signed>",
        })
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<ProviderResponse, CallError> {
        let creds = self.credentials.load()?;
        let body = anthropic_body(req, self.cache_prompts);
        let body_bytes = serde_json::to_vec(&body).map_err(|e| CallError::Transport {
            message: format!("request serialization: {e}"),
        })?;

        let host = self.host();
        let path = self.invoke_path();
        let url = format!("https://{host}{path}");
        let headers = sign_request("POST", &host, &path, &body_bytes, &creds, &self.region, "bedrock");

        debug!(model = %self.model, region = %self.region, "sending Bedrock invoke request");

        let mut http_req = self.client.post(&url).body(body_bytes);
        for (name, value) in &headers {
            http_req = http_req.header(name.as_str(), value.as_str());
        }

        let started = Instant::now();
        let resp = http_req.send().await.map_err(|e| CallError::Transport {
            message: format!("bedrock request failed: {e}"),
        })?;
        let status = resp.status().as_u16();
        let retry_after = parse_retry_after(resp.headers());
        let bytes = resp.bytes().await.map_err(|e| CallError::Transport {
            message: format!("bedrock response read failed: {e}"),
        })?;
        let duration_ms = started.elapsed().as_millis() as u64;
        let raw_body = otto_audit::printable_body(&bytes);

        if !(200..300).contains(&status) {
            return Err(CallError::Http { status, body: raw_body, retry_after });
        }

        let response_json: Value =
            serde_json::from_slice(&bytes).map_err(|e| CallError::Parse {
                message: format!("invalid JSON from bedrock: {e}"),
                raw: raw_body.clone(),
            })?;
        let (message, usage) = parse_anthropic_response(&response_json)?;

        Ok(ProviderResponse {
            message,
            usage,
            http_status: status,
            duration_ms,
            raw_body,
            response_json,
        })
    }

    async fn refresh_credentials(&self) -> Result<AuthRefresh, CallError> {
        self.credentials.rotate().await
    }
}

// ─── Anthropic message translation ────────────────────────────────────────────

/// Build the Anthropic messages body from the neutral conversation.
///
/// With `cache_prompts` the system block and the last user message's final
/// content block get `"cache_control": {"type": "ephemeral"}` so the
/// provider may serve the shared prefix from cache.
fn anthropic_body(req: &CompletionRequest, cache_prompts: bool) -> Value {
    let mut system_blocks: Vec<Value> = Vec::new();
    let mut messages: Vec<Value> = Vec::new();

    for m in &req.messages {
        match m.role {
            Role::System => {
                let mut block = json!({ "type": "text", "text": m.text() });
                if cache_prompts {
                    block["cache_control"] = json!({ "type": "ephemeral" });
                }
                system_blocks.push(block);
            }
            Role::User => {
                messages.push(json!({
                    "role": "user",
                    "content": [{ "type": "text", "text": m.text() }],
                }));
            }
            Role::Assistant => {
                let content: Vec<Value> = m
                    .blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } => {
                            Some(json!({ "type": "text", "text": text }))
                        }
                        ContentBlock::ToolCall { id, name, params } => Some(json!({
                            "type": "tool_use",
                            "id": id,
                            "name": name,
                            "input": params,
                        })),
                        ContentBlock::ToolResult { .. } => None,
                    })
                    .collect();
                messages.push(json!({ "role": "assistant", "content": content }));
            }
            Role::Tool => {
                // Anthropic carries tool results as content blocks on a
                // user-role message, one block per answered call.
                let content: Vec<Value> = m
                    .blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::ToolResult { tool_id, output, is_error, .. } => {
                            let text = match output {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            };
                            Some(json!({
                                "type": "tool_result",
                                "tool_use_id": tool_id,
                                "content": text,
                                "is_error": is_error,
                            }))
                        }
                        _ => None,
                    })
                    .collect();
                messages.push(json!({ "role": "user", "content": content }));
            }
        }
    }

    if cache_prompts {
        // Cache breakpoint on the last user message: everything up to and
        // including it becomes a cacheable prefix for the next turn.
        if let Some(last_user) = messages
            .iter_mut()
            .rev()
            .find(|m| m["role"] == "user")
        {
            if let Some(blocks) = last_user["content"].as_array_mut() {
                if let Some(last_block) = blocks.last_mut() {
                    last_block["cache_control"] = json!({ "type": "ephemeral" });
                }
            }
        }
    }

    let mut body = json!({
        "anthropic_version": ANTHROPIC_VERSION,
        "max_tokens": req.max_tokens,
        "temperature": req.temperature,
        "messages": messages,
    });
    if !system_blocks.is_empty() {
        body["system"] = json!(system_blocks);
    }
    if !req.tools.is_empty() {
        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect();
        body["tools"] = json!(tools);
    }
    body
}

/// Parse an Anthropic messages response into the neutral assistant message.
fn parse_anthropic_response(body: &Value) -> Result<(Message, Usage), CallError> {
    let content = body.get("content").and_then(|c| c.as_array()).ok_or_else(|| {
        CallError::Parse {
            message: "bedrock response has no content array".into(),
            raw: body.to_string(),
        }
    })?;

    let mut blocks = Vec::new();
    for part in content {
        match part["type"].as_str() {
            Some("text") => {
                if let Some(text) = part["text"].as_str() {
                    if !text.is_empty() {
                        blocks.push(ContentBlock::text(text));
                    }
                }
            }
            Some("tool_use") => {
                let id = part["id"].as_str().unwrap_or_default();
                let name = part["name"].as_str().unwrap_or_default();
                if name.is_empty() {
                    continue;
                }
                let id = if id.is_empty() {
                    format!("toolu_synthetic_{}", blocks.len())
                } else {
                    id.to_string()
                };
                blocks.push(ContentBlock::ToolCall {
                    id,
                    name: name.to_string(),
                    params: part.get("input").cloned().unwrap_or_else(|| json!({})),
                });
            }
            _ => {}
        }
    }

    let usage = &body["usage"];
    let input = usage["input_tokens"].as_u64().unwrap_or(0) as u32;
    let output = usage["output_tokens"].as_u64().unwrap_or(0) as u32;
    let cache_read = usage["cache_read_input_tokens"].as_u64().unwrap_or(0) as u32;
    let cache_write = usage["cache_creation_input_tokens"].as_u64().unwrap_or(0) as u32;

    Ok((
        Message::assistant_with_blocks(blocks),
        Usage {
            prompt_tokens: input,
            completion_tokens: output,
            cached_tokens: cache_read,
            cache_hit_tokens: cache_read,
            cache_miss_tokens: cache_write,
        },
    ))
}

// ─── SigV4 signing ────────────────────────────────────────────────────────────

/// Sign a request and return the complete header set to send, including the
/// `Authorization` header.
fn sign_request(
    method: &str,
    host: &str,
    path: &str,
    body: &[u8],
    creds: &AwsCredentials,
    region: &str,
    service: &str,
) -> Vec<(String, String)> {
    let now = Utc::now();
    let date_time = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = &date_time[..8];
    let content_type = "application/json";

    let mut headers_to_sign: Vec<(&str, &str)> = vec![
        ("content-type", content_type),
        ("host", host),
        ("x-amz-date", date_time.as_str()),
    ];
    if let Some(token) = &creds.session_token {
        headers_to_sign.push(("x-amz-security-token", token.as_str()));
    }
    headers_to_sign.sort_by_key(|&(k, _)| k);

    let canonical_headers: String = headers_to_sign
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();
    let signed_headers: String = headers_to_sign
        .iter()
        .map(|(k, _)| *k)
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{method}\n{path}\n\n{canonical_headers}\n{signed_headers}\n{}",
        hex_sha256(body)
    );
    let credential_scope = format!("{date}/{region}/{service}/aws4_request");
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{date_time}\n{credential_scope}\n{}",
        hex_sha256(canonical_request.as_bytes())
    );
    let signing_key = derive_signing_key(creds.secret_access_key.as_bytes(), date, region, service);
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{credential_scope},SignedHeaders={signed_headers},Signature={signature}",
        creds.access_key_id
    );

    let mut headers: Vec<(String, String)> = headers_to_sign
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    headers.push(("Authorization".into(), authorization));
    headers
}

fn sha256(data: &[u8]) -> Vec<u8> {
    let mut h = Sha256::new();
    h.update(data);
    h.finalize().to_vec()
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// HMAC-SHA256 computed without the `hmac` crate using the raw SHA256 primitive.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    const BLOCK: usize = 64;
    let norm_key = if key.len() > BLOCK { sha256(key) } else { key.to_vec() };
    let mut padded = [0u8; BLOCK];
    padded[..norm_key.len()].copy_from_slice(&norm_key);
    let ipad: Vec<u8> = padded.iter().map(|&b| b ^ 0x36).collect();
    let opad: Vec<u8> = padded.iter().map(|&b| b ^ 0x5c).collect();
    let inner = {
        let mut h = Sha256::new();
        h.update(&ipad);
        h.update(data);
        h.finalize().to_vec()
    };
    let mut h = Sha256::new();
    h.update(&opad);
    h.update(&inner);
    h.finalize().to_vec()
}

fn derive_signing_key(secret: &[u8], date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_secret = [b"AWS4", secret].concat();
    let k_date = hmac_sha256(&k_secret, date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Percent-encode everything outside the unreserved set, keeping `/`
/// (model IDs contain `:` which must be encoded).
fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 2);
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolSchema;

    fn creds() -> AwsCredentials {
        AwsCredentials {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: "secret".into(),
            session_token: None,
        }
    }

    fn request_with(messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest {
            model: "us.anthropic.claude-3-5-sonnet-20241022-v2:0".into(),
            messages,
            max_tokens: 1024,
            temperature: 0.2,
            ..Default::default()
        }
    }

    // ── SigV4 primitives ──────────────────────────────────────────────────────

    #[test]
    fn hmac_sha256_known_vector() {
        let result = hex::encode(hmac_sha256(
            b"key",
            b"The quick brown fox jumps over the lazy dog",
        ));
        assert_eq!(
            result,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn derive_signing_key_is_deterministic() {
        let k1 = derive_signing_key(b"secret", "20240101", "us-east-1", "bedrock");
        let k2 = derive_signing_key(b"secret", "20240101", "us-east-1", "bedrock");
        assert_eq!(k1, k2);
    }

    #[test]
    fn urlencoded_colon_encoded_slash_kept() {
        assert_eq!(urlencoded("us.anthropic.claude:0"), "us.anthropic.claude%3A0");
        assert_eq!(urlencoded("a/b"), "a/b");
    }

    #[test]
    fn sign_request_produces_authorization_header() {
        let headers = sign_request(
            "POST",
            "bedrock-runtime.us-east-1.amazonaws.com",
            "/model/m/invoke",
            b"{}",
            &creds(),
            "us-east-1",
            "bedrock",
        );
        let auth = headers
            .iter()
            .find(|(k, _)| k == "Authorization")
            .map(|(_, v)| v.as_str())
            .unwrap();
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        assert!(auth.contains("SignedHeaders=content-type;host;x-amz-date"));
        assert!(auth.contains("Signature="));
    }

    #[test]
    fn session_token_is_signed_when_present() {
        let with_token = AwsCredentials { session_token: Some("tok".into()), ..creds() };
        let headers = sign_request("POST", "h", "/p", b"{}", &with_token, "us-east-1", "bedrock");
        assert!(headers.iter().any(|(k, _)| k == "x-amz-security-token"));
        let auth = &headers.iter().find(|(k, _)| k == "Authorization").unwrap().1;
        assert!(auth.contains("x-amz-security-token"));
    }

    // ── Message translation ───────────────────────────────────────────────────

    #[test]
    fn system_prompt_travels_out_of_band() {
        let body = anthropic_body(
            &request_with(vec![Message::system("rules"), Message::user("hi")]),
            false,
        );
        assert_eq!(body["system"][0]["text"], "rules");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn cache_hints_mark_system_and_last_user_message() {
        let body = anthropic_body(
            &request_with(vec![
                Message::system("rules"),
                Message::user("first"),
                Message::assistant("ok"),
                Message::user("second"),
            ]),
            true,
        );
        assert_eq!(body["system"][0]["cache_control"]["type"], "ephemeral");
        let messages = body["messages"].as_array().unwrap();
        // Only the LAST user message carries the breakpoint.
        assert!(messages[0]["content"][0].get("cache_control").is_none());
        assert_eq!(
            messages[2]["content"][0]["cache_control"]["type"],
            "ephemeral"
        );
    }

    #[test]
    fn tool_calls_become_tool_use_blocks() {
        let assistant = Message::assistant_with_blocks(vec![
            ContentBlock::text("let me check"),
            ContentBlock::tool_call("toolu_1", "shell", json!({"command": "ls"})),
        ]);
        let body = anthropic_body(&request_with(vec![Message::user("go"), assistant]), false);
        let content = body["messages"][1]["content"].as_array().unwrap();
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "tool_use");
        assert_eq!(content[1]["id"], "toolu_1");
        assert_eq!(content[1]["input"]["command"], "ls");
    }

    #[test]
    fn tool_results_become_user_tool_result_blocks() {
        let results = Message::tool_results(vec![ContentBlock::ToolResult {
            tool_id: "toolu_1".into(),
            tool_name: "shell".into(),
            output: json!({"exit_code": 1, "output": "boom"}),
            is_error: true,
        }]);
        let body = anthropic_body(&request_with(vec![results]), false);
        let block = &body["messages"][0]["content"][0];
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(block["type"], "tool_result");
        assert_eq!(block["tool_use_id"], "toolu_1");
        assert_eq!(block["is_error"], true);
    }

    #[test]
    fn tools_use_input_schema_field() {
        let mut req = request_with(vec![Message::user("x")]);
        req.tools.push(ToolSchema {
            name: "grep".into(),
            description: "search".into(),
            parameters: json!({"type": "object"}),
        });
        let body = anthropic_body(&req, false);
        assert_eq!(body["tools"][0]["name"], "grep");
        assert!(body["tools"][0].get("input_schema").is_some());
    }

    // ── Response parsing ──────────────────────────────────────────────────────

    #[test]
    fn parses_text_and_tool_use() {
        let body = json!({
            "content": [
                {"type": "text", "text": "checking"},
                {"type": "tool_use", "id": "toolu_9", "name": "read",
                 "input": {"path": "f.rs"}}
            ],
            "usage": {"input_tokens": 50, "output_tokens": 9,
                      "cache_read_input_tokens": 30, "cache_creation_input_tokens": 20}
        });
        let (msg, usage) = parse_anthropic_response(&body).unwrap();
        assert_eq!(msg.text(), "checking");
        let calls = msg.tool_calls();
        assert_eq!(calls[0].id, "toolu_9");
        assert_eq!(calls[0].params["path"], "f.rs");
        assert_eq!(usage.prompt_tokens, 50);
        assert_eq!(usage.cache_hit_tokens, 30);
        assert_eq!(usage.cache_miss_tokens, 20);
    }

    #[test]
    fn missing_content_is_parse_error() {
        assert!(parse_anthropic_response(&json!({"usage": {}})).is_err());
    }

    #[test]
    fn unknown_block_types_are_ignored() {
        let body = json!({
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "answer"}
            ],
            "usage": {}
        });
        let (msg, _) = parse_anthropic_response(&body).unwrap();
        assert_eq!(msg.text(), "answer");
        assert!(!msg.has_tool_calls());
    }
}
