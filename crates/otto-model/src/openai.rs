// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! OpenAI-compatible chat completion driver.
//!
//! Speaks the plain (non-streaming) `/chat/completions` request/response
//! cycle against any endpoint implementing the OpenAI wire format: the
//! hosted API, gateways, or local servers.  Auth is `Authorization: Bearer`.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use otto_config::ModelConfig;

use crate::codec;
use crate::error::CallError;
use crate::provider::{parse_retry_after, ModelProvider, ProviderResponse};
use crate::types::CompletionRequest;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    model: String,
    api_key: Option<String>,
    chat_url: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(model: String, api_key: Option<String>, base_url: Option<&str>) -> Self {
        let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string();
        Self {
            model,
            api_key,
            chat_url: format!("{base}/chat/completions"),
            base_url: base,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &ModelConfig) -> anyhow::Result<Self> {
        let key_env = config.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
        let api_key = std::env::var(key_env).ok().filter(|k| !k.is_empty());
        Ok(Self::new(
            config.name.clone(),
            api_key,
            config.base_url.as_deref(),
        ))
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn api_base_url(&self) -> String {
        self.base_url.clone()
    }

    fn audit_headers(&self) -> Value {
        serde_json::json!({
            "content-type": "application/json",
            "authorization": if self.api_key.is_some() { "Bearer <set>" } else { "<unset>" },
        })
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<ProviderResponse, CallError> {
        let key = self.api_key.as_deref().ok_or_else(|| CallError::Transport {
            message: "API key not set; export OPENAI_API_KEY or set api_key_env in config".into(),
        })?;

        let body = codec::build_request(req);
        debug!(
            model = %self.model,
            message_count = req.messages.len(),
            tool_count = req.tools.len(),
            "sending chat completion request"
        );

        let started = Instant::now();
        let resp = self
            .client
            .post(&self.chat_url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let status = resp.status().as_u16();
        let retry_after = parse_retry_after(resp.headers());
        let bytes = resp.bytes().await.map_err(transport_error)?;
        let duration_ms = started.elapsed().as_millis() as u64;
        // Intermediaries occasionally return non-UTF-8 error pages; the
        // printable form keeps those storable in the audit trail.
        let raw_body = otto_audit::printable_body(&bytes);

        if !(200..300).contains(&status) {
            return Err(CallError::Http { status, body: raw_body, retry_after });
        }

        let response_json: Value =
            serde_json::from_slice(&bytes).map_err(|e| CallError::Parse {
                message: format!("invalid JSON from provider: {e}"),
                raw: raw_body.clone(),
            })?;
        let (message, usage) = codec::parse_response(&response_json)?;

        Ok(ProviderResponse {
            message,
            usage,
            http_status: status,
            duration_ms,
            raw_body,
            response_json,
        })
    }
}

/// Map a reqwest failure to the transport bucket with a usable message.
fn transport_error(e: reqwest::Error) -> CallError {
    let class = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else {
        "io"
    };
    CallError::Transport { message: format!("{class}: {e}") }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
