// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::Value;

use crate::error::CallError;
use crate::types::{CompletionRequest, Message, Usage};

/// A successfully parsed provider response.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// The assistant turn (text and/or tool-call blocks).
    pub message: Message,
    pub usage: Usage,
    pub http_status: u16,
    pub duration_ms: u64,
    /// Raw response body as received, for the audit trail.
    pub raw_body: String,
    /// Parsed response body.
    pub response_json: Value,
}

/// Outcome of a credential-rotation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRefresh {
    /// This provider has no rotatable credentials (e.g. env-var API keys).
    Unsupported,
    /// Fresh credentials are in place.  `external` is true when another
    /// process had already rotated the credentials file and reloading was
    /// sufficient; false when the configured login command had to run.
    Rotated { external: bool },
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider id for status display and audit rows.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Endpoint base recorded in the audit log.
    fn api_base_url(&self) -> String;

    /// Request headers as recorded in the audit log.  Credential values are
    /// redacted again at the storage layer; do not rely on this for secrecy.
    fn audit_headers(&self) -> Value {
        serde_json::json!({ "content-type": "application/json" })
    }

    /// Execute one completion request.  No retries at this level; pacing,
    /// rotation, and cancellation live in the pipeline.
    async fn complete(&self, req: &CompletionRequest) -> Result<ProviderResponse, CallError>;

    /// Attempt to rotate credentials after an auth failure.
    async fn refresh_credentials(&self) -> Result<AuthRefresh, CallError> {
        Ok(AuthRefresh::Unsupported)
    }
}

/// Parse a `Retry-After` response header value (seconds form only).
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
