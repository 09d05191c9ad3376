// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The provider call pipeline.
//!
//! One entry point, [`CallPipeline::call`], owns everything between "the
//! worker wants an assistant turn" and "here is the parsed result or a
//! structured failure": request encoding, the retry loop with
//! backoff/jitter and `Retry-After` pacing, the credential-rotation state
//! machine, cancellation checks before every attempt and every sleep, and
//! audit logging of each attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use otto_audit::{ApiCallRecord, AuditLog, TokenUsageRecord};

use crate::codec;
use crate::error::{CallError, ErrorKind};
use crate::provider::{AuthRefresh, ModelProvider, ProviderResponse};
use crate::retry::RetryPolicy;
use crate::types::{CompletionRequest, Message, Usage};

/// Final outcome of one pipeline call, success or failure.
#[derive(Debug, Clone)]
pub struct ApiCallResult {
    /// The parsed assistant turn on success.
    pub message: Option<Message>,
    pub usage: Option<Usage>,
    pub response_json: Option<Value>,
    /// Raw body of the last response (success or final failure).
    pub raw_response: String,
    pub http_status: u16,
    pub duration_ms: u64,
    pub error_message: Option<String>,
    /// Whether the final error was of a retryable kind (budget exhausted).
    pub is_retryable: bool,
    /// True when credential rotation happened during this call.
    pub auth_refreshed: bool,
    /// The request as encoded for the provider, for audit and debugging.
    pub request_json: Value,
}

impl ApiCallResult {
    pub fn is_success(&self) -> bool {
        self.message.is_some()
    }

    fn success(resp: ProviderResponse, request_json: Value, auth_refreshed: bool) -> Self {
        Self {
            message: Some(resp.message),
            usage: Some(resp.usage),
            response_json: Some(resp.response_json),
            raw_response: resp.raw_body,
            http_status: resp.http_status,
            duration_ms: resp.duration_ms,
            error_message: None,
            is_retryable: false,
            auth_refreshed,
            request_json,
        }
    }

    fn failure(err: &CallError, request_json: Value, auth_refreshed: bool) -> Self {
        let raw_response = match err {
            CallError::Http { body, .. } => body.clone(),
            CallError::Parse { raw, .. } => raw.clone(),
            _ => String::new(),
        };
        Self {
            message: None,
            usage: None,
            response_json: None,
            raw_response,
            http_status: err.http_status().unwrap_or(0),
            duration_ms: 0,
            error_message: Some(err.to_string()),
            is_retryable: err.is_retryable(),
            auth_refreshed,
            request_json,
        }
    }

    fn cancelled(request_json: Value) -> Self {
        Self::failure(&CallError::Cancelled, request_json, false)
    }
}

/// Rotation progress for the auth state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rotation {
    NotTried,
    /// Fresh credentials in place; the next auth failure grants one final
    /// retry, nothing more.
    RotatedOnce,
    Exhausted,
}

pub struct CallPipeline {
    provider: Arc<dyn ModelProvider>,
    policy: RetryPolicy,
    audit: Option<Arc<AuditLog>>,
}

impl CallPipeline {
    pub fn new(provider: Arc<dyn ModelProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy, audit: None }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    /// Execute one completion with retries and credential rotation.
    ///
    /// HTTP attempt count is bounded by `max_attempts` for non-auth
    /// failures, and `max_attempts + 2` when rotation occurs (one retry with
    /// fresh credentials plus one final retry).
    pub async fn call(
        &self,
        req: &CompletionRequest,
        session_id: &str,
        interrupt: &AtomicBool,
    ) -> ApiCallResult {
        let request_json = codec::build_request(req);
        let tool_count = req.tools.len() as u32;

        let mut budget = self.policy.max_attempts;
        let mut attempt: u32 = 0;
        let mut auth_refreshed = false;
        let mut rotation = Rotation::NotTried;

        loop {
            if interrupt.load(Ordering::Acquire) {
                return ApiCallResult::cancelled(request_json);
            }

            attempt += 1;
            match self.provider.complete(req).await {
                Ok(resp) => {
                    self.audit_attempt(session_id, &request_json, tool_count, Ok(&resp));
                    return ApiCallResult::success(resp, request_json, auth_refreshed);
                }
                Err(err) => {
                    self.audit_attempt(session_id, &request_json, tool_count, Err(&err));
                    let kind = err.kind();
                    debug!(attempt, kind = kind.as_str(), "provider call failed");

                    if kind == ErrorKind::AuthError {
                        match rotation {
                            Rotation::NotTried => {
                                match self.provider.refresh_credentials().await {
                                    Ok(AuthRefresh::Rotated { external }) => {
                                        debug!(external, "credentials rotated, retrying");
                                        auth_refreshed = true;
                                        rotation = Rotation::RotatedOnce;
                                        budget += 1;
                                        continue;
                                    }
                                    Ok(AuthRefresh::Unsupported) => {
                                        return ApiCallResult::failure(
                                            &err,
                                            request_json,
                                            auth_refreshed,
                                        );
                                    }
                                    Err(rotate_err) => {
                                        warn!(error = %rotate_err, "credential rotation failed");
                                        return ApiCallResult::failure(
                                            &err,
                                            request_json,
                                            auth_refreshed,
                                        );
                                    }
                                }
                            }
                            Rotation::RotatedOnce => {
                                debug!("auth error persists after rotation, final retry");
                                rotation = Rotation::Exhausted;
                                budget += 1;
                                continue;
                            }
                            Rotation::Exhausted => {
                                return ApiCallResult::failure(&err, request_json, auth_refreshed);
                            }
                        }
                    }

                    if !err.is_retryable() || attempt >= budget {
                        return ApiCallResult::failure(&err, request_json, auth_refreshed);
                    }

                    let delay = self.policy.delay_for(attempt - 1, err.retry_after_secs());
                    debug!(delay_ms = delay.as_millis() as u64, "backing off before retry");
                    if interrupt.load(Ordering::Acquire) {
                        return ApiCallResult::cancelled(request_json);
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Record one attempt in the audit log; storage failures are logged and
    /// never break the call.
    fn audit_attempt(
        &self,
        session_id: &str,
        request_json: &Value,
        tool_count: u32,
        outcome: Result<&ProviderResponse, &CallError>,
    ) {
        let Some(audit) = &self.audit else { return };
        let headers_json = self.provider.audit_headers().to_string();

        let record = match outcome {
            Ok(resp) => ApiCallRecord {
                session_id: session_id.into(),
                api_base_url: self.provider.api_base_url(),
                request_json: request_json.to_string(),
                headers_json: headers_json.clone(),
                response_json: resp.raw_body.clone(),
                model: self.provider.model_name().into(),
                status: "success".into(),
                http_status: resp.http_status,
                error_message: None,
                duration_ms: resp.duration_ms,
                tool_count,
            },
            Err(err) => ApiCallRecord {
                session_id: session_id.into(),
                api_base_url: self.provider.api_base_url(),
                request_json: request_json.to_string(),
                headers_json,
                response_json: match err {
                    CallError::Http { body, .. } => body.clone(),
                    CallError::Parse { raw, .. } => raw.clone(),
                    _ => String::new(),
                },
                model: self.provider.model_name().into(),
                status: err.kind().as_str().into(),
                http_status: err.http_status().unwrap_or(0),
                error_message: Some(err.to_string()),
                duration_ms: 0,
                tool_count,
            },
        };

        match audit.record_api_call(&record) {
            Ok(call_id) => {
                if let Ok(resp) = outcome {
                    let usage = TokenUsageRecord {
                        session_id: session_id.into(),
                        prompt_tokens: resp.usage.prompt_tokens,
                        completion_tokens: resp.usage.completion_tokens,
                        cached_tokens: resp.usage.cached_tokens,
                        prompt_cache_hit_tokens: resp.usage.cache_hit_tokens,
                        prompt_cache_miss_tokens: resp.usage.cache_miss_tokens,
                    };
                    if let Err(e) = audit.record_token_usage(call_id, &usage) {
                        warn!(error = %e, "failed to record token usage");
                    }
                }
            }
            Err(e) => warn!(error = %e, "failed to record api call"),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;

    fn http(status: u16) -> CallError {
        CallError::Http { status, body: String::new(), retry_after: None }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            multiplier: 2.0,
            max_delay_ms: 8,
            jitter: true,
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "mock-model".into(),
            messages: vec![Message::user("hello")],
            max_tokens: 64,
            ..Default::default()
        }
    }

    fn not_interrupted() -> AtomicBool {
        AtomicBool::new(false)
    }

    async fn run(pipeline: &CallPipeline) -> ApiCallResult {
        pipeline.call(&request(), "session-test", &not_interrupted()).await
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let provider = Arc::new(MockProvider::with_script(vec![Ok(Message::assistant("hi"))]));
        let pipeline = CallPipeline::new(provider.clone(), fast_policy(5));
        let result = run(&pipeline).await;
        assert!(result.is_success());
        assert_eq!(result.message.unwrap().text(), "hi");
        assert_eq!(provider.calls(), 1);
        assert!(!result.auth_refreshed);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_until_success() {
        // Three 500s then success: exactly four attempts.
        let provider = Arc::new(MockProvider::with_script(vec![
            Err(http(500)),
            Err(http(500)),
            Err(http(500)),
            Ok(Message::assistant("recovered")),
        ]));
        let pipeline = CallPipeline::new(provider.clone(), fast_policy(5));
        let result = run(&pipeline).await;
        assert!(result.is_success());
        assert_eq!(provider.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_count_is_bounded_for_non_auth_errors() {
        let provider = Arc::new(MockProvider::with_script(vec![
            Err(http(503)),
            Err(http(503)),
            Err(http(503)),
            Err(http(503)),
        ]));
        let pipeline = CallPipeline::new(provider.clone(), fast_policy(3));
        let result = run(&pipeline).await;
        assert!(!result.is_success());
        assert_eq!(provider.calls(), 3);
        assert!(result.is_retryable, "budget exhaustion keeps the retryable flag");
        assert_eq!(result.http_status, 503);
    }

    #[tokio::test]
    async fn client_errors_fail_without_retry() {
        let provider = Arc::new(MockProvider::with_script(vec![Err(CallError::Http {
            status: 404,
            body: "no such model".into(),
            retry_after: None,
        })]));
        let pipeline = CallPipeline::new(provider.clone(), fast_policy(5));
        let result = run(&pipeline).await;
        assert!(!result.is_success());
        assert_eq!(provider.calls(), 1);
        assert!(!result.is_retryable);
        assert!(result.error_message.unwrap().contains("no such model"));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_overrides_backoff_delay() {
        let provider = Arc::new(MockProvider::with_script(vec![
            Err(CallError::Http { status: 429, body: String::new(), retry_after: Some(7) }),
            Ok(Message::assistant("ok")),
        ]));
        let pipeline = CallPipeline::new(provider.clone(), fast_policy(5));
        let started = tokio::time::Instant::now();
        let result = run(&pipeline).await;
        assert!(result.is_success());
        // (7 + 1) seconds, not the millisecond-scale backoff.
        assert!(started.elapsed() >= std::time::Duration::from_secs(8));
    }

    #[tokio::test]
    async fn auth_error_with_rotation_retries_once() {
        // 401 → rotate (external) → success.  Exactly two HTTP calls and one
        // rotation; no login command semantics at this level.
        let provider = Arc::new(
            MockProvider::with_script(vec![Err(http(401)), Ok(Message::assistant("ok"))])
                .with_refresh(vec![Ok(AuthRefresh::Rotated { external: true })]),
        );
        let pipeline = CallPipeline::new(provider.clone(), fast_policy(5));
        let result = run(&pipeline).await;
        assert!(result.is_success());
        assert!(result.auth_refreshed);
        assert_eq!(provider.calls(), 2);
        assert_eq!(provider.refreshes(), 1);
    }

    #[tokio::test]
    async fn persistent_auth_failure_gets_one_final_retry_then_fails() {
        let provider = Arc::new(
            MockProvider::with_script(vec![Err(http(401)), Err(http(401)), Err(http(401))])
                .with_refresh(vec![Ok(AuthRefresh::Rotated { external: false })]),
        );
        let pipeline = CallPipeline::new(provider.clone(), fast_policy(5));
        let result = run(&pipeline).await;
        assert!(!result.is_success());
        assert!(result.auth_refreshed);
        // Initial attempt + post-rotation retry + final retry.
        assert_eq!(provider.calls(), 3);
        assert_eq!(provider.refreshes(), 1);
    }

    #[tokio::test]
    async fn auth_error_without_rotation_support_fails_immediately() {
        let provider = Arc::new(MockProvider::with_script(vec![Err(http(403))]));
        let pipeline = CallPipeline::new(provider.clone(), fast_policy(5));
        let result = run(&pipeline).await;
        assert!(!result.is_success());
        assert!(!result.auth_refreshed);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn interrupt_before_first_attempt_cancels() {
        let provider = Arc::new(MockProvider::echo());
        let pipeline = CallPipeline::new(provider.clone(), fast_policy(5));
        let interrupted = AtomicBool::new(true);
        let result = pipeline.call(&request(), "s", &interrupted).await;
        assert!(!result.is_success());
        assert_eq!(result.error_message.as_deref(), Some("cancelled"));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn request_json_is_reported_for_audit() {
        let provider = Arc::new(MockProvider::with_script(vec![Ok(Message::assistant("hi"))]));
        let pipeline = CallPipeline::new(provider, fast_policy(5));
        let result = run(&pipeline).await;
        assert_eq!(result.request_json["model"], "mock-model");
        assert_eq!(result.request_json["messages"][0]["role"], "user");
    }
}
