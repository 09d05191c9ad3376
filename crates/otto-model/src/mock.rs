// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Scripted provider for tests.
//!
//! Outcomes are consumed front-to-back; when the script is empty the
//! provider echoes the last user message.  Call and rotation counters let
//! tests assert exactly how many HTTP-equivalent attempts the pipeline made.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::error::CallError;
use crate::provider::{AuthRefresh, ModelProvider, ProviderResponse};
use crate::types::{CompletionRequest, Message, Usage};

pub struct MockProvider {
    script: Mutex<VecDeque<Result<Message, CallError>>>,
    refresh_script: Mutex<VecDeque<Result<AuthRefresh, CallError>>>,
    calls: AtomicU32,
    refreshes: AtomicU32,
}

impl MockProvider {
    /// Provider that echoes user input (no scripted outcomes).
    pub fn echo() -> Self {
        Self::with_script(Vec::new())
    }

    pub fn with_script(outcomes: Vec<Result<Message, CallError>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            refresh_script: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
            refreshes: AtomicU32::new(0),
        }
    }

    /// Queue outcomes for `refresh_credentials`.  Without any, rotation
    /// reports `Unsupported`.
    pub fn with_refresh(self, outcomes: Vec<Result<AuthRefresh, CallError>>) -> Self {
        *self.refresh_script.lock().unwrap() = outcomes.into();
        self
    }

    /// Number of `complete` calls observed.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of `refresh_credentials` calls observed.
    pub fn refreshes(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn response(message: Message) -> ProviderResponse {
        let response_json = json!({ "mock": true });
        ProviderResponse {
            message,
            usage: Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                ..Default::default()
            },
            http_status: 200,
            duration_ms: 1,
            raw_body: response_json.to_string(),
            response_json,
        }
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }

    fn api_base_url(&self) -> String {
        "mock://".into()
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<ProviderResponse, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = self.script.lock().unwrap().pop_front() {
            return outcome.map(Self::response);
        }
        let last_user = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == crate::types::Role::User)
            .map(|m| m.text())
            .unwrap_or_default();
        Ok(Self::response(Message::assistant(format!("echo: {last_user}"))))
    }

    async fn refresh_credentials(&self) -> Result<AuthRefresh, CallError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        match self.refresh_script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(AuthRefresh::Unsupported),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_reflects_last_user_message() {
        let p = MockProvider::echo();
        let req = CompletionRequest {
            messages: vec![Message::user("ping")],
            ..Default::default()
        };
        let resp = p.complete(&req).await.unwrap();
        assert_eq!(resp.message.text(), "echo: ping");
        assert_eq!(p.calls(), 1);
    }

    #[tokio::test]
    async fn script_is_consumed_in_order() {
        let p = MockProvider::with_script(vec![
            Err(CallError::Http { status: 500, body: "boom".into(), retry_after: None }),
            Ok(Message::assistant("recovered")),
        ]);
        let req = CompletionRequest::default();
        assert!(p.complete(&req).await.is_err());
        assert_eq!(p.complete(&req).await.unwrap().message.text(), "recovered");
        assert_eq!(p.calls(), 2);
    }

    #[tokio::test]
    async fn default_refresh_is_unsupported() {
        let p = MockProvider::echo();
        assert_eq!(p.refresh_credentials().await.unwrap(), AuthRefresh::Unsupported);
        assert_eq!(p.refreshes(), 1);
    }
}
