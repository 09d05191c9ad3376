// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Vendor-neutral conversation model and the provider call pipeline.
//!
//! The conversation lives in one internal representation ([`Message`] with
//! typed [`ContentBlock`]s).  Provider codecs translate it to wire JSON:
//! OpenAI-compatible chat completions, or Anthropic messages when routed
//! through AWS Bedrock.  [`CallPipeline`] wraps a [`ModelProvider`] with
//! retry/backoff/jitter, credential rotation, cancellation checks, and
//! audit logging.

pub mod bedrock;
pub mod codec;
mod credentials;
mod error;
mod mock;
pub mod openai;
mod pipeline;
mod provider;
mod retry;
pub mod types;

pub use credentials::{AwsCredentials, CredentialStore};
pub use error::{CallError, ErrorKind};
pub use mock::MockProvider;
pub use pipeline::{ApiCallResult, CallPipeline};
pub use provider::{AuthRefresh, ModelProvider, ProviderResponse};
pub use retry::RetryPolicy;
pub use types::{CompletionRequest, ContentBlock, Message, Role, ToolSchema, Usage};

use std::sync::Arc;

use otto_config::ModelConfig;

/// Build a provider from configuration.
///
/// Dispatch is a match over the typed provider variant; each arm carries its
/// own configuration fields.
pub fn from_config(config: &ModelConfig) -> anyhow::Result<Arc<dyn ModelProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(openai::OpenAiProvider::from_config(config)?)),
        "bedrock" => Ok(Arc::new(bedrock::BedrockProvider::from_config(config)?)),
        "mock" => Ok(Arc::new(MockProvider::echo())),
        other => anyhow::bail!("unknown provider '{other}' (expected openai | bedrock)"),
    }
}
