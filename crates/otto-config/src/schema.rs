// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// Serde default helper that returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `false`, so fields
/// that should be enabled unless explicitly disabled need a named function.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

fn default_max_tool_rounds() -> u32 {
    32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Ceiling on model→tools round-trips within one user turn.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { max_tool_rounds: default_max_tool_rounds() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier: "openai" (any OpenAI-compatible endpoint) or
    /// "bedrock" (Anthropic models behind AWS Bedrock).
    pub provider: String,
    /// Model name forwarded to the provider API.
    pub name: String,
    /// Environment variable that holds the API key (read at runtime).
    pub api_key_env: Option<String>,
    /// Base URL override.  Useful for local proxies or gateways.  For hosted
    /// providers the correct default is auto-selected.
    pub base_url: Option<String>,
    /// Maximum tokens to request in a single completion.
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0–2.0).
    pub temperature: Option<f32>,

    // ── AWS Bedrock ───────────────────────────────────────────────────────────
    /// AWS region override (also honoured via AWS_DEFAULT_REGION env var).
    pub aws_region: Option<String>,
    /// Profile in `~/.aws/credentials` to read (also via AWS_PROFILE).
    pub aws_profile: Option<String>,
    /// Command invoked to refresh expired AWS credentials when reloading the
    /// credentials file did not produce a new key (e.g. `aws sso login`).
    pub login_command: Option<String>,

    // ── Prompt caching ────────────────────────────────────────────────────────
    /// Mark the system block and the last user message with a cache
    /// breakpoint so the provider may reuse a prefix cache.  Anthropic
    /// models honour `"cache_control": {"type": "ephemeral"}`; other
    /// providers ignore the annotation.
    #[serde(default = "default_true")]
    pub cache_prompts: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "gpt-4o".into(),
            api_key_env: None,
            base_url: None,
            max_tokens: None,
            temperature: None,
            aws_region: None,
            aws_profile: None,
            login_command: None,
            cache_prompts: true,
        }
    }
}

/// Named retry presets selectable from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetryPreset {
    #[default]
    Default,
    /// 8 attempts, for flaky networks or heavily throttled accounts.
    Aggressive,
    /// 3 attempts, fail fast.
    Conservative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Preset providing the baseline values; explicit fields below override.
    #[serde(default)]
    pub preset: RetryPreset,
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            preset: RetryPreset::Default,
            max_attempts: None,
            base_delay_ms: None,
            max_delay_ms: None,
            jitter: true,
        }
    }
}

fn default_shell_timeout_ms() -> u64 {
    120_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default timeout for shell command execution, in milliseconds.
    #[serde(default = "default_shell_timeout_ms")]
    pub shell_timeout_ms: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self { shell_timeout_ms: default_shell_timeout_ms() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Explicit database path.  Overridden by `CLAUDE_C_DB_PATH`.
    pub db_path: Option<String>,
    /// Delete audit rows older than this many days.  `CLAUDE_C_DB_MAX_DAYS`.
    pub max_days: Option<u32>,
    /// Keep at most this many api_call rows.  `CLAUDE_C_DB_MAX_RECORDS`.
    pub max_records: Option<u64>,
    /// Rotate when the database file exceeds this size.
    /// `CLAUDE_C_DB_MAX_SIZE_MB`.
    pub max_size_mb: Option<u64>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
