// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Configuration loading for otto.
//!
//! Layered YAML files merged lowest-to-highest priority, followed by
//! environment overrides for the knobs that are part of the external
//! interface (database location/rotation and retry tuning).

mod loader;
mod schema;

pub use loader::load;
pub use schema::{
    AgentConfig, AuditConfig, Config, ModelConfig, RetryConfig, RetryPreset, ToolsConfig,
};
