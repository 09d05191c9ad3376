// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest
/// priority.  Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. System-wide default
    paths.push(PathBuf::from("/etc/otto/config.yaml"));
    paths.push(PathBuf::from("/etc/otto/config.yml"));

    // 2. XDG / home
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/otto/config.yaml"));
        paths.push(home.join(".config/otto/config.yml"));
    }

    // 3. Workspace-local
    paths.push(PathBuf::from(".otto/config.yaml"));
    paths.push(PathBuf::from(".otto/config.yml"));
    paths.push(PathBuf::from(".otto.yaml"));
    paths.push(PathBuf::from(".otto.yml"));

    paths
}

/// Load configuration by merging all discovered YAML files, then applying
/// environment overrides.  The `extra` argument may provide an explicit path
/// (the `--config` CLI flag), merged last.
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            merge_yaml(&mut merged, load_layer(&path)?);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        merge_yaml(&mut merged, load_layer(p)?);
    }

    let mut config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty())
    {
        Config::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

fn load_layer(path: &Path) -> anyhow::Result<serde_yaml::Value> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Environment variables that form the external interface take precedence
/// over any file-based configuration.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("CLAUDE_C_DB_PATH") {
        if !v.is_empty() {
            config.audit.db_path = Some(shellexpand::tilde(&v).into_owned());
        }
    }
    if let Some(v) = env_parse::<u32>("CLAUDE_C_DB_MAX_DAYS") {
        config.audit.max_days = Some(v);
    }
    if let Some(v) = env_parse::<u64>("CLAUDE_C_DB_MAX_RECORDS") {
        config.audit.max_records = Some(v);
    }
    if let Some(v) = env_parse::<u64>("CLAUDE_C_DB_MAX_SIZE_MB") {
        config.audit.max_size_mb = Some(v);
    }
    if let Some(v) = env_parse::<u32>("OTTO_RETRY_MAX_ATTEMPTS") {
        config.retry.max_attempts = Some(v);
    }
    if let Some(v) = env_parse::<u64>("OTTO_RETRY_BASE_DELAY_MS") {
        config.retry.base_delay_ms = Some(v);
    }
    if let Some(v) = env_parse::<u64>("OTTO_RETRY_MAX_DELAY_MS") {
        config.retry.max_delay_ms = Some(v);
    }
    if let Ok(v) = std::env::var("OTTO_RETRY_JITTER") {
        config.retry.jitter = !matches!(v.as_str(), "0" | "false" | "off");
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
