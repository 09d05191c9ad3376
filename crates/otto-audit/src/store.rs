// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{debug, warn};

use otto_config::AuditConfig;

/// One provider-call attempt to record.
#[derive(Debug, Clone, Default)]
pub struct ApiCallRecord {
    pub session_id: String,
    pub api_base_url: String,
    pub request_json: String,
    pub headers_json: String,
    pub response_json: String,
    pub model: String,
    pub status: String,
    pub http_status: u16,
    pub error_message: Option<String>,
    pub duration_ms: u64,
    pub tool_count: u32,
}

/// Token counters reported by the provider for one call.
#[derive(Debug, Clone, Default)]
pub struct TokenUsageRecord {
    pub session_id: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cached_tokens: u32,
    pub prompt_cache_hit_tokens: u32,
    pub prompt_cache_miss_tokens: u32,
}

impl TokenUsageRecord {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Thread-safe audit database.  One connection behind a mutex; writes are
/// short single-row inserts.
pub struct AuditLog {
    conn: Mutex<Connection>,
    path: PathBuf,
    config: AuditConfig,
}

impl AuditLog {
    /// Open (or create) the audit database and ensure the schema exists.
    pub fn open(path: &Path, config: AuditConfig) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening audit database {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS api_calls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                session_id TEXT NOT NULL,
                api_base_url TEXT,
                request_json TEXT,
                headers_json TEXT,
                response_json TEXT,
                model TEXT,
                status TEXT,
                http_status INTEGER,
                error_message TEXT,
                duration_ms INTEGER,
                tool_count INTEGER,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_api_calls_session ON api_calls(session_id);
            CREATE INDEX IF NOT EXISTS idx_api_calls_created ON api_calls(created_at);
            CREATE TABLE IF NOT EXISTS token_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                api_call_id INTEGER NOT NULL REFERENCES api_calls(id),
                session_id TEXT NOT NULL,
                prompt_tokens INTEGER,
                completion_tokens INTEGER,
                total_tokens INTEGER,
                cached_tokens INTEGER,
                prompt_cache_hit_tokens INTEGER,
                prompt_cache_miss_tokens INTEGER,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_token_usage_call ON token_usage(api_call_id);",
        )
        .context("creating audit schema")?;
        debug!(path = %path.display(), "audit database open");
        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
            config,
        })
    }

    /// Record one call attempt.  Returns the `api_calls` row id.
    pub fn record_api_call(&self, record: &ApiCallRecord) -> anyhow::Result<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO api_calls (timestamp, session_id, api_base_url, request_json, \
             headers_json, response_json, model, status, http_status, error_message, \
             duration_ms, tool_count, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                now,
                record.session_id,
                record.api_base_url,
                record.request_json,
                redact_headers(&record.headers_json),
                record.response_json,
                record.model,
                record.status,
                record.http_status,
                record.error_message,
                record.duration_ms as i64,
                record.tool_count,
                now,
            ],
        )
        .context("inserting api_calls row")?;
        Ok(conn.last_insert_rowid())
    }

    /// Record the token counters for a previously recorded call.
    pub fn record_token_usage(
        &self,
        api_call_id: i64,
        usage: &TokenUsageRecord,
    ) -> anyhow::Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO token_usage (api_call_id, session_id, prompt_tokens, \
             completion_tokens, total_tokens, cached_tokens, prompt_cache_hit_tokens, \
             prompt_cache_miss_tokens, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                api_call_id,
                usage.session_id,
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.total_tokens(),
                usage.cached_tokens,
                usage.prompt_cache_hit_tokens,
                usage.prompt_cache_miss_tokens,
                now,
            ],
        )
        .context("inserting token_usage row")?;
        Ok(())
    }

    /// Apply age, count, and size rotation, then VACUUM if anything was
    /// deleted.  Called at startup; rotation failures are logged, not fatal.
    pub fn rotate(&self) -> anyhow::Result<()> {
        let mut deleted = 0usize;
        {
            let conn = self.conn.lock().unwrap();

            if let Some(days) = self.config.max_days {
                let cutoff = (Utc::now() - chrono::Duration::days(days as i64)).to_rfc3339();
                deleted += conn.execute(
                    "DELETE FROM token_usage WHERE api_call_id IN \
                     (SELECT id FROM api_calls WHERE created_at < ?1)",
                    params![cutoff],
                )?;
                deleted += conn.execute(
                    "DELETE FROM api_calls WHERE created_at < ?1",
                    params![cutoff],
                )?;
            }

            if let Some(max_records) = self.config.max_records {
                deleted += conn.execute(
                    "DELETE FROM token_usage WHERE api_call_id NOT IN \
                     (SELECT id FROM api_calls ORDER BY id DESC LIMIT ?1)",
                    params![max_records as i64],
                )?;
                deleted += conn.execute(
                    "DELETE FROM api_calls WHERE id NOT IN \
                     (SELECT id FROM api_calls ORDER BY id DESC LIMIT ?1)",
                    params![max_records as i64],
                )?;
            }

            if let Some(max_mb) = self.config.max_size_mb {
                let size = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
                if size > max_mb * 1024 * 1024 {
                    // Drop the oldest half of the rows to get back under the cap.
                    let keep: i64 = conn.query_row(
                        "SELECT COUNT(*) / 2 FROM api_calls",
                        [],
                        |row| row.get(0),
                    )?;
                    warn!(
                        size_bytes = size,
                        keep_rows = keep,
                        "audit database over size cap, dropping oldest rows"
                    );
                    deleted += conn.execute(
                        "DELETE FROM token_usage WHERE api_call_id NOT IN \
                         (SELECT id FROM api_calls ORDER BY id DESC LIMIT ?1)",
                        params![keep],
                    )?;
                    deleted += conn.execute(
                        "DELETE FROM api_calls WHERE id NOT IN \
                         (SELECT id FROM api_calls ORDER BY id DESC LIMIT ?1)",
                        params![keep],
                    )?;
                }
            }

            if deleted > 0 {
                conn.execute_batch("VACUUM;")?;
            }
        }
        if deleted > 0 {
            debug!(deleted, "audit rotation complete");
        }
        Ok(())
    }

    /// Row count in `api_calls` (used by rotation tests and `--stats`).
    pub fn call_count(&self) -> anyhow::Result<u64> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM api_calls", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

/// Strip credential values from a headers JSON object before storage.
fn redact_headers(headers_json: &str) -> String {
    let Ok(mut value) = serde_json::from_str::<serde_json::Value>(headers_json) else {
        return headers_json.to_string();
    };
    if let Some(map) = value.as_object_mut() {
        for (k, v) in map.iter_mut() {
            let lower = k.to_ascii_lowercase();
            if lower == "authorization" || lower == "x-amz-security-token" || lower == "api-key" {
                *v = serde_json::Value::String("<redacted>".into());
            }
        }
    }
    value.to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
