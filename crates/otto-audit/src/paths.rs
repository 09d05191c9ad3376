// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

const DB_FILE: &str = "otto.db";

/// Resolve the audit database location.
///
/// Precedence: explicit config path, then `CLAUDE_C_DB_PATH`, then the
/// fallback chain `./.claude-c/`, `$XDG_DATA_HOME/otto/`,
/// `~/.local/share/otto/`, and finally the working directory.  The
/// `CLAUDE_C_*` names and the `.claude-c` directory are kept so existing
/// audit databases remain usable as-is.
pub fn resolve_db_path(configured: Option<&str>) -> PathBuf {
    if let Ok(env_path) = std::env::var("CLAUDE_C_DB_PATH") {
        if !env_path.is_empty() {
            return PathBuf::from(env_path);
        }
    }
    if let Some(p) = configured {
        return PathBuf::from(p);
    }

    let local = PathBuf::from(".claude-c");
    if local.is_dir() || std::fs::create_dir_all(&local).is_ok() {
        return local.join(DB_FILE);
    }

    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        if !xdg.is_empty() {
            let dir = PathBuf::from(xdg).join("otto");
            if std::fs::create_dir_all(&dir).is_ok() {
                return dir.join(DB_FILE);
            }
        }
    }

    if let Some(home) = dirs::home_dir() {
        let dir = home.join(".local/share/otto");
        if std::fs::create_dir_all(&dir).is_ok() {
            return dir.join(DB_FILE);
        }
    }

    PathBuf::from(DB_FILE)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_path_wins_without_env() {
        // The env override is process-global; only assert the config branch
        // when the variable is absent in the test environment.
        if std::env::var("CLAUDE_C_DB_PATH").is_err() {
            let p = resolve_db_path(Some("/tmp/custom/audit.db"));
            assert_eq!(p, PathBuf::from("/tmp/custom/audit.db"));
        }
    }

    #[test]
    fn fallback_resolves_to_db_file() {
        if std::env::var("CLAUDE_C_DB_PATH").is_err() {
            let p = resolve_db_path(None);
            assert_eq!(p.file_name().unwrap(), DB_FILE);
        }
    }
}
