// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! AWS credential loading and rotation.
//!
//! Credentials come from the shared credentials file
//! (`~/.aws/credentials`, profile-aware) or from the standard environment
//! variables.  On auth failures the store supports two recovery paths:
//!
//! 1. **External rotation**: another process refreshed the file.  Detected
//!    by comparing the cached access-key-id against a fresh read; a changed
//!    key means reloading is enough.
//! 2. **Login command**: the key is unchanged, so the configured login
//!    command (e.g. `aws sso login`) runs once, then the file is re-read.

use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::CallError;
use crate::provider::AuthRefresh;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

pub struct CredentialStore {
    file_path: PathBuf,
    profile: String,
    login_command: Option<String>,
    current: Mutex<Option<AwsCredentials>>,
}

impl CredentialStore {
    /// Store reading the default shared credentials file.  Profile comes
    /// from the argument, then `AWS_PROFILE`, then `"default"`.
    pub fn new(profile: Option<String>, login_command: Option<String>) -> Self {
        let profile = profile
            .or_else(|| std::env::var("AWS_PROFILE").ok())
            .unwrap_or_else(|| "default".into());
        let file_path = dirs::home_dir()
            .map(|h| h.join(".aws/credentials"))
            .unwrap_or_else(|| PathBuf::from(".aws/credentials"));
        Self::with_file(file_path, profile, login_command)
    }

    /// Store reading an explicit credentials file (tests, non-standard
    /// setups).
    pub fn with_file(
        file_path: PathBuf,
        profile: impl Into<String>,
        login_command: Option<String>,
    ) -> Self {
        Self {
            file_path,
            profile: profile.into(),
            login_command,
            current: Mutex::new(None),
        }
    }

    /// Load credentials, caching them for rotation comparison.
    pub fn load(&self) -> Result<AwsCredentials, CallError> {
        let creds = self.read_source().ok_or_else(|| CallError::Transport {
            message: format!(
                "no AWS credentials: profile '{}' not in {} and AWS_ACCESS_KEY_ID unset",
                self.profile,
                self.file_path.display()
            ),
        })?;
        *self.current.lock().unwrap() = Some(creds.clone());
        Ok(creds)
    }

    /// Credentials file first (that is what external rotation rewrites),
    /// environment as fallback.
    fn read_source(&self) -> Option<AwsCredentials> {
        if let Ok(text) = std::fs::read_to_string(&self.file_path) {
            if let Some(creds) = parse_credentials_file(&text, &self.profile) {
                return Some(creds);
            }
        }
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok()?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok()?;
        Some(AwsCredentials {
            access_key_id,
            secret_access_key,
            session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
        })
    }

    /// Rotate after an auth failure.  At most one login-command invocation.
    pub async fn rotate(&self) -> Result<AuthRefresh, CallError> {
        let before = self
            .current
            .lock()
            .unwrap()
            .as_ref()
            .map(|c| c.access_key_id.clone());

        if let Some(fresh) = self.read_source() {
            if before.as_deref() != Some(fresh.access_key_id.as_str()) {
                debug!("credentials file already rotated externally");
                *self.current.lock().unwrap() = Some(fresh);
                return Ok(AuthRefresh::Rotated { external: true });
            }
        }

        let Some(command) = &self.login_command else {
            return Err(CallError::Transport {
                message: "credentials unchanged and no login command configured".into(),
            });
        };

        debug!(command = %command, "running login command to refresh credentials");
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| CallError::Transport {
                message: format!("login command failed to start: {e}"),
            })?;
        if !output.status.success() {
            warn!(status = ?output.status.code(), "login command failed");
            return Err(CallError::Transport {
                message: format!(
                    "login command exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let fresh = self.read_source().ok_or_else(|| CallError::Transport {
            message: "credentials unreadable after login command".into(),
        })?;
        *self.current.lock().unwrap() = Some(fresh);
        Ok(AuthRefresh::Rotated { external: false })
    }
}

/// Parse the INI-style shared credentials file for one profile.
fn parse_credentials_file(text: &str, profile: &str) -> Option<AwsCredentials> {
    let mut in_profile = false;
    let mut access_key_id = None;
    let mut secret_access_key = None;
    let mut session_token = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            if in_profile {
                break; // left the requested section
            }
            in_profile = section.trim() == profile;
            continue;
        }
        if !in_profile {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "aws_access_key_id" => access_key_id = Some(value),
            "aws_secret_access_key" => secret_access_key = Some(value),
            "aws_session_token" => session_token = Some(value),
            _ => {}
        }
    }

    Some(AwsCredentials {
        access_key_id: access_key_id?,
        secret_access_key: secret_access_key?,
        session_token,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
