// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// A failed provider call.
///
/// HTTP failures carry the response body and any `Retry-After` header value
/// so the retry loop can classify and pace without a side channel back to
/// the transport layer.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// DNS, connect, TLS, timeout, send/recv failures.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http {
        status: u16,
        body: String,
        /// Parsed `Retry-After` header, in seconds, when present.
        retry_after: Option<u64>,
    },

    /// The provider returned 2xx but the body was not parseable.
    #[error("response parse error: {message}")]
    Parse { message: String, raw: String },

    /// The user interrupted the call.
    #[error("cancelled")]
    Cancelled,
}

/// Coarse classification used by the retry loop and for audit rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    RateLimited,
    ServerError,
    AuthError,
    ClientError,
    Parse,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::AuthError => "auth_error",
            Self::ClientError => "client_error",
            Self::Parse => "parse_error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl CallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Http { status, body, .. } => classify_http(*status, body),
        }
    }

    /// Transport and transient server failures retry; auth errors go through
    /// credential rotation instead; everything else surfaces immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transport | ErrorKind::RateLimited | ErrorKind::ServerError
        )
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn classify_http(status: u16, body: &str) -> ErrorKind {
    match status {
        429 => ErrorKind::RateLimited,
        408 | 500 | 502 | 503 | 504 => ErrorKind::ServerError,
        401 | 403 => ErrorKind::AuthError,
        400 if body_is_credential_failure(body) => ErrorKind::AuthError,
        _ if status >= 500 => ErrorKind::ServerError,
        // Some gateways hide throttling behind generic 4xx statuses; the body
        // is the only reliable signal then.
        _ if body_mentions_throttling(body) => ErrorKind::RateLimited,
        _ => ErrorKind::ClientError,
    }
}

/// AWS surfaces expired/rotated credentials as 400s with distinctive bodies.
fn body_is_credential_failure(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    ["expiredtoken", "invalidsignature", "unrecognizedclient", "security token", "invalid api key"]
        .iter()
        .any(|needle| lower.contains(needle))
}

fn body_mentions_throttling(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    ["rate limit", "throttled", "throttling", "quota exceeded"]
        .iter()
        .any(|needle| lower.contains(needle))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
