// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Render a raw HTTP body for storage in a TEXT column.
///
/// Valid UTF-8 is stored verbatim.  Anything else (compressed or binary
/// error pages from intermediaries) is stored as a `base64:` prefixed
/// encoding so the row round-trips losslessly.
pub fn printable_body(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => format!("base64:{}", STANDARD.encode(bytes)),
    }
}

/// Recover the original bytes from a value produced by [`printable_body`].
pub fn body_bytes(stored: &str) -> Vec<u8> {
    match stored.strip_prefix("base64:") {
        Some(b64) => STANDARD.decode(b64).unwrap_or_default(),
        None => stored.as_bytes().to_vec(),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
