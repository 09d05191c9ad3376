// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Append-only SQLite audit trail for provider calls.
//!
//! Every API attempt is recorded with its request, response, status, and
//! timing; token usage lands in a child table keyed by the call row.
//! Detailed diagnostics belong here, never in the conversation pane.

mod encoding;
mod paths;
mod store;

pub use encoding::{body_bytes, printable_body};
pub use paths::resolve_db_path;
pub use store::{ApiCallRecord, AuditLog, TokenUsageRecord};
