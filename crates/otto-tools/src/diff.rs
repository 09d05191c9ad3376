// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Compact colorized diff summaries for file-writing tools.
//!
//! Posted through the UI queue after `write`/`edit`/`patch` so the user sees
//! what changed without opening the file.  Output is capped; the full
//! content lives on disk, not in the conversation pane.

use similar::{ChangeTag, TextDiff};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Maximum changed lines rendered before eliding the rest.
const MAX_RENDERED_LINES: usize = 40;

/// Render a short `+`/`-` summary of `old` → `new` for `path`.
pub fn diff_summary(path: &str, old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut added = 0usize;
    let mut removed = 0usize;
    let mut rendered: Vec<String> = Vec::new();

    for change in diff.iter_all_changes() {
        let (sign, color) = match change.tag() {
            ChangeTag::Insert => {
                added += 1;
                ('+', GREEN)
            }
            ChangeTag::Delete => {
                removed += 1;
                ('-', RED)
            }
            ChangeTag::Equal => continue,
        };
        if rendered.len() < MAX_RENDERED_LINES {
            let line = change.value().trim_end_matches('\n');
            rendered.push(format!("{color}{sign} {line}{RESET}"));
        }
    }

    let total_changes = added + removed;
    if total_changes > MAX_RENDERED_LINES {
        rendered.push(format!(
            "  … {} more changed line(s)",
            total_changes - MAX_RENDERED_LINES
        ));
    }

    let mut out = format!("{path} | +{added} -{removed}");
    if !rendered.is_empty() {
        out.push('\n');
        out.push_str(&rendered.join("\n"));
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
