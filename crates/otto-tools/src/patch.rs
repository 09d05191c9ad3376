// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The structured multi-file patch format.
//!
//! ```text
//! *** Begin Patch
//! *** Update File: <path>
//! @@
//! -old line 1
//! -old line 2
//! +new line 1
//! @@
//! *** End Patch
//! ```
//!
//! Each operation's `old` content is the newline-join of its `-` lines and
//! must appear in the target file as an **exact substring**; there is no
//! fuzzy or context matching.  The first occurrence is replaced by the join of the
//! `+` lines.  Operations apply in order; a mid-patch failure stops there
//! (files already written stay written) and reports the failing path along
//! with how many operations landed.

use std::io::Write;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOperation {
    pub path: String,
    pub old_content: String,
    pub new_content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub operations: Vec<PatchOperation>,
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("invalid patch: {0}")]
    Invalid(String),
    #[error("patch failed for {path}: {message} ({applied} operation(s) applied)")]
    Apply {
        path: String,
        message: String,
        applied: usize,
    },
}

const BEGIN: &str = "*** Begin Patch";
const END: &str = "*** End Patch";
const UPDATE: &str = "*** Update File: ";

/// Parse and validate a patch body.
pub fn parse(input: &str) -> Result<Patch, PatchError> {
    let mut lines = input.lines();
    if !lines.any(|l| l.trim() == BEGIN) {
        return Err(PatchError::Invalid("'*** Begin Patch' not found".into()));
    }

    let mut operations = Vec::new();
    let mut current: Option<(String, Vec<String>, Vec<String>)> = None;
    let mut saw_end = false;

    for line in lines {
        let trimmed = line.trim_end();
        if trimmed.trim() == END {
            saw_end = true;
            break;
        }
        if let Some(path) = trimmed.strip_prefix(UPDATE) {
            if let Some(op) = current.take() {
                operations.push(finish_operation(op)?);
            }
            current = Some((path.trim().to_string(), Vec::new(), Vec::new()));
            continue;
        }
        let Some((_, old, new)) = current.as_mut() else {
            continue; // preamble noise before the first operation
        };
        if trimmed == "@@" || trimmed.starts_with("@@ ") {
            continue; // hunk boundary, carries no content
        }
        if let Some(removed) = trimmed.strip_prefix('-') {
            old.push(removed.to_string());
        } else if let Some(added) = trimmed.strip_prefix('+') {
            new.push(added.to_string());
        }
        // Anything else is ignored context.
    }

    if !saw_end {
        return Err(PatchError::Invalid("'*** End Patch' not found".into()));
    }
    if let Some(op) = current.take() {
        operations.push(finish_operation(op)?);
    }
    if operations.is_empty() {
        return Err(PatchError::Invalid(
            "patch contains no '*** Update File:' operation".into(),
        ));
    }
    Ok(Patch { operations })
}

fn finish_operation(
    (path, old, new): (String, Vec<String>, Vec<String>),
) -> Result<PatchOperation, PatchError> {
    if old.is_empty() {
        return Err(PatchError::Invalid(format!(
            "operation for '{path}' has no '-' lines to match"
        )));
    }
    Ok(PatchOperation {
        path,
        old_content: old.join("\n"),
        new_content: new.join("\n"),
    })
}

/// Apply a parsed patch.  Returns the number of operations applied.
///
/// Each file write is atomic (temp file + rename in the target directory);
/// there is no cross-file rollback.
pub fn apply(patch: &Patch, root: &Path) -> Result<usize, PatchError> {
    let mut applied = 0usize;
    for op in &patch.operations {
        let target = resolve(root, &op.path);
        let content = std::fs::read_to_string(&target).map_err(|e| PatchError::Apply {
            path: op.path.clone(),
            message: format!("cannot read file: {e}"),
            applied,
        })?;
        let Some(pos) = content.find(&op.old_content) else {
            return Err(PatchError::Apply {
                path: op.path.clone(),
                message: "old content not found in file".into(),
                applied,
            });
        };
        let mut updated = String::with_capacity(content.len());
        updated.push_str(&content[..pos]);
        updated.push_str(&op.new_content);
        updated.push_str(&content[pos + op.old_content.len()..]);

        write_atomic(&target, &updated).map_err(|e| PatchError::Apply {
            path: op.path.clone(),
            message: format!("cannot write file: {e}"),
            applied,
        })?;
        applied += 1;
    }
    Ok(applied)
}

fn resolve(root: &Path, path: &str) -> std::path::PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

/// Replace `target` via a temp file in the same directory so a crash never
/// leaves a half-written file.  Shared with the write/edit tools.
pub(crate) fn write_atomic(target: &Path, content: &str) -> std::io::Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
