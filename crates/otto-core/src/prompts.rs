// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! System prompt assembly.

use std::path::PathBuf;

/// Build the system prompt from the working directories, the available
/// tools, and any user-provided context.
///
/// Rebuilt whenever the working-directory set changes so the model always
/// sees the current workspace.
pub fn system_prompt(
    directories: &[PathBuf],
    tool_names: &[String],
    user_context: Option<&str>,
) -> String {
    let mut prompt = String::from(
        "You are a coding assistant operating in the user's terminal.\n\
         You read, search, and modify files and run shell commands through\n\
         the provided tools. Prefer tools over guessing: read a file before\n\
         editing it, search before claiming something does not exist.\n\
         Keep answers short; the user is in a terminal session.\n",
    );

    prompt.push_str("\n## Workspace\n");
    if let Some((primary, extra)) = directories.split_first() {
        prompt.push_str(&format!(
            "Working directory: {}\nRelative paths in tool calls resolve here.\n",
            primary.display()
        ));
        if !extra.is_empty() {
            prompt.push_str("Additional directories:\n");
            for dir in extra {
                prompt.push_str(&format!("- {}\n", dir.display()));
            }
        }
    }

    if !tool_names.is_empty() {
        prompt.push_str("\n## Tools\n");
        prompt.push_str(&format!("Available tools: {}.\n", tool_names.join(", ")));
        prompt.push_str(
            "Tool calls run in parallel when you issue several in one turn;\n\
             only batch calls that do not depend on each other's results.\n",
        );
    }

    if let Some(context) = user_context {
        if !context.trim().is_empty() {
            prompt.push_str("\n## Context\n");
            prompt.push_str(context.trim());
            prompt.push('\n');
        }
    }

    prompt
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mentions_primary_directory() {
        let p = system_prompt(&[PathBuf::from("/work/app")], &[], None);
        assert!(p.contains("/work/app"));
    }

    #[test]
    fn lists_extra_directories() {
        let p = system_prompt(
            &[PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/c")],
            &[],
            None,
        );
        assert!(p.contains("- /b"));
        assert!(p.contains("- /c"));
    }

    #[test]
    fn lists_tools_when_present() {
        let p = system_prompt(&[PathBuf::from("/w")], &["shell".into(), "read".into()], None);
        assert!(p.contains("shell, read"));
    }

    #[test]
    fn includes_user_context_section() {
        let p = system_prompt(&[PathBuf::from("/w")], &[], Some("Use spaces, not tabs."));
        assert!(p.contains("## Context"));
        assert!(p.contains("Use spaces, not tabs."));
    }

    #[test]
    fn blank_user_context_is_omitted() {
        let p = system_prompt(&[PathBuf::from("/w")], &[], Some("   "));
        assert!(!p.contains("## Context"));
    }
}
