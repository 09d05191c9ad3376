// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::tool::{Tool, ToolCall, ToolResult};
use crate::workspace::Workspace;

const DEFAULT_MAX_RESULTS: usize = 200;

/// Built-in tool for recursive file search using glob patterns.
pub struct GlobTool {
    workspace: Arc<Workspace>,
}

impl GlobTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern. Patterns without '/' match file\n\
         names anywhere in the tree; patterns with '/' match the relative\n\
         path, where '*' stays within a segment and '**' crosses segments.\n\
         Excludes .git/ and target/ automatically.\n\
         Examples: *.rs | src/**/*.rs | Cargo.toml\n\
         For content search use grep; for directory structure use list."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Glob pattern, e.g. '*.rs'" },
                "root": { "type": "string", "description": "Directory to search from (optional)" },
                "max_results": { "type": "integer", "description": "Maximum results (default 200)" }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(pattern) = call.args.get("pattern").and_then(|v| v.as_str()) else {
            return ToolResult::err(call, "missing 'pattern' parameter");
        };
        let max = call
            .args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_RESULTS as u64) as usize;
        let root = match call.args.get("root").and_then(|v| v.as_str()) {
            Some(r) => self.workspace.resolve(r),
            None => self.workspace.primary(),
        };

        let mut files: Vec<String> = Vec::new();
        let mut truncated = false;

        for entry in WalkDir::new(&root)
            .into_iter()
            .filter_entry(|e| !is_excluded(e.path()))
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .to_string();
            if glob_match(pattern, &rel) {
                if files.len() == max {
                    truncated = true;
                    break;
                }
                files.push(rel);
            }
        }
        files.sort();

        ToolResult::ok(call, json!({ "files": files, "truncated": truncated }))
    }
}

fn is_excluded(path: &std::path::Path) -> bool {
    matches!(
        path.file_name().and_then(|n| n.to_str()),
        Some(".git") | Some("target")
    )
}

/// Match a relative path against a glob pattern.
///
/// A pattern without `/` matches the file name anywhere in the tree
/// (`find -name` semantics).  With `/`, segments are matched in order:
/// `*` and `?` stay within one segment, a lone `**` segment matches any
/// number of segments (including zero).
pub(crate) fn glob_match(pattern: &str, path: &str) -> bool {
    if !pattern.contains('/') {
        let name = path.rsplit('/').next().unwrap_or(path);
        return segment_match(pattern, name);
    }
    let pat_segments: Vec<&str> = pattern.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();
    segments_match(&pat_segments, &path_segments)
}

fn segments_match(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", rest)) => {
            // `**` may swallow zero or more leading path segments.
            (0..=path.len()).any(|skip| segments_match(rest, &path[skip..]))
        }
        Some((first, rest)) => match path.split_first() {
            Some((seg, path_rest)) => segment_match(first, seg) && segments_match(rest, path_rest),
            None => false,
        },
    }
}

/// `*`/`?` wildcard match within a single path segment.
fn segment_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    wildcard(&p, &t)
}

fn wildcard(p: &[char], t: &[char]) -> bool {
    match (p.first(), t.first()) {
        (None, None) => true,
        (Some('*'), _) => {
            wildcard(&p[1..], t) || (!t.is_empty() && wildcard(p, &t[1..]))
        }
        (Some('?'), Some(_)) => wildcard(&p[1..], &t[1..]),
        (Some(pc), Some(tc)) if pc == tc => wildcard(&p[1..], &t[1..]),
        _ => false,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    // ── Pattern matcher ───────────────────────────────────────────────────────

    #[test]
    fn bare_pattern_matches_basename_anywhere() {
        assert!(glob_match("*.rs", "src/deep/main.rs"));
        assert!(glob_match("Cargo.toml", "Cargo.toml"));
        assert!(!glob_match("*.rs", "src/main.c"));
    }

    #[test]
    fn star_does_not_cross_segments() {
        assert!(glob_match("src/*.rs", "src/main.rs"));
        assert!(!glob_match("src/*.rs", "src/sub/main.rs"));
    }

    #[test]
    fn double_star_crosses_segments() {
        assert!(glob_match("src/**/*.rs", "src/a/b/c.rs"));
        assert!(glob_match("**/*.rs", "main.rs"));
        assert!(!glob_match("src/**/*.rs", "tests/a.rs"));
    }

    #[test]
    fn question_mark_matches_single_char() {
        assert!(glob_match("v?.txt", "v1.txt"));
        assert!(!glob_match("v?.txt", "v12.txt"));
    }

    // ── Tool behavior ─────────────────────────────────────────────────────────

    fn setup() -> (GlobTool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/sub")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/sub/lib.rs"), "").unwrap();
        std::fs::write(dir.path().join("README.md"), "").unwrap();
        std::fs::create_dir(dir.path().join("target")).unwrap();
        std::fs::write(dir.path().join("target/skip.rs"), "").unwrap();
        let tool = GlobTool::new(Arc::new(Workspace::new(dir.path())));
        (tool, dir)
    }

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall { id: "gl1".into(), name: "glob".into(), args }
    }

    #[tokio::test]
    async fn finds_files_by_extension() {
        let (tool, _dir) = setup();
        let out = tool.execute(&call(json!({"pattern": "*.rs"}))).await;
        let files = out.output["files"].as_array().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0], "src/main.rs");
        assert_eq!(files[1], "src/sub/lib.rs");
    }

    #[tokio::test]
    async fn target_directory_is_excluded() {
        let (tool, _dir) = setup();
        let out = tool.execute(&call(json!({"pattern": "skip.rs"}))).await;
        assert!(out.output["files"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn path_pattern_restricts_to_subtree() {
        let (tool, _dir) = setup();
        let out = tool.execute(&call(json!({"pattern": "src/*.rs"}))).await;
        let files = out.output["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0], "src/main.rs");
    }

    #[tokio::test]
    async fn max_results_truncates() {
        let (tool, _dir) = setup();
        let out = tool
            .execute(&call(json!({"pattern": "*.rs", "max_results": 1})))
            .await;
        assert_eq!(out.output["files"].as_array().unwrap().len(), 1);
        assert_eq!(out.output["truncated"], true);
    }

    #[tokio::test]
    async fn missing_pattern_is_an_error() {
        let (tool, _dir) = setup();
        assert!(tool.execute(&call(json!({}))).await.is_error);
    }
}
