// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(unix)]
use libc;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolResult};
use crate::workspace::Workspace;

/// Hard byte ceiling for command output returned to the model.
const OUTPUT_LIMIT_BYTES: usize = 20_000;

/// Lines kept from the head of oversized output.
const HEAD_LINES: usize = 100;

/// Lines kept from the tail.  Errors and summaries almost always appear at
/// the end of build/test output, so the tail matters at least as much as
/// the head.
const TAIL_LINES: usize = 100;

/// Built-in tool that runs a shell command.
pub struct ShellTool {
    workspace: Arc<Workspace>,
    default_timeout: Duration,
}

impl ShellTool {
    pub fn new(workspace: Arc<Workspace>, default_timeout: Duration) -> Self {
        Self { workspace, default_timeout }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its exit code plus combined stdout/stderr.\n\
         'command' is required; 'timeout' (milliseconds) overrides the default deadline.\n\
         Output is capped at ~20 KB; when larger, the first 100 and last 100 lines are\n\
         preserved with an omission marker in the middle.\n\
         Prefer non-interactive commands; avoid anything that needs a TTY.\n\
         Do NOT use shell for file operations:\n\
         - Read files  -> read  (not cat / head / tail)\n\
         - Search text -> grep  (not grep / rg)\n\
         - Find files  -> glob  (not find)\n\
         - Edit files  -> edit  (not sed / awk)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The complete bash one-liner to execute."
                },
                "timeout": {
                    "type": "integer",
                    "description": "Execution timeout in milliseconds (optional)"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    fn timeout_for(&self, call: &ToolCall) -> Option<Duration> {
        let ms = call
            .args
            .get("timeout")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.default_timeout.as_millis() as u64);
        Some(Duration::from_millis(ms))
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(command) = call.args.get("command").and_then(|v| v.as_str()) else {
            return ToolResult::err(call, "missing 'command' parameter");
        };

        debug!(cmd = %command, "executing shell tool");

        // Brace-group wrapper merges stderr into stdout so the model sees one
        // interleaved transcript, the way a terminal would show it.
        let wrapped = format!("{{ {command}\n}} 2>&1");

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(&wrapped);
        cmd.current_dir(self.workspace.primary());
        // No controlling terminal for the subprocess: stdin from /dev/null and
        // a fresh session via setsid().  A child that opens /dev/tty directly
        // would otherwise be able to corrupt the terminal state.
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return ToolResult::err(call, format!("spawn error: {e}")),
        };

        // After setsid() the child is its own process-group leader, so its
        // pid doubles as the pgid.  The guard kills the whole group if this
        // future is dropped (engine timeout or user interrupt), catching
        // grandchildren that kill_on_drop alone would orphan.
        let mut guard = ProcessGroupGuard::new(child.id());

        let output = match child.wait_with_output().await {
            Ok(o) => o,
            Err(e) => return ToolResult::err(call, format!("wait error: {e}")),
        };
        guard.disarm();

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        let text = head_tail_truncate(&text);
        let exit_code = output.status.code().unwrap_or(-1);

        ToolResult {
            tool_id: call.id.clone(),
            tool_name: call.name.clone(),
            output: json!({ "exit_code": exit_code, "output": text }),
            // Exit code 1 is the Unix convention for "no matches" (grep/rg)
            // and "condition false" (test); flagging it as an error would
            // teach the model that such commands failed.
            is_error: exit_code != 0 && exit_code != 1,
        }
    }
}

/// Kills the subprocess group on drop unless disarmed after a clean wait.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            unsafe {
                libc::killpg(pgid as libc::pid_t, libc::SIGKILL);
            }
        }
    }
}

/// Truncate `s` to fit within `OUTPUT_LIMIT_BYTES`, keeping head and tail
/// lines with an omission marker in the middle.
pub(crate) fn head_tail_truncate(s: &str) -> String {
    if s.len() <= OUTPUT_LIMIT_BYTES {
        return s.to_string();
    }

    let lines: Vec<&str> = s.lines().collect();
    let total = lines.len();

    if total <= HEAD_LINES + TAIL_LINES {
        // Few but very long lines: fall back to byte-level head+tail windows.
        let head_end = (OUTPUT_LIMIT_BYTES / 2).min(s.len());
        let head = &s[..floor_char_boundary(s, head_end)];
        let tail_start = ceil_char_boundary(s, s.len().saturating_sub(OUTPUT_LIMIT_BYTES / 2));
        let tail = &s[tail_start..];
        let omitted = s.len() - head.len() - tail.len();
        return format!("{head}\n...[{omitted} bytes omitted]...\n{tail}");
    }

    let head = lines[..HEAD_LINES].join("\n");
    let tail = lines[total - TAIL_LINES..].join("\n");
    let omitted_lines = total - HEAD_LINES - TAIL_LINES;
    let omitted_bytes = s.len().saturating_sub(head.len() + tail.len());
    format!("{head}\n...[{omitted_lines} lines / ~{omitted_bytes} bytes omitted]...\n{tail}")
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
