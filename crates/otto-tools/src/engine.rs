// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Parallel tool execution with cooperative cancellation.
//!
//! Given the tool calls of one assistant turn, the engine spawns one task
//! per call and always returns exactly one result per call, in declaration
//! order.  Cancellation, timeouts, unknown tools, and panicked tasks all
//! synthesize error-shaped results rather than dropping a slot.  This is
//! what keeps the conversation re-encodable after an interrupt: every
//! `tool_call` id has its answer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use otto_channels::{UiQueue, UiUpdate};

use crate::registry::ToolRegistry;
use crate::tool::{ToolCall, ToolResult};

/// How often cancelled-flag checkpoints fire while a tool runs.
const INTERRUPT_POLL: Duration = Duration::from_millis(25);

pub struct ToolEngine {
    registry: Arc<ToolRegistry>,
    ui: Arc<UiQueue>,
    interrupt: Arc<AtomicBool>,
    default_timeout: Duration,
}

impl ToolEngine {
    pub fn new(
        registry: Arc<ToolRegistry>,
        ui: Arc<UiQueue>,
        interrupt: Arc<AtomicBool>,
        default_timeout: Duration,
    ) -> Self {
        Self { registry, ui, interrupt, default_timeout }
    }

    /// Execute all calls of one assistant turn in parallel.
    ///
    /// The returned vector has the same length and order as `calls`.
    pub async fn run(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        if calls.is_empty() {
            return Vec::new();
        }

        // Interrupt observed before anything started: synthesize the whole
        // result set without spawning.
        if self.interrupt.load(Ordering::Acquire) {
            debug!("interrupt already set, cancelling {} call(s)", calls.len());
            let results: Vec<ToolResult> =
                calls.iter().map(ToolResult::cancelled_before_start).collect();
            self.post_status(calls, &results);
            return results;
        }

        let handles: Vec<JoinHandle<ToolResult>> = calls
            .iter()
            .map(|call| {
                let call = call.clone();
                let registry = Arc::clone(&self.registry);
                let interrupt = Arc::clone(&self.interrupt);
                let default_timeout = self.default_timeout;
                tokio::spawn(run_one(call, registry, interrupt, default_timeout))
            })
            .collect();

        // Await in declaration order; completion order does not matter
        // because each handle owns its slot.
        let mut results = Vec::with_capacity(calls.len());
        for (i, handle) in handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(tool = %calls[i].name, error = %e, "tool task failed to complete");
                    ToolResult::err(&calls[i], format!("tool task failed: {e}"))
                }
            };
            results.push(result);
        }

        self.post_status(calls, &results);
        results
    }

    /// One status line per batch: `Tool <name> {completed|failed} (k/N)`.
    fn post_status(&self, calls: &[ToolCall], results: &[ToolResult]) {
        let succeeded = results.iter().filter(|r| !r.is_error).count();
        let total = results.len();
        let name = calls.first().map(|c| c.name.as_str()).unwrap_or("?");
        let word = if succeeded == total { "completed" } else { "failed" };
        let line = if total == 1 {
            format!("Tool {name} {word}")
        } else {
            format!("Tool {name} {word} ({succeeded}/{total})")
        };
        self.ui.post(UiUpdate::status(line));
    }
}

/// Drive a single call: cancellation checkpoint before start, then the tool
/// future raced against the interrupt watcher and the per-tool deadline.
async fn run_one(
    call: ToolCall,
    registry: Arc<ToolRegistry>,
    interrupt: Arc<AtomicBool>,
    default_timeout: Duration,
) -> ToolResult {
    if interrupt.load(Ordering::Acquire) {
        return ToolResult::cancelled_before_start(&call);
    }

    let Some(tool) = registry.get(&call.name) else {
        return ToolResult::err(&call, format!("unknown tool: {}", call.name));
    };
    let deadline = tool.timeout_for(&call).unwrap_or(default_timeout);

    tokio::select! {
        biased;
        _ = wait_for_interrupt(interrupt) => {
            debug!(tool = %call.name, "tool cancelled during execution");
            ToolResult::cancelled_during_execution(&call)
        }
        outcome = tokio::time::timeout(deadline, tool.execute(&call)) => match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(tool = %call.name, timeout_ms = deadline.as_millis() as u64, "tool timed out");
                ToolResult::err(
                    &call,
                    format!(
                        "Tool execution cancelled after timeout ({} ms)",
                        deadline.as_millis()
                    ),
                )
            }
        },
    }
}

/// Resolve once the shared interrupt flag is raised.
async fn wait_for_interrupt(flag: Arc<AtomicBool>) {
    loop {
        if flag.load(Ordering::Acquire) {
            return;
        }
        tokio::time::sleep(INTERRUPT_POLL).await;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
