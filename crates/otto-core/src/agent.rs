// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The worker thread: dequeues instructions and drives the model ↔ tool
//! loop for each turn.
//!
//! One turn: append the user message, then loop (call the provider, append
//! the assistant message, execute any tool calls in parallel, append their
//! results) until the model answers without tool calls, the round budget
//! runs out, or the user interrupts.  Every UI-visible artifact travels
//! through the UI queue as an owned string snapshot; the conversation state
//! itself never leaves this thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info};

use otto_channels::{InstructionQueue, UiQueue, UiUpdate};
use otto_model::{CallPipeline, CompletionRequest, Message};
use otto_tools::{ToolCall, ToolEngine, ToolRegistry};

use crate::commands::{handle_command, CommandOutcome};
use crate::session::ConversationState;

pub struct Worker {
    state: ConversationState,
    pipeline: CallPipeline,
    engine: ToolEngine,
    registry: Arc<ToolRegistry>,
    ui: Arc<UiQueue>,
    instructions: Arc<InstructionQueue>,
    running: Arc<AtomicBool>,
    max_tool_rounds: u32,
    max_tokens: u32,
    temperature: f32,
    cache_hints: bool,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: ConversationState,
        pipeline: CallPipeline,
        engine: ToolEngine,
        registry: Arc<ToolRegistry>,
        ui: Arc<UiQueue>,
        instructions: Arc<InstructionQueue>,
        running: Arc<AtomicBool>,
        config: &otto_config::Config,
    ) -> Self {
        Self {
            state,
            pipeline,
            engine,
            registry,
            ui,
            instructions,
            running,
            max_tool_rounds: config.agent.max_tool_rounds,
            max_tokens: config.model.max_tokens.unwrap_or(4096),
            temperature: config.model.temperature.unwrap_or(0.2),
            cache_hints: config.model.cache_prompts,
        }
    }

    /// Blocking worker loop.  Instructions are strictly serialized: the next
    /// one is not dequeued until the previous turn, including all of its
    /// tool calls, completed.
    pub fn run(mut self) {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                error!(error = %e, "failed to build worker runtime");
                self.ui.post(UiUpdate::error(format!("[Error] worker startup failed: {e}")));
                self.ui.shutdown();
                return;
            }
        };

        info!(session_id = %self.state.session_id, "worker started");
        while self.running.load(Ordering::Acquire) {
            let Some(instruction) = self.instructions.dequeue() else {
                debug!("instruction queue shut down, worker exiting");
                break;
            };
            // A stop request may land while we were blocked in dequeue;
            // do not start a turn that the user already cancelled.
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            let text = instruction.text.trim().to_string();
            if text.is_empty() {
                continue;
            }

            if text.starts_with('/') {
                match handle_command(&text, &mut self.state, &self.ui) {
                    CommandOutcome::Exit => {
                        self.running.store(false, Ordering::Release);
                        self.instructions.shutdown();
                        self.ui.shutdown();
                        break;
                    }
                    CommandOutcome::Handled | CommandOutcome::Error => continue,
                }
            }

            // A stale interrupt from a cancelled previous turn must not kill
            // this one.
            self.state.interrupt.store(false, Ordering::Release);
            runtime.block_on(self.run_turn(&text));
        }
        // Closing the UI queue is the worker's exit signal to the front-end;
        // pending updates are still drained there.
        self.ui.shutdown();
        info!("worker stopped");
    }

    async fn run_turn(&mut self, user_input: &str) {
        self.state.append_user(user_input);

        let mut rounds = 0u32;
        loop {
            if self.state.interrupt.load(Ordering::Acquire) {
                self.ui.post(UiUpdate::status("turn cancelled"));
                return;
            }
            rounds += 1;
            if rounds > self.max_tool_rounds {
                self.ui.post(UiUpdate::error(format!(
                    "[Error] tool-call budget exhausted after {} rounds",
                    self.max_tool_rounds
                )));
                return;
            }

            let request = self.build_request();
            let result = self
                .pipeline
                .call(&request, &self.state.session_id, &self.state.interrupt)
                .await;

            let Some(message) = result.message else {
                let reason = result
                    .error_message
                    .unwrap_or_else(|| "provider call failed".into());
                self.ui.post(UiUpdate::error(format!("[Error] {reason}")));
                // Keep the log valid for the next turn: the failure becomes
                // an ordinary assistant message.
                self.state
                    .append_assistant(Message::assistant(format!("(request failed: {reason})")));
                return;
            };

            if let Some(usage) = result.usage {
                self.ui.post(UiUpdate::status(format!(
                    "tokens: {} prompt ({} cached) / {} completion",
                    usage.prompt_tokens, usage.cached_tokens, usage.completion_tokens
                )));
            }

            self.state.append_assistant(message.clone());
            let text = message.text();
            if !text.is_empty() {
                self.ui.post(UiUpdate::line(text));
            }

            let calls: Vec<ToolCall> = message
                .tool_calls()
                .iter()
                .map(|tc| ToolCall {
                    id: tc.id.to_string(),
                    name: tc.name.to_string(),
                    args: tc.params.clone(),
                })
                .collect();
            if calls.is_empty() {
                return;
            }

            debug!(count = calls.len(), round = rounds, "executing tool calls");
            let results = self.engine.run(&calls).await;
            self.state.append_tool_results(results);
            // An interrupt raised during tool execution produced cancel
            // results for every call; the top of the loop ends the turn with
            // the pairing intact.
        }
    }

    fn build_request(&self) -> CompletionRequest {
        let tools = self
            .registry
            .schemas()
            .into_iter()
            .map(|s| otto_model::ToolSchema {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            })
            .collect();
        CompletionRequest {
            model: self.state.model.clone(),
            messages: self.state.messages.clone(),
            tools,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            cache_hints: self.cache_hints,
        }
    }

}

/// Spawn the worker on its own OS thread.
pub fn spawn_worker(worker: Worker) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("otto-worker".into())
        .spawn(move || worker.run())
        .expect("spawning worker thread")
}
