// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use otto_channels::{UiQueue, UiUpdate};

use crate::session::ConversationState;

/// Outcome of a slash-command invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command ran (possibly posting output).
    Handled,
    /// The command failed; an `[Error]` line was posted.
    Error,
    /// The user asked to leave; the caller should stop the worker.
    Exit,
}

const HELP: &str = "\
Commands:
  /help              show this help
  /clear             reset the conversation (keeps the system prompt)
  /add-dir <path>    add a working directory
  /exit, /quit       leave";

/// Dispatch one slash command.
pub fn handle_command(
    input: &str,
    state: &mut ConversationState,
    ui: &UiQueue,
) -> CommandOutcome {
    let mut parts = input.trim().splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let argument = parts.next().map(str::trim).unwrap_or_default();

    match command {
        "/exit" | "/quit" => CommandOutcome::Exit,
        "/help" => {
            ui.post(UiUpdate::line(HELP));
            CommandOutcome::Handled
        }
        "/clear" => {
            state.clear();
            ui.post(UiUpdate::clear());
            ui.post(UiUpdate::status("conversation cleared"));
            CommandOutcome::Handled
        }
        "/add-dir" => {
            if argument.is_empty() {
                ui.post(UiUpdate::error("[Error] usage: /add-dir <path>"));
                return CommandOutcome::Error;
            }
            let path = std::path::PathBuf::from(argument);
            if !path.is_dir() {
                ui.post(UiUpdate::error(format!("[Error] not a directory: {argument}")));
                return CommandOutcome::Error;
            }
            if state.add_directory(path) {
                ui.post(UiUpdate::status(format!("added directory {argument}")));
            } else {
                ui.post(UiUpdate::status(format!("{argument} is already in the working set")));
            }
            CommandOutcome::Handled
        }
        "/voice" => {
            ui.post(UiUpdate::error("[Error] voice input is not available in this build"));
            CommandOutcome::Error
        }
        other => {
            ui.post(UiUpdate::error(format!("[Error] unknown command: {other}")));
            CommandOutcome::Error
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
