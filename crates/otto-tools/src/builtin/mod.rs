// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The built-in tool set.

pub mod edit_file;
pub mod glob;
pub mod grep;
pub mod list_dir;
pub mod patch_tool;
pub mod read_file;
pub mod shell;
pub mod todo_write;
pub mod write;

use std::sync::Arc;
use std::time::Duration;

use otto_channels::UiQueue;

use crate::registry::ToolRegistry;
use crate::workspace::Workspace;

/// Register the full built-in tool set.
pub fn register_all(
    registry: &mut ToolRegistry,
    workspace: Arc<Workspace>,
    ui: Arc<UiQueue>,
    shell_timeout_ms: u64,
) {
    registry.register(shell::ShellTool::new(
        Arc::clone(&workspace),
        Duration::from_millis(shell_timeout_ms),
    ));
    registry.register(read_file::ReadTool::new(Arc::clone(&workspace)));
    registry.register(write::WriteTool::new(Arc::clone(&workspace), Arc::clone(&ui)));
    registry.register(edit_file::EditTool::new(Arc::clone(&workspace), Arc::clone(&ui)));
    registry.register(patch_tool::PatchTool::new(Arc::clone(&workspace), Arc::clone(&ui)));
    registry.register(grep::GrepTool::new(Arc::clone(&workspace)));
    registry.register(glob::GlobTool::new(Arc::clone(&workspace)));
    registry.register(list_dir::ListTool::new(Arc::clone(&workspace)));
    registry.register(todo_write::TodoWriteTool::new(ui));
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
