// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "otto",
    version,
    about = "An interactive terminal AI coding assistant",
    long_about = "otto mediates between you and a remote model: it sends your\n\
                  prompts, executes the tool calls the model requests (shell,\n\
                  file I/O, search, edits), and streams results back into the\n\
                  conversation."
)]
pub struct Cli {
    /// Run a single prompt headlessly and exit.
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Model override (e.g. "gpt-4o" or a Bedrock model id).
    #[arg(short, long)]
    pub model: Option<String>,

    /// Provider override: openai | bedrock.
    #[arg(long)]
    pub provider: Option<String>,

    /// Explicit config file, merged over the discovered layers.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Extra context appended to the system prompt.
    #[arg(long)]
    pub context: Option<String>,

    /// Verbose logging to stderr (or set RUST_LOG).
    #[arg(short, long)]
    pub verbose: bool,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
