// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::Cli;
use otto_channels::{Instruction, InstructionQueue, UiQueue, UiUpdate, UiUpdateKind};
use otto_core::{spawn_worker, ConversationState, Worker};
use otto_model::{CallPipeline, CredentialStore, RetryPolicy};
use otto_tools::{builtin, ToolEngine, ToolRegistry, Workspace};

/// UI frame interval: the terminal loop drains the UI queue this often.
const FRAME: Duration = Duration::from_millis(16);

/// Set by the SIGINT watcher task; the frame loop turns it into a
/// cooperative interrupt.  The watcher itself does nothing else.
static SIGINT_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Spawn a background task that listens for SIGINT from the OS and raises
/// the flag.  The returned runtime must stay alive for the lifetime of the
/// frame loop; dropping it stops the watcher.
fn spawn_sigint_watcher() -> anyhow::Result<tokio::runtime::Runtime> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .context("building signal-watcher runtime")?;
    runtime.spawn(async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(_) => return,
        };
        while sigint.recv().await.is_some() {
            SIGINT_RECEIVED.store(true, Ordering::Release);
        }
    });
    Ok(runtime)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = otto_config::load(cli.config.as_deref())?;
    if let Some(model) = &cli.model {
        config.model.name = model.clone();
    }
    if let Some(provider) = &cli.provider {
        config.model.provider = provider.clone();
    }

    // Fatal-init checks run before the event loop: a broken audit database
    // or absent credentials must abort with a non-zero exit, not fail later
    // mid-conversation.
    let db_path = otto_audit::resolve_db_path(config.audit.db_path.as_deref());
    let audit = Arc::new(
        otto_audit::AuditLog::open(&db_path, config.audit.clone())
            .with_context(|| format!("opening audit database {}", db_path.display()))?,
    );
    if let Err(e) = audit.rotate() {
        tracing::warn!(error = %e, "audit rotation failed");
    }
    check_credentials(&config.model)?;

    let provider = otto_model::from_config(&config.model)?;
    let policy = RetryPolicy::from_config(&config.retry);
    let pipeline = CallPipeline::new(provider, policy).with_audit(Arc::clone(&audit));

    let ui = Arc::new(UiQueue::with_capacity(256));
    let instructions = Arc::new(InstructionQueue::with_capacity(64));
    let running = Arc::new(AtomicBool::new(true));

    let workspace = Arc::new(Workspace::new(
        std::env::current_dir().context("reading current directory")?,
    ));
    let mut registry = ToolRegistry::new();
    builtin::register_all(
        &mut registry,
        Arc::clone(&workspace),
        Arc::clone(&ui),
        config.tools.shell_timeout_ms,
    );
    let registry = Arc::new(registry);

    let state = ConversationState::new(
        config.model.name.clone(),
        workspace,
        registry.names(),
        cli.context.clone(),
    );
    let interrupt = Arc::clone(&state.interrupt);
    let engine = ToolEngine::new(
        Arc::clone(&registry),
        Arc::clone(&ui),
        Arc::clone(&interrupt),
        Duration::from_millis(config.tools.shell_timeout_ms),
    );

    let worker = Worker::new(
        state,
        pipeline,
        engine,
        registry,
        Arc::clone(&ui),
        Arc::clone(&instructions),
        Arc::clone(&running),
        &config,
    );
    let worker_handle = spawn_worker(worker);

    let _signal_runtime = spawn_sigint_watcher()?;

    if let Some(prompt) = &cli.prompt {
        // One-shot mode: queue the prompt, close the queue, drain until the
        // worker finishes.
        instructions
            .enqueue(Instruction::new(prompt.clone()))
            .map_err(|_| anyhow::anyhow!("worker rejected the prompt"))?;
        instructions.shutdown();
        drain_until_worker_exit(&ui, &running, &instructions, &interrupt);
    } else {
        // Interactive mode: a dedicated reader thread feeds stdin lines into
        // the instruction queue (blocking enqueue = backpressure), while this
        // thread renders frames.
        spawn_stdin_reader(Arc::clone(&instructions));
        drain_until_worker_exit(&ui, &running, &instructions, &interrupt);
    }

    worker_handle.join().ok();
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Verify that the configured provider has usable credentials.
fn check_credentials(model: &otto_config::ModelConfig) -> anyhow::Result<()> {
    match model.provider.as_str() {
        "openai" => {
            let key_env = model.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
            if std::env::var(key_env).map(|v| v.is_empty()).unwrap_or(true) {
                anyhow::bail!("no API key: export {key_env} or set api_key_env in config");
            }
        }
        "bedrock" => {
            let store =
                CredentialStore::new(model.aws_profile.clone(), model.login_command.clone());
            store.load().map_err(|e| anyhow::anyhow!("{e}"))?;
        }
        _ => {}
    }
    Ok(())
}

fn spawn_stdin_reader(instructions: Arc<InstructionQueue>) {
    std::thread::Builder::new()
        .name("otto-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                if instructions.enqueue(Instruction::new(line)).is_err() {
                    break;
                }
            }
            // EOF: no more input is coming; let the worker finish and stop.
            instructions.shutdown();
        })
        .expect("spawning stdin reader");
}

/// The UI thread's frame loop: drain and render updates every ~16 ms until
/// the worker is done, forwarding Ctrl-C as a cooperative interrupt.
fn drain_until_worker_exit(
    ui: &UiQueue,
    running: &AtomicBool,
    instructions: &InstructionQueue,
    interrupt: &AtomicBool,
) {
    loop {
        if SIGINT_RECEIVED.swap(false, Ordering::AcqRel) {
            // First Ctrl-C: cancel the in-flight turn and stop accepting
            // input.  The worker observes the flag at its next checkpoint.
            interrupt.store(true, Ordering::Release);
            instructions.shutdown();
            running.store(false, Ordering::Release);
            render(UiUpdate::status("interrupt requested"));
        }

        while let Some(update) = ui.poll() {
            render(update);
        }

        // The worker closes the UI queue when it exits; once it is both shut
        // down and drained there is nothing left to render.
        if ui.is_shut_down() && ui.is_empty() {
            break;
        }
        std::thread::sleep(FRAME);
    }
}

const RED: &str = "\x1b[31m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

fn render(update: UiUpdate) {
    let mut stdout = std::io::stdout().lock();
    match update.kind {
        UiUpdateKind::AddLine => {
            let _ = writeln!(stdout, "{}", update.payload.unwrap_or_default());
        }
        UiUpdateKind::Status => {
            let _ = writeln!(stdout, "{DIM}[Status] {}{RESET}", update.payload.unwrap_or_default());
        }
        UiUpdateKind::Error => {
            let text = update.payload.unwrap_or_default();
            let text = text.strip_prefix("[Error] ").unwrap_or(&text);
            let _ = writeln!(stdout, "{RED}[Error] {text}{RESET}");
        }
        UiUpdateKind::Clear => {
            let _ = write!(stdout, "\x1b[2J\x1b[H");
        }
        UiUpdateKind::TodoUpdate => {
            let _ = writeln!(stdout, "{DIM}[Todos]{RESET}\n{}", update.payload.unwrap_or_default());
        }
    }
    let _ = stdout.flush();
}
