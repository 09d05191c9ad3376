// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Cross-thread messaging between the terminal front-end and the worker.
//!
//! Two bounded FIFO queues with deliberately different overflow policies:
//!
//! - [`UiQueue`] (worker → UI): UI updates are lossy by nature.  Posting
//!   never blocks; when the queue is full the **oldest** update is evicted
//!   so the worker can never be stalled by a stuck renderer.
//! - [`InstructionQueue`] (UI → worker): user input is never lossy.
//!   Enqueueing **blocks** when the queue is full, which backpressures the
//!   input side naturally.
//!
//! Both queues bridge plain OS threads, so they are built on
//! `std::sync::{Mutex, Condvar}` rather than an async channel: the UI
//! thread must be able to use them without a runtime.

mod instruction_queue;
mod ui_queue;

pub use instruction_queue::{Instruction, InstructionQueue, QueueClosed};
pub use ui_queue::{UiQueue, UiUpdate, UiUpdateKind};
