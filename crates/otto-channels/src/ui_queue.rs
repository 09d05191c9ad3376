// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// Kind of a UI update posted by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiUpdateKind {
    /// A line of conversation output (assistant text, tool summary).
    AddLine,
    /// A transient informational status line.
    Status,
    /// Clear the conversation pane.
    Clear,
    /// An error line, rendered highlighted.
    Error,
    /// The todo list was replaced; payload is the rendered list.
    TodoUpdate,
}

/// One update posted from the worker to the UI thread.
///
/// `payload` ownership transfers to whoever dequeues the update.
#[derive(Debug, Clone)]
pub struct UiUpdate {
    pub kind: UiUpdateKind,
    pub payload: Option<String>,
}

impl UiUpdate {
    pub fn line(text: impl Into<String>) -> Self {
        Self { kind: UiUpdateKind::AddLine, payload: Some(text.into()) }
    }

    pub fn status(text: impl Into<String>) -> Self {
        Self { kind: UiUpdateKind::Status, payload: Some(text.into()) }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { kind: UiUpdateKind::Error, payload: Some(text.into()) }
    }

    pub fn clear() -> Self {
        Self { kind: UiUpdateKind::Clear, payload: None }
    }

    pub fn todo_update(rendered: impl Into<String>) -> Self {
        Self { kind: UiUpdateKind::TodoUpdate, payload: Some(rendered.into()) }
    }
}

struct UiQueueInner {
    items: VecDeque<UiUpdate>,
    shutdown: bool,
}

/// Bounded worker→UI queue with drop-oldest overflow.
///
/// Multi-producer/multi-consumer safe.  `post` never blocks: when the queue
/// is at capacity the oldest pending update is evicted to make room, so the
/// dequeued sequence is always a suffix of the posted sequence.
pub struct UiQueue {
    capacity: usize,
    inner: Mutex<UiQueueInner>,
    available: Condvar,
}

impl UiQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "UiQueue capacity must be non-zero");
        Self {
            capacity,
            inner: Mutex::new(UiQueueInner { items: VecDeque::with_capacity(capacity), shutdown: false }),
            available: Condvar::new(),
        }
    }

    /// Post an update.  Non-blocking; evicts the oldest entry when full.
    /// Posting after shutdown is a no-op.
    pub fn post(&self, update: UiUpdate) {
        let mut inner = self.inner.lock().unwrap();
        if inner.shutdown {
            return;
        }
        if inner.items.len() == self.capacity {
            inner.items.pop_front();
        }
        inner.items.push_back(update);
        drop(inner);
        self.available.notify_one();
    }

    /// Take the next update without blocking.
    pub fn poll(&self) -> Option<UiUpdate> {
        self.inner.lock().unwrap().items.pop_front()
    }

    /// Block until an update arrives or the queue is shut down.
    ///
    /// Pending updates are drained even after shutdown; `None` means the
    /// queue is both shut down and empty.
    pub fn wait(&self) -> Option<UiUpdate> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(update) = inner.items.pop_front() {
                return Some(update);
            }
            if inner.shutdown {
                return None;
            }
            inner = self.available.wait(inner).unwrap();
        }
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wake all waiters; subsequent `wait` calls return `None` once drained.
    pub fn shutdown(&self) {
        self.inner.lock().unwrap().shutdown = true;
        self.available.notify_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.lock().unwrap().shutdown
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
