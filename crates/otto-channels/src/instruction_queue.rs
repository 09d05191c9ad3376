// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// One user instruction queued for the worker.
///
/// The worker owns the conversation state; the instruction carries only the
/// text the user submitted (a slash command or a prompt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub text: String,
}

impl Instruction {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Error returned by `enqueue` after the queue has been shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

impl std::fmt::Display for QueueClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "instruction queue is shut down")
    }
}

impl std::error::Error for QueueClosed {}

struct InstructionQueueInner {
    items: VecDeque<Instruction>,
    shutdown: bool,
}

/// Bounded UI→worker queue with block-on-full enqueue.
///
/// Instructions are executed strictly in enqueue order; the worker does not
/// dequeue the next one until the previous turn completed.  A full queue
/// blocks the producer, which is the desired backpressure: the front-end can
/// display "busy" instead of silently dropping input.
pub struct InstructionQueue {
    capacity: usize,
    inner: Mutex<InstructionQueueInner>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl InstructionQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "InstructionQueue capacity must be non-zero");
        Self {
            capacity,
            inner: Mutex::new(InstructionQueueInner {
                items: VecDeque::with_capacity(capacity),
                shutdown: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Enqueue an instruction, blocking while the queue is full.
    ///
    /// Returns `Err(QueueClosed)` if the queue was shut down before the
    /// instruction could be accepted.
    pub fn enqueue(&self, instruction: Instruction) -> Result<(), QueueClosed> {
        let mut inner = self.inner.lock().unwrap();
        while inner.items.len() == self.capacity && !inner.shutdown {
            inner = self.not_full.wait(inner).unwrap();
        }
        if inner.shutdown {
            return Err(QueueClosed);
        }
        inner.items.push_back(instruction);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue the next instruction, blocking while the queue is empty.
    ///
    /// After shutdown remaining instructions are still drained in order;
    /// `None` means shut down and empty.
    pub fn dequeue(&self) -> Option<Instruction> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(instruction) = inner.items.pop_front() {
                drop(inner);
                self.not_full.notify_one();
                return Some(instruction);
            }
            if inner.shutdown {
                return None;
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    /// Current number of queued instructions, for UI display.
    pub fn depth(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    /// Wake blocked enqueuers (they fail) and dequeuers (they drain, then
    /// observe shutdown).
    pub fn shutdown(&self) {
        self.inner.lock().unwrap().shutdown = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn enqueue_dequeue_preserves_order() {
        let q = InstructionQueue::with_capacity(8);
        q.enqueue(Instruction::new("first")).unwrap();
        q.enqueue(Instruction::new("second")).unwrap();
        q.enqueue(Instruction::new("third")).unwrap();
        assert_eq!(q.dequeue().unwrap().text, "first");
        assert_eq!(q.dequeue().unwrap().text, "second");
        assert_eq!(q.dequeue().unwrap().text, "third");
    }

    #[test]
    fn enqueue_blocks_when_full_until_dequeue() {
        // Capacity 2: A and B fill the queue; a second thread enqueueing C
        // must block until the main thread dequeues A.
        let q = Arc::new(InstructionQueue::with_capacity(2));
        q.enqueue(Instruction::new("A")).unwrap();
        q.enqueue(Instruction::new("B")).unwrap();
        assert_eq!(q.depth(), 2);

        let q2 = Arc::clone(&q);
        let producer = std::thread::spawn(move || q2.enqueue(Instruction::new("C")));

        // The producer must still be blocked.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(q.depth(), 2);
        assert!(!producer.is_finished());

        assert_eq!(q.dequeue().unwrap().text, "A");
        producer.join().unwrap().unwrap();
        assert_eq!(q.depth(), 2);
        assert_eq!(q.dequeue().unwrap().text, "B");
        assert_eq!(q.dequeue().unwrap().text, "C");
    }

    #[test]
    fn dequeue_blocks_until_enqueue() {
        let q = Arc::new(InstructionQueue::with_capacity(4));
        let q2 = Arc::clone(&q);
        let consumer = std::thread::spawn(move || q2.dequeue());
        std::thread::sleep(Duration::from_millis(20));
        q.enqueue(Instruction::new("go")).unwrap();
        assert_eq!(consumer.join().unwrap().unwrap().text, "go");
    }

    #[test]
    fn shutdown_fails_blocked_enqueue() {
        let q = Arc::new(InstructionQueue::with_capacity(1));
        q.enqueue(Instruction::new("full")).unwrap();
        let q2 = Arc::clone(&q);
        let producer = std::thread::spawn(move || q2.enqueue(Instruction::new("late")));
        std::thread::sleep(Duration::from_millis(20));
        q.shutdown();
        assert_eq!(producer.join().unwrap(), Err(QueueClosed));
    }

    #[test]
    fn shutdown_drains_then_returns_none() {
        let q = InstructionQueue::with_capacity(4);
        q.enqueue(Instruction::new("pending")).unwrap();
        q.shutdown();
        assert_eq!(q.dequeue().unwrap().text, "pending");
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn enqueue_after_shutdown_fails() {
        let q = InstructionQueue::with_capacity(4);
        q.shutdown();
        assert_eq!(q.enqueue(Instruction::new("x")), Err(QueueClosed));
    }

    #[test]
    fn shutdown_wakes_blocked_dequeue() {
        let q = Arc::new(InstructionQueue::with_capacity(4));
        let q2 = Arc::clone(&q);
        let consumer = std::thread::spawn(move || q2.dequeue());
        std::thread::sleep(Duration::from_millis(20));
        q.shutdown();
        assert!(consumer.join().unwrap().is_none());
    }
}
