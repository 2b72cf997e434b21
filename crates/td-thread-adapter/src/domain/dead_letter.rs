//! # Dead Letters
//!
//! Items a flow gave up on, buffered for the owner to inspect or resubmit.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use shared_bus::FlowKind;
use shared_types::{ChangeNode, ThreadId, ThreadRecord};
use std::collections::VecDeque;
use uuid::Uuid;

/// What failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadLetterPayload {
    /// A remote record that could not be ingested.
    Record(ThreadRecord),
    /// A local change that could not be published.
    Change(ChangeNode),
}

/// A failed item with its last error.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// Correlation id, also carried by `AdapterEvent::ItemFailed`.
    pub id: Uuid,
    /// Flow that gave up.
    pub flow: FlowKind,
    /// Bound thread.
    pub thread_id: ThreadId,
    /// The item.
    pub payload: DeadLetterPayload,
    /// Rendered last error.
    pub error: String,
    /// Attempts made before giving up.
    pub attempts: u32,
    /// When the item was given up on.
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    /// New dead letter stamped now.
    pub fn new(
        flow: FlowKind,
        thread_id: ThreadId,
        payload: DeadLetterPayload,
        error: String,
        attempts: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            flow,
            thread_id,
            payload,
            error,
            attempts,
            failed_at: Utc::now(),
        }
    }
}

/// Bounded FIFO of dead letters; the oldest entry is evicted when full.
#[derive(Debug)]
pub struct DeadLetterQueue {
    entries: Mutex<VecDeque<DeadLetter>>,
    capacity: usize,
}

impl DeadLetterQueue {
    /// Empty queue holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Buffer `letter`, returning the evicted entry if the queue was full.
    pub fn push(&self, letter: DeadLetter) -> Option<DeadLetter> {
        let mut entries = self.entries.lock();
        let evicted = if entries.len() >= self.capacity {
            entries.pop_front()
        } else {
            None
        };
        entries.push_back(letter);
        evicted
    }

    /// Remove and return every entry, oldest first.
    pub fn drain(&self) -> Vec<DeadLetter> {
        self.entries.lock().drain(..).collect()
    }

    /// Remove and return entries from `flow`, oldest first, keeping the rest.
    pub fn drain_flow(&self, flow: FlowKind) -> Vec<DeadLetter> {
        let mut entries = self.entries.lock();
        let (taken, kept): (Vec<_>, Vec<_>) = entries.drain(..).partition(|l| l.flow == flow);
        entries.extend(kept);
        taken
    }

    /// Number of buffered entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
