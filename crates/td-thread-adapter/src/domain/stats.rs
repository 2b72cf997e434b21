//! # Flow Statistics
//!
//! Lock-free counters shared by both flows.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the ingest and publish flows.
#[derive(Debug, Default)]
pub struct FlowStats {
    records_applied: AtomicU64,
    echoes_suppressed: AtomicU64,
    changes_published: AtomicU64,
    items_failed: AtomicU64,
    dead_letters_evicted: AtomicU64,
}

/// Point-in-time copy of [`FlowStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Remote records dispatched into the local store.
    pub records_applied: u64,
    /// Self-authored records skipped.
    pub echoes_suppressed: u64,
    /// Local changes appended to the own log.
    pub changes_published: u64,
    /// Records or changes that failed.
    pub items_failed: u64,
    /// Dead letters dropped because the buffer was full.
    pub dead_letters_evicted: u64,
}

impl FlowStats {
    pub(crate) fn record_applied(&self) {
        self.records_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn echo_suppressed(&self) {
        self.echoes_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn change_published(&self) {
        self.changes_published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn item_failed(&self) {
        self.items_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dead_letter_evicted(&self) {
        self.dead_letters_evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_applied: self.records_applied.load(Ordering::Relaxed),
            echoes_suppressed: self.echoes_suppressed.load(Ordering::Relaxed),
            changes_published: self.changes_published.load(Ordering::Relaxed),
            items_failed: self.items_failed.load(Ordering::Relaxed),
            dead_letters_evicted: self.dead_letters_evicted.load(Ordering::Relaxed),
        }
    }
}
