//! # Self-Echo Filter
//!
//! Records from the own log were dispatched locally when they were
//! committed; applying them again from the subscription would double-apply.

use shared_types::{LogId, ThreadRecord};

/// Whether `record` was authored by this peer.
pub fn is_self_echo(record: &ThreadRecord, own_log: LogId) -> bool {
    record.log_id() == own_log
}
