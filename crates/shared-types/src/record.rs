//! # Records, Blocks and Nodes
//!
//! Units that travel on the distributed log.

use crate::ids::{Cid, LogId, ThreadId};
use serde::{Deserialize, Serialize};

/// A content-addressed blob of bytes.
///
/// Used both for the local store's pending change nodes and for decrypted
/// event bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    cid: Cid,
    data: Vec<u8>,
}

impl Node {
    /// Wrap `data`, computing its content identifier.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            cid: Cid::digest(&data),
            data,
        }
    }

    /// Content identifier of the raw bytes.
    #[must_use]
    pub fn cid(&self) -> Cid {
        self.cid
    }

    /// Raw bytes.
    #[must_use]
    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }
}

/// The encoded payload underlying a record.
pub type Block = Node;

/// A change produced by the local store and waiting to be published.
pub type ChangeNode = Node;

/// One entry of a peer's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Identifier of the record itself.
    pub cid: Cid,
    /// Identifier of the event block this record points at.
    pub block_id: Cid,
    /// Previous record in the same log, if any.
    pub prev: Option<Cid>,
}

impl Record {
    /// Content identifier of this record.
    #[must_use]
    pub fn cid(&self) -> Cid {
        self.cid
    }

    /// Identifier of the underlying event block.
    #[must_use]
    pub fn block_id(&self) -> Cid {
        self.block_id
    }
}

/// A record as delivered by a thread subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRecord {
    thread_id: ThreadId,
    log_id: LogId,
    record: Record,
}

impl ThreadRecord {
    /// Bind `record` to the log and thread it was appended to.
    #[must_use]
    pub fn new(thread_id: ThreadId, log_id: LogId, record: Record) -> Self {
        Self {
            thread_id,
            log_id,
            record,
        }
    }

    /// Originating log.
    #[must_use]
    pub fn log_id(&self) -> LogId {
        self.log_id
    }

    /// Thread the record belongs to.
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// The record itself.
    #[must_use]
    pub fn value(&self) -> &Record {
        &self.record
    }
}
