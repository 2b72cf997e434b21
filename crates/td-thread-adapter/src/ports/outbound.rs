//! # Outbound Ports
//!
//! Traits for the collaborators the adapter drives: the thread network, the
//! event codec and the local store.

use async_trait::async_trait;
use shared_types::{
    Block, ChangeNode, Cid, Node, ReadKey, Record, StoreEvent, ThreadCredentials, ThreadId,
    ThreadInfo, ThreadRecord,
};
use std::fmt;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::Stream;

/// Stream of records delivered by a thread subscription.
///
/// Ends when the network side drops the subscription.
pub type RecordStream = Pin<Box<dyn Stream<Item = ThreadRecord> + Send>>;

/// Errors reported by the thread network.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// The thread is unknown to this peer.
    #[error("thread {0} not found")]
    ThreadNotFound(ThreadId),

    /// The block is not available (yet).
    #[error("block {0} not found")]
    BlockNotFound(Cid),

    /// The credentials do not grant the requested access.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Transient transport or storage failure.
    #[error("network unavailable: {0}")]
    Unavailable(String),
}

/// Errors reported by the event codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The block backing a record or body is not available locally.
    #[error("block {0} not available")]
    BlockUnavailable(Cid),

    /// The block did not decode into an event.
    #[error("malformed event: {0}")]
    Malformed(String),

    /// The read key does not open the event body.
    #[error("read key does not open event body")]
    WrongKey,
}

/// Errors reported by the local store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Raw bytes did not decode into store events.
    #[error("cannot decode store events: {0}")]
    Decode(String),

    /// The store refused to apply a batch.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// The change queue cannot be listened to.
    #[error("local change listener unavailable: {0}")]
    ListenerUnavailable(String),
}

/// A thread-level event, decoded from a record or its block.
///
/// The body stays sealed until opened with the thread's read key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadEvent {
    /// Identifier of the event block.
    pub cid: Cid,
    /// Identifier of the sealed body block.
    pub body: Cid,
}

/// Thread network - outbound port.
#[async_trait]
pub trait ThreadNetwork: Send + Sync {
    /// Look up the local peer's view of a thread.
    async fn get_thread(&self, creds: &ThreadCredentials) -> Result<ThreadInfo, NetworkError>;

    /// Open a subscription to every record appended to the thread.
    async fn subscribe(&self, creds: &ThreadCredentials) -> Result<RecordStream, NetworkError>;

    /// Append `node` to the local peer's own log as a new signed record.
    async fn create_record(
        &self,
        creds: &ThreadCredentials,
        node: &ChangeNode,
    ) -> Result<ThreadRecord, NetworkError>;

    /// Fetch the encoded block underlying `record` from the block store.
    async fn fetch_block(&self, record: &Record) -> Result<Block, NetworkError>;
}

/// Event codec - outbound port.
#[async_trait]
pub trait EventCodec: Send + Sync {
    /// Decode a record into an event from locally available blocks.
    async fn event_from_record(&self, record: &Record) -> Result<ThreadEvent, CodecError>;

    /// Decode an event from its already fetched block.
    fn event_from_block(&self, block: &Block) -> Result<ThreadEvent, CodecError>;

    /// Open the event body with the thread's read key.
    async fn event_body(&self, event: &ThreadEvent, key: &ReadKey) -> Result<Node, CodecError>;
}

/// Local store - outbound port.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Listen to changes committed locally and waiting to be published.
    fn local_change_listener(&self) -> Result<LocalChangeListener, StoreError>;

    /// Decode raw body bytes into store events.
    fn decode_events(&self, raw: &[u8]) -> Result<Vec<StoreEvent>, StoreError>;

    /// Apply a batch of remote events atomically.
    async fn dispatch(&self, events: Vec<StoreEvent>) -> Result<(), StoreError>;
}

/// Handle on the local store's outbound change queue.
///
/// Releasing the handle (explicitly via [`discard`](Self::discard) or by
/// dropping it) runs the store's release hook exactly once.
pub struct LocalChangeListener {
    receiver: mpsc::UnboundedReceiver<ChangeNode>,
    on_discard: Option<Box<dyn FnOnce() + Send>>,
}

impl LocalChangeListener {
    /// Wrap a queue receiver with the hook that unregisters it.
    pub fn new(
        receiver: mpsc::UnboundedReceiver<ChangeNode>,
        on_discard: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            on_discard: Some(Box::new(on_discard)),
        }
    }

    /// Next queued change, or `None` once the store closed the queue.
    pub async fn recv(&mut self) -> Option<ChangeNode> {
        self.receiver.recv().await
    }

    /// Release the listener.
    pub fn discard(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(hook) = self.on_discard.take() {
            self.receiver.close();
            hook();
        }
    }
}

impl Drop for LocalChangeListener {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for LocalChangeListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalChangeListener")
            .field("released", &self.on_discard.is_none())
            .finish()
    }
}
