//! # In-Memory Collaborators
//!
//! A thread service, event codec and local store that live entirely in
//! process. Several peers can share one [`MemoryThreadService`] and replicate
//! through it. Every collaborator records its calls and supports scripted
//! failures.
//!
//! ## Encoding
//!
//! ```text
//! Record ──block_id──▶ event block {"body": <cid>}
//!                                      │
//!                                      ▼
//!                      body block {"key": sha256(read key), "data": [...]}
//! ```
//!
//! Bodies are tagged with a fingerprint of the read key and refuse to open
//! under any other key. This models capability checks, not confidentiality.

use crate::ports::outbound::{
    CodecError, EventCodec, LocalChangeListener, LocalStore, NetworkError, RecordStream,
    StoreError, ThreadEvent, ThreadNetwork,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared_types::{
    Block, ChangeNode, Cid, LogId, LogInfo, Node, ReadKey, Record, StoreEvent, StoreEventKind,
    ThreadCredentials, ThreadId, ThreadInfo, ThreadKey, ThreadRecord,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

// =============================================================================
// Thread service
// =============================================================================

#[derive(Serialize, Deserialize)]
struct EncodedEvent {
    body: Cid,
}

#[derive(Serialize, Deserialize)]
struct SealedBody {
    key: String,
    data: Vec<u8>,
}

fn key_fingerprint(key: &ReadKey) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn encode_json<T: Serialize>(value: &T) -> Result<Vec<u8>, NetworkError> {
    serde_json::to_vec(value).map_err(|e| NetworkError::Unavailable(e.to_string()))
}

struct Member {
    log: LogId,
    can_read: bool,
}

struct ThreadEntry {
    read_key: ReadKey,
    token: Option<String>,
    service_key: [u8; 32],
    heads: BTreeMap<LogId, Option<Cid>>,
    members: HashMap<String, Member>,
    subscribers: Vec<mpsc::UnboundedSender<ThreadRecord>>,
}

#[derive(Default)]
struct ServiceState {
    threads: HashMap<ThreadId, ThreadEntry>,
    blocks: HashMap<Cid, Block>,
}

/// Shared in-memory thread service.
///
/// Cloning yields another handle on the same service.
#[derive(Clone, Default)]
pub struct MemoryThreadService {
    state: Arc<Mutex<ServiceState>>,
}

impl MemoryThreadService {
    /// Empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a thread with a fresh read key.
    pub fn create_thread(&self) -> ThreadId {
        let id = ThreadId::random();
        let entry = ThreadEntry {
            read_key: ReadKey(ThreadId::random().0),
            token: None,
            service_key: ThreadId::random().0,
            heads: BTreeMap::new(),
            members: HashMap::new(),
            subscribers: Vec::new(),
        };
        self.state.lock().threads.insert(id, entry);
        id
    }

    /// Require `token` on every call against `thread`.
    pub fn require_token(&self, thread: ThreadId, token: &str) -> Result<(), NetworkError> {
        self.state
            .lock()
            .threads
            .get_mut(&thread)
            .ok_or(NetworkError::ThreadNotFound(thread))?
            .token = Some(token.to_string());
        Ok(())
    }

    /// Register `peer` in `thread` with read access, returning its own log.
    pub fn add_member(&self, thread: ThreadId, peer: &str) -> Result<LogId, NetworkError> {
        self.add_member_with_access(thread, peer, true)
    }

    /// Register `peer` in `thread`, returning its own log.
    pub fn add_member_with_access(
        &self,
        thread: ThreadId,
        peer: &str,
        can_read: bool,
    ) -> Result<LogId, NetworkError> {
        let mut state = self.state.lock();
        let entry = state
            .threads
            .get_mut(&thread)
            .ok_or(NetworkError::ThreadNotFound(thread))?;
        let log = LogId::random();
        entry.heads.insert(log, None);
        entry.members.insert(peer.to_string(), Member { log, can_read });
        Ok(log)
    }

    /// Handle through which `peer` talks to the service.
    pub fn peer(&self, peer: &str) -> MemoryThreadNetwork {
        MemoryThreadNetwork {
            service: self.clone(),
            peer: peer.to_string(),
            calls: Arc::new(Mutex::new(CallLog::default())),
            fetch_failures: Arc::new(AtomicU32::new(0)),
            create_failures: Arc::new(AtomicU32::new(0)),
            create_delay: Arc::new(Mutex::new(None)),
            fail_subscribe: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The thread's read key.
    pub fn read_key(&self, thread: ThreadId) -> Option<ReadKey> {
        self.state.lock().threads.get(&thread).map(|t| t.read_key.clone())
    }

    /// Encode `body` as an event, append it to `log` and notify subscribers.
    pub fn append_record(
        &self,
        thread: ThreadId,
        log: LogId,
        body: &Node,
    ) -> Result<ThreadRecord, NetworkError> {
        let mut state = self.state.lock();
        let key = state
            .threads
            .get(&thread)
            .ok_or(NetworkError::ThreadNotFound(thread))?
            .read_key
            .clone();

        let sealed = Node::new(encode_json(&SealedBody {
            key: key_fingerprint(&key),
            data: body.raw_data().to_vec(),
        })?);
        let event = Node::new(encode_json(&EncodedEvent { body: sealed.cid() })?);
        let event_cid = event.cid();
        state.blocks.insert(sealed.cid(), sealed);
        state.blocks.insert(event_cid, event);

        Self::append_event(&mut state, thread, log, event_cid)
    }

    /// Append a record whose block does not decode into an event.
    pub fn append_malformed(&self, thread: ThreadId, log: LogId) -> Result<ThreadRecord, NetworkError> {
        let mut state = self.state.lock();
        let garbage = Node::new(format!("not an event {}", LogId::random()).into_bytes());
        let cid = garbage.cid();
        state.blocks.insert(cid, garbage);
        Self::append_event(&mut state, thread, log, cid)
    }

    fn append_event(
        state: &mut ServiceState,
        thread: ThreadId,
        log: LogId,
        block_id: Cid,
    ) -> Result<ThreadRecord, NetworkError> {
        let entry = state
            .threads
            .get_mut(&thread)
            .ok_or(NetworkError::ThreadNotFound(thread))?;
        let head = entry.heads.entry(log).or_insert(None);
        let prev = *head;

        let mut preimage = Vec::with_capacity(96);
        preimage.extend_from_slice(block_id.as_bytes());
        preimage.extend_from_slice(log.as_bytes());
        if let Some(prev) = prev {
            preimage.extend_from_slice(prev.as_bytes());
        }
        let record = Record {
            cid: Cid::digest(&preimage),
            block_id,
            prev,
        };
        *head = Some(record.cid);

        let rec = ThreadRecord::new(thread, log, record);
        entry.subscribers.retain(|tx| tx.send(rec.clone()).is_ok());
        debug!(thread = %thread.fmt_short(), log = %log.fmt_short(), "record appended");
        Ok(rec)
    }

    /// Drop every subscription to `thread`, ending their streams.
    pub fn close_subscriptions(&self, thread: ThreadId) {
        if let Some(entry) = self.state.lock().threads.get_mut(&thread) {
            entry.subscribers.clear();
        }
    }

    /// Remove a block, as if it had not propagated yet.
    pub fn evict_block(&self, cid: Cid) -> Option<Block> {
        self.state.lock().blocks.remove(&cid)
    }

    fn block(&self, cid: &Cid) -> Option<Block> {
        self.state.lock().blocks.get(cid).cloned()
    }
}

/// Calls a [`MemoryThreadNetwork`] received.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    /// `get_thread` calls.
    pub get_thread: u32,
    /// `subscribe` calls.
    pub subscriptions: u32,
    /// `fetch_block` calls.
    pub fetches: u32,
    /// Nodes passed to `create_record`, one entry per attempt.
    pub create_attempts: Vec<ChangeNode>,
    /// Records successfully created.
    pub created: Vec<ThreadRecord>,
}

/// One peer's handle on a [`MemoryThreadService`].
#[derive(Clone)]
pub struct MemoryThreadNetwork {
    service: MemoryThreadService,
    peer: String,
    calls: Arc<Mutex<CallLog>>,
    fetch_failures: Arc<AtomicU32>,
    create_failures: Arc<AtomicU32>,
    create_delay: Arc<Mutex<Option<Duration>>>,
    fail_subscribe: Arc<AtomicBool>,
}

impl MemoryThreadNetwork {
    /// Copy of the calls received so far.
    pub fn calls(&self) -> CallLog {
        self.calls.lock().clone()
    }

    /// Make the next `n` block fetches fail.
    pub fn fail_next_fetches(&self, n: u32) {
        self.fetch_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` record creations fail.
    pub fn fail_next_creates(&self, n: u32) {
        self.create_failures.store(n, Ordering::SeqCst);
    }

    /// Delay every record creation by `delay`.
    pub fn set_create_delay(&self, delay: Option<Duration>) {
        *self.create_delay.lock() = delay;
    }

    /// Make `subscribe` fail.
    pub fn fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    fn authorize(entry: &ThreadEntry, creds: &ThreadCredentials) -> Result<(), NetworkError> {
        match entry.token.as_deref() {
            Some(required) if creds.token() != Some(required) => Err(NetworkError::Unauthorized(format!(
                "bad token for thread {}",
                creds.thread_id()
            ))),
            _ => Ok(()),
        }
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ThreadNetwork for MemoryThreadNetwork {
    async fn get_thread(&self, creds: &ThreadCredentials) -> Result<ThreadInfo, NetworkError> {
        self.calls.lock().get_thread += 1;
        let thread_id = creds.thread_id();
        let state = self.service.state.lock();
        let entry = state
            .threads
            .get(&thread_id)
            .ok_or(NetworkError::ThreadNotFound(thread_id))?;
        Self::authorize(entry, creds)?;
        let member = entry.members.get(&self.peer);

        let logs = entry
            .heads
            .iter()
            .map(|(id, head)| LogInfo {
                id: *id,
                head: *head,
                own: member.is_some_and(|m| m.log == *id),
            })
            .collect();
        let read = member
            .filter(|m| m.can_read)
            .map(|_| entry.read_key.clone());

        Ok(ThreadInfo {
            id: thread_id,
            logs,
            key: ThreadKey {
                service: Some(entry.service_key),
                read,
            },
        })
    }

    async fn subscribe(&self, creds: &ThreadCredentials) -> Result<RecordStream, NetworkError> {
        self.calls.lock().subscriptions += 1;
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(NetworkError::Unavailable("subscription refused".into()));
        }
        let thread_id = creds.thread_id();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.service.state.lock();
        let entry = state
            .threads
            .get_mut(&thread_id)
            .ok_or(NetworkError::ThreadNotFound(thread_id))?;
        Self::authorize(entry, creds)?;
        entry.subscribers.push(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn create_record(
        &self,
        creds: &ThreadCredentials,
        node: &ChangeNode,
    ) -> Result<ThreadRecord, NetworkError> {
        self.calls.lock().create_attempts.push(node.clone());
        let delay = *self.create_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if Self::take_failure(&self.create_failures) {
            return Err(NetworkError::Unavailable("scripted create failure".into()));
        }

        let thread_id = creds.thread_id();
        let own_log = {
            let state = self.service.state.lock();
            let entry = state
                .threads
                .get(&thread_id)
                .ok_or(NetworkError::ThreadNotFound(thread_id))?;
            Self::authorize(entry, creds)?;
            entry
                .members
                .get(&self.peer)
                .map(|m| m.log)
                .ok_or_else(|| NetworkError::Unauthorized(format!("{} has no own log", self.peer)))?
        };
        let rec = self.service.append_record(thread_id, own_log, node)?;
        self.calls.lock().created.push(rec.clone());
        Ok(rec)
    }

    async fn fetch_block(&self, record: &Record) -> Result<Block, NetworkError> {
        self.calls.lock().fetches += 1;
        if Self::take_failure(&self.fetch_failures) {
            return Err(NetworkError::Unavailable("scripted fetch failure".into()));
        }
        self.service
            .block(&record.block_id())
            .ok_or(NetworkError::BlockNotFound(record.block_id()))
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Event codec for blocks produced by [`MemoryThreadService`].
#[derive(Clone)]
pub struct MemoryCodec {
    service: MemoryThreadService,
    direct_decode: Arc<AtomicBool>,
    body_delay: Arc<Mutex<Option<Duration>>>,
}

impl MemoryCodec {
    /// Codec reading blocks from `service`.
    pub fn new(service: MemoryThreadService) -> Self {
        Self {
            service,
            direct_decode: Arc::new(AtomicBool::new(true)),
            body_delay: Arc::new(Mutex::new(None)),
        }
    }

    /// When disabled, decoding straight from a record fails as if its block
    /// had not reached the local block store, forcing a fetch.
    pub fn set_direct_decode(&self, enabled: bool) {
        self.direct_decode.store(enabled, Ordering::SeqCst);
    }

    /// Delay every body recovery by `delay`.
    pub fn set_body_delay(&self, delay: Option<Duration>) {
        *self.body_delay.lock() = delay;
    }
}

#[async_trait]
impl EventCodec for MemoryCodec {
    async fn event_from_record(&self, record: &Record) -> Result<ThreadEvent, CodecError> {
        if !self.direct_decode.load(Ordering::SeqCst) {
            return Err(CodecError::BlockUnavailable(record.block_id()));
        }
        let block = self
            .service
            .block(&record.block_id())
            .ok_or(CodecError::BlockUnavailable(record.block_id()))?;
        self.event_from_block(&block)
    }

    fn event_from_block(&self, block: &Block) -> Result<ThreadEvent, CodecError> {
        let encoded: EncodedEvent = serde_json::from_slice(block.raw_data())
            .map_err(|e| CodecError::Malformed(e.to_string()))?;
        Ok(ThreadEvent {
            cid: block.cid(),
            body: encoded.body,
        })
    }

    async fn event_body(&self, event: &ThreadEvent, key: &ReadKey) -> Result<Node, CodecError> {
        let delay = *self.body_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let block = self
            .service
            .block(&event.body)
            .ok_or(CodecError::BlockUnavailable(event.body))?;
        let sealed: SealedBody = serde_json::from_slice(block.raw_data())
            .map_err(|e| CodecError::Malformed(e.to_string()))?;
        if sealed.key != key_fingerprint(key) {
            return Err(CodecError::WrongKey);
        }
        Ok(Node::new(sealed.data))
    }
}

// =============================================================================
// Local store
// =============================================================================

#[derive(Default)]
struct StoreState {
    instances: BTreeMap<(String, String), Vec<u8>>,
    dispatched: Vec<Vec<StoreEvent>>,
    listeners: Vec<(u64, mpsc::UnboundedSender<ChangeNode>)>,
    next_listener: u64,
    listeners_discarded: usize,
    dispatch_failures: u32,
}

impl StoreState {
    fn check(&self, event: &StoreEvent) -> Result<(), StoreError> {
        let key = (event.collection.clone(), event.instance_id.clone());
        match event.kind {
            StoreEventKind::Create if self.instances.contains_key(&key) => Err(StoreError::Dispatch(
                format!("instance {}/{} already exists", key.0, key.1),
            )),
            StoreEventKind::Save | StoreEventKind::Delete if !self.instances.contains_key(&key) => {
                Err(StoreError::Dispatch(format!("instance {}/{} not found", key.0, key.1)))
            }
            _ => Ok(()),
        }
    }

    fn apply(&mut self, event: &StoreEvent) {
        let key = (event.collection.clone(), event.instance_id.clone());
        match event.kind {
            StoreEventKind::Create | StoreEventKind::Save => {
                self.instances.insert(key, event.payload.clone());
            }
            StoreEventKind::Delete => {
                self.instances.remove(&key);
            }
        }
    }
}

/// In-memory local store with an outbound change queue.
#[derive(Clone, Default)]
pub struct MemoryLocalStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryLocalStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `events` locally and queue them for publication.
    pub fn commit(&self, events: Vec<StoreEvent>) -> Result<ChangeNode, StoreError> {
        let node = Node::new(
            serde_json::to_vec(&events).map_err(|e| StoreError::Decode(e.to_string()))?,
        );
        let mut state = self.state.lock();
        // Validate against a scratch copy so the commit stays all-or-nothing
        // even when events in the batch build on each other.
        let mut scratch = StoreState {
            instances: state.instances.clone(),
            ..Default::default()
        };
        for event in &events {
            scratch.check(event)?;
            scratch.apply(event);
        }
        state.instances = scratch.instances;
        state.listeners.retain(|(_, tx)| tx.send(node.clone()).is_ok());
        Ok(node)
    }

    /// Close the change queue, as if the store shut down.
    pub fn close_queue(&self) {
        self.state.lock().listeners.clear();
    }

    /// Make the next `n` dispatches fail.
    pub fn fail_next_dispatches(&self, n: u32) {
        self.state.lock().dispatch_failures = n;
    }

    /// Batches dispatched so far, in order.
    pub fn dispatched(&self) -> Vec<Vec<StoreEvent>> {
        self.state.lock().dispatched.clone()
    }

    /// Stored payload of an instance.
    pub fn instance(&self, collection: &str, id: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .instances
            .get(&(collection.to_string(), id.to_string()))
            .cloned()
    }

    /// Number of stored instances.
    pub fn instance_count(&self) -> usize {
        self.state.lock().instances.len()
    }

    /// Listeners currently registered.
    pub fn active_listeners(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Listeners released through their discard hook.
    pub fn discarded_listeners(&self) -> usize {
        self.state.lock().listeners_discarded
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    fn local_change_listener(&self) -> Result<LocalChangeListener, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.state.lock();
            let id = state.next_listener;
            state.next_listener += 1;
            state.listeners.push((id, tx));
            id
        };
        let state = self.state.clone();
        Ok(LocalChangeListener::new(rx, move || {
            let mut state = state.lock();
            state.listeners.retain(|(l, _)| *l != id);
            state.listeners_discarded += 1;
        }))
    }

    fn decode_events(&self, raw: &[u8]) -> Result<Vec<StoreEvent>, StoreError> {
        serde_json::from_slice(raw).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn dispatch(&self, events: Vec<StoreEvent>) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.dispatch_failures > 0 {
            state.dispatch_failures -= 1;
            return Err(StoreError::Dispatch("scripted dispatch failure".into()));
        }
        let mut scratch = StoreState {
            instances: state.instances.clone(),
            ..Default::default()
        };
        for event in &events {
            scratch.check(event)?;
            scratch.apply(event);
        }
        state.instances = scratch.instances;
        state.dispatched.push(events);
        Ok(())
    }
}
