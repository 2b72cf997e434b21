//! Cluster and peer fixtures shared by every scenario.

use anyhow::{anyhow, Context};
use shared_bus::Subscription;
use shared_types::{LogId, Node, StoreEvent, ThreadCredentials, ThreadId, ThreadRecord};
use std::sync::Arc;
use std::time::Duration;
use td_telemetry::{init_logging, TelemetryConfig};
use td_thread_adapter::adapters::{
    MemoryCodec, MemoryLocalStore, MemoryThreadNetwork, MemoryThreadService,
};
use td_thread_adapter::{AdapterConfig, AdapterEvent, EventFilter, ThreadAdapter};

/// Upper bound on how long a scenario waits for one event.
pub const EVENT_WAIT: Duration = Duration::from_secs(10);

/// One thread shared by any number of peers.
pub struct Cluster {
    pub service: MemoryThreadService,
    pub thread: ThreadId,
}

/// A peer: its collaborators, its adapter and its own log.
pub struct Peer {
    pub log: LogId,
    pub network: MemoryThreadNetwork,
    pub codec: MemoryCodec,
    pub store: MemoryLocalStore,
    pub adapter: Arc<ThreadAdapter>,
}

impl Cluster {
    pub fn new() -> Self {
        // Only the first test in the binary gets to install the subscriber.
        let _ = init_logging(&TelemetryConfig::for_testing());
        let service = MemoryThreadService::new();
        let thread = service.create_thread();
        Self { service, thread }
    }

    /// Add a reader/writer peer with test timeouts.
    pub fn join(&self, name: &str) -> anyhow::Result<Peer> {
        self.join_with(name, AdapterConfig::for_testing(), true)
    }

    pub fn join_with(&self, name: &str, config: AdapterConfig, can_read: bool) -> anyhow::Result<Peer> {
        let log = self
            .service
            .add_member_with_access(self.thread, name, can_read)
            .context("adding member")?;
        let network = self.service.peer(name);
        let codec = MemoryCodec::new(self.service.clone());
        let store = MemoryLocalStore::new();
        let adapter = ThreadAdapter::new(
            Arc::new(network.clone()),
            Arc::new(codec.clone()),
            Arc::new(store.clone()),
            ThreadCredentials::new(self.thread),
            config,
        )?;
        Ok(Peer {
            log,
            network,
            codec,
            store,
            adapter: Arc::new(adapter),
        })
    }

    /// Append a record to `log` directly, as a peer without an adapter would.
    pub fn append_events(&self, log: LogId, events: &[StoreEvent]) -> anyhow::Result<ThreadRecord> {
        let body = Node::new(serde_json::to_vec(events)?);
        Ok(self.service.append_record(self.thread, log, &body)?)
    }
}

impl Peer {
    pub fn events(&self) -> Subscription {
        self.adapter.subscribe_events(EventFilter::all())
    }
}

/// Wait for the next event matching `pred`, skipping the rest.
pub async fn next_matching(
    sub: &mut Subscription,
    pred: impl Fn(&AdapterEvent) -> bool,
) -> anyhow::Result<AdapterEvent> {
    tokio::time::timeout(EVENT_WAIT, async {
        loop {
            let event = sub.recv().await.ok_or_else(|| anyhow!("event bus closed"))?;
            if pred(&event) {
                return Ok(event);
            }
        }
    })
    .await
    .context("timed out waiting for adapter event")?
}

/// A create event for a note.
pub fn note(id: &str, body: &str) -> StoreEvent {
    StoreEvent::create("notes", id, body.as_bytes().to_vec())
}

/// A save event for a note.
pub fn edit(id: &str, body: &str) -> StoreEvent {
    StoreEvent::save("notes", id, body.as_bytes().to_vec())
}
