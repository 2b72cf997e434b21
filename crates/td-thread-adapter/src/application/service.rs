//! # Thread Adapter Service
//!
//! Lifecycle controller owning the ingest and publish flows.
//!
//! ## Lifecycle
//!
//! ```text
//!  NotStarted ──start()──▶ Started ──close()──▶ Closed
//!      │  ▲                                       ▲
//!      │  └──start() failed (nothing left running) │
//!      └────────────────close()────────────────────┘
//! ```
//!
//! Every transition happens under one async mutex, so concurrent callers
//! serialize: exactly one performs a start or a teardown, the others
//! observe its result once they get the lock.

use crate::application::context::FlowContext;
use crate::application::identity::resolve_own_log;
use crate::application::ingest::IngestFlow;
use crate::application::publish::PublishFlow;
use crate::config::AdapterConfig;
use crate::domain::{
    AdapterError, AdapterState, DeadLetter, DeadLetterPayload, DeadLetterQueue, FlowStats,
    StatsSnapshot,
};
use crate::ports::{EventCodec, LocalStore, ThreadAdapterApi, ThreadNetwork};
use async_trait::async_trait;
use shared_bus::{AdapterEvent, EventFilter, FlowExit, FlowKind, InMemoryEventBus, Subscription};
use shared_types::{LogId, ThreadCredentials, ThreadId};
use std::sync::{Arc, OnceLock};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};

struct RunningFlows {
    shutdown: watch::Sender<bool>,
    ingest: JoinHandle<FlowExit>,
    publish: JoinHandle<FlowExit>,
}

enum Lifecycle {
    NotStarted,
    Started(RunningFlows),
    Closed,
}

/// Bridges one local store with one thread.
///
/// Dropping a started adapter without calling [`close`](Self::close) drops
/// the shutdown sender, which the flows observe as shutdown; they then exit
/// on their own without being awaited.
pub struct ThreadAdapter {
    ctx: Arc<FlowContext>,
    own_log: OnceLock<LogId>,
    lifecycle: Mutex<Lifecycle>,
    state: parking_lot::RwLock<AdapterState>,
}

impl ThreadAdapter {
    /// Create an adapter bound to the thread in `creds`.
    ///
    /// Nothing runs until [`start`](Self::start).
    pub fn new(
        network: Arc<dyn ThreadNetwork>,
        codec: Arc<dyn EventCodec>,
        store: Arc<dyn LocalStore>,
        creds: ThreadCredentials,
        config: AdapterConfig,
    ) -> Result<Self, AdapterError> {
        config.validate()?;
        let ctx = FlowContext {
            bus: InMemoryEventBus::with_capacity(config.event_channel_capacity),
            dead_letters: DeadLetterQueue::new(config.dead_letter_capacity),
            stats: FlowStats::default(),
            creds,
            network,
            codec,
            store,
            config,
        };
        Ok(Self {
            ctx: Arc::new(ctx),
            own_log: OnceLock::new(),
            lifecycle: Mutex::new(Lifecycle::NotStarted),
            state: parking_lot::RwLock::new(AdapterState::NotStarted),
        })
    }

    /// The configuration in use.
    pub fn config(&self) -> &AdapterConfig {
        &self.ctx.config
    }

    /// Resolve the own log and launch both flows, returning once both have
    /// established their subscription or listener.
    ///
    /// A no-op if already started. On failure nothing is left running and
    /// the adapter stays `NotStarted`.
    pub async fn start(&self) -> Result<(), AdapterError> {
        let mut lifecycle = self.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::Started(_) => return Ok(()),
            Lifecycle::Closed => return Err(AdapterError::AdapterClosed),
            Lifecycle::NotStarted => {}
        }

        let thread_id = self.ctx.thread_id();
        let own_log = match resolve_own_log(self.ctx.network.as_ref(), &self.ctx.creds).await {
            Ok(own_log) => own_log,
            Err(err) => {
                warn!(thread = %thread_id.fmt_short(), error = %err, "adapter start failed");
                self.emit_start_failed(&err).await;
                return Err(err);
            }
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (ingest_ready, ingest_ready_rx) = oneshot::channel();
        let (publish_ready, publish_ready_rx) = oneshot::channel();

        let ingest = tokio::spawn(
            IngestFlow::new(self.ctx.clone(), own_log)
                .run(shutdown_rx.clone(), ingest_ready)
                .instrument(info_span!("thread_to_db", thread = %thread_id.fmt_short())),
        );
        let publish = tokio::spawn(
            PublishFlow::new(self.ctx.clone())
                .run(shutdown_rx, publish_ready)
                .instrument(info_span!("db_to_thread", thread = %thread_id.fmt_short())),
        );

        let ingest_ready = ingest_ready_rx.await.unwrap_or(Err(AdapterError::FlowPanicked {
            flow: FlowKind::Ingest,
        }));
        let publish_ready = publish_ready_rx.await.unwrap_or(Err(AdapterError::FlowPanicked {
            flow: FlowKind::Publish,
        }));
        if let Err(err) = ingest_ready.and(publish_ready) {
            warn!(thread = %thread_id.fmt_short(), error = %err, "adapter start failed, tearing down");
            let _ = shutdown.send(true);
            let _ = ingest.await;
            let _ = publish.await;
            self.emit_start_failed(&err).await;
            return Err(err);
        }

        let own_log = *self.own_log.get_or_init(|| own_log);
        *lifecycle = Lifecycle::Started(RunningFlows {
            shutdown,
            ingest,
            publish,
        });
        *self.state.write() = AdapterState::Started;
        info!(thread = %thread_id.fmt_short(), own_log = %own_log.fmt_short(), "thread adapter started");
        self.ctx
            .emit(AdapterEvent::Started { thread_id, own_log })
            .await;
        Ok(())
    }

    /// Fire the shutdown signal and wait for both flows to exit.
    ///
    /// A no-op if already closed. An in-flight network call is not cut
    /// short, so waiting may take up to one per-item timeout; no retry
    /// starts after the signal. [`state`](Self::state) reports `Closed`
    /// once both flows have exited.
    pub async fn close(&self) -> Result<(), AdapterError> {
        let mut lifecycle = self.lifecycle.lock().await;
        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::Closed);

        let flows = match previous {
            Lifecycle::Closed => return Ok(()),
            Lifecycle::NotStarted => None,
            Lifecycle::Started(flows) => Some(flows),
        };

        let thread_id = self.ctx.thread_id();
        let mut result = Ok(());
        if let Some(flows) = flows {
            let _ = flows.shutdown.send(true);
            for (flow, handle) in [
                (FlowKind::Ingest, flows.ingest),
                (FlowKind::Publish, flows.publish),
            ] {
                match handle.await {
                    Ok(exit) => info!(thread = %thread_id.fmt_short(), %flow, ?exit, "flow exited"),
                    Err(join) => {
                        warn!(thread = %thread_id.fmt_short(), %flow, error = %join, "flow task failed");
                        result = Err(AdapterError::FlowPanicked { flow });
                    }
                }
            }
        }

        *self.state.write() = AdapterState::Closed;
        info!(thread = %thread_id.fmt_short(), "thread adapter closed");
        self.ctx.emit(AdapterEvent::Closed { thread_id }).await;
        result
    }

    async fn emit_start_failed(&self, err: &AdapterError) {
        self.ctx
            .emit(AdapterEvent::StartFailed {
                thread_id: self.ctx.thread_id(),
                error: err.to_string(),
            })
            .await;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AdapterState {
        *self.state.read()
    }

    /// The bound thread.
    pub fn thread_id(&self) -> ThreadId {
        self.ctx.thread_id()
    }

    /// This peer's log, once `start` has succeeded.
    pub fn own_log(&self) -> Option<LogId> {
        self.own_log.get().copied()
    }

    /// Subscribe to status events.
    pub fn subscribe_events(&self, filter: EventFilter) -> Subscription {
        self.ctx.bus.subscribe(filter)
    }

    /// Counters for both flows.
    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Drain the dead-letter buffer, oldest first.
    pub fn take_dead_letters(&self) -> Vec<DeadLetter> {
        self.ctx.dead_letters.drain()
    }

    /// Re-append dead-lettered local changes in their original order.
    ///
    /// Holds the lifecycle lock throughout, so `close` cannot complete while
    /// a republish is appending. Changes that fail again return to the
    /// dead-letter buffer.
    pub async fn republish_dead_letters(&self) -> Result<usize, AdapterError> {
        let lifecycle = self.lifecycle.lock().await;
        let shutdown = match &*lifecycle {
            Lifecycle::Started(flows) => flows.shutdown.subscribe(),
            Lifecycle::NotStarted => return Err(AdapterError::NotStarted),
            Lifecycle::Closed => return Err(AdapterError::AdapterClosed),
        };

        let mut published = 0;
        for letter in self.ctx.dead_letters.drain_flow(FlowKind::Publish) {
            let DeadLetterPayload::Change(node) = letter.payload else {
                continue;
            };
            match self.ctx.publish_change(&node, &shutdown).await {
                Ok(record) => {
                    published += 1;
                    self.ctx.stats.change_published();
                    self.ctx
                        .emit(AdapterEvent::ChangePublished {
                            thread_id: self.ctx.thread_id(),
                            record: record.value().cid(),
                        })
                        .await;
                }
                Err(err) => {
                    let attempts = letter.attempts + err.attempts();
                    self.ctx
                        .dead_letter(FlowKind::Publish, DeadLetterPayload::Change(node), &err, attempts)
                        .await;
                }
            }
        }
        info!(thread = %self.ctx.thread_id().fmt_short(), published, "dead letters republished");
        Ok(published)
    }
}

#[async_trait]
impl ThreadAdapterApi for ThreadAdapter {
    async fn start(&self) -> Result<(), AdapterError> {
        ThreadAdapter::start(self).await
    }

    async fn close(&self) -> Result<(), AdapterError> {
        ThreadAdapter::close(self).await
    }

    fn state(&self) -> AdapterState {
        ThreadAdapter::state(self)
    }

    fn thread_id(&self) -> ThreadId {
        ThreadAdapter::thread_id(self)
    }

    fn own_log(&self) -> Option<LogId> {
        ThreadAdapter::own_log(self)
    }

    fn subscribe_events(&self, filter: EventFilter) -> Subscription {
        ThreadAdapter::subscribe_events(self, filter)
    }

    fn stats(&self) -> StatsSnapshot {
        ThreadAdapter::stats(self)
    }

    fn take_dead_letters(&self) -> Vec<DeadLetter> {
        ThreadAdapter::take_dead_letters(self)
    }

    async fn republish_dead_letters(&self) -> Result<usize, AdapterError> {
        ThreadAdapter::republish_dead_letters(self).await
    }
}
