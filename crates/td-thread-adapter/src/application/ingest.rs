//! # Ingest Flow (thread to local store)
//!
//! Consumes the thread subscription one record at a time, in delivery
//! order. Self-authored records are skipped; every other record is decoded
//! (fetching its block if needed), opened with the read key, decoded into
//! store events and dispatched as one batch.

use crate::algorithms::{is_self_echo, BlockFetcher};
use crate::application::context::FlowContext;
use crate::application::identity::thread_lookup_error;
use crate::domain::{AdapterError, DeadLetterPayload};
use shared_bus::{AdapterEvent, FlowExit, FlowKind};
use shared_types::{LogId, Node, ThreadRecord};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio_stream::StreamExt;
use tracing::{debug, error};

pub(crate) struct IngestFlow {
    ctx: Arc<FlowContext>,
    own_log: LogId,
    fetcher: BlockFetcher,
}

impl IngestFlow {
    pub(crate) fn new(ctx: Arc<FlowContext>, own_log: LogId) -> Self {
        let fetcher = BlockFetcher::new(
            ctx.network.clone(),
            ctx.config.block_fetch_attempts,
            ctx.config.block_fetch_backoff(),
        );
        Self {
            ctx,
            own_log,
            fetcher,
        }
    }

    /// Run until shutdown, end of stream or a fatal precondition failure.
    ///
    /// `ready` resolves once the subscription is live, or with the error
    /// that prevented opening it.
    pub(crate) async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
        ready: oneshot::Sender<Result<(), AdapterError>>,
    ) -> FlowExit {
        let thread = self.ctx.thread_id();
        let mut records = match self.ctx.network.subscribe(&self.ctx.creds).await {
            Ok(records) => records,
            Err(err) => {
                let err = AdapterError::SubscriptionFailed(err);
                error!(thread = %thread.fmt_short(), error = %err, "thread-to-db flow could not start");
                let exit = FlowExit::Fatal(err.to_string());
                let _ = ready.send(Err(err));
                return exit;
            }
        };
        self.ctx
            .emit(AdapterEvent::FlowReady {
                flow: FlowKind::Ingest,
            })
            .await;
        let _ = ready.send(Ok(()));

        let stop = shutdown.clone();
        let exit = loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    debug!(thread = %thread.fmt_short(), "closing thread-to-db flow");
                    break FlowExit::Shutdown;
                }
                next = records.next() => {
                    let Some(record) = next else {
                        debug!(
                            thread = %thread.fmt_short(),
                            "notification channel closed, not listening to external changes anymore"
                        );
                        break FlowExit::StreamClosed;
                    };
                    if let Err(err) = self.handle(record, &stop).await {
                        error!(thread = %thread.fmt_short(), error = %err, "thread-to-db flow stopped");
                        break FlowExit::Fatal(err.to_string());
                    }
                }
            }
        };

        self.ctx
            .emit(AdapterEvent::FlowTerminated {
                flow: FlowKind::Ingest,
                exit: exit.clone(),
            })
            .await;
        exit
    }

    /// Process one record. Only fatal errors are returned; anything else
    /// is dead-lettered here.
    async fn handle(&self, record: ThreadRecord, shutdown: &watch::Receiver<bool>) -> Result<(), AdapterError> {
        if is_self_echo(&record, self.own_log) {
            self.ctx.stats.echo_suppressed();
            self.ctx
                .emit(AdapterEvent::EchoSuppressed {
                    log_id: record.log_id(),
                })
                .await;
            return Ok(());
        }

        match self.ingest(&record, shutdown).await {
            Ok(events) => {
                self.ctx.stats.record_applied();
                self.ctx
                    .emit(AdapterEvent::RecordApplied {
                        thread_id: record.thread_id(),
                        log_id: record.log_id(),
                        events,
                    })
                    .await;
                Ok(())
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                let attempts = err.attempts();
                self.ctx
                    .dead_letter(FlowKind::Ingest, DeadLetterPayload::Record(record), &err, attempts)
                    .await;
                Ok(())
            }
        }
    }

    async fn ingest(
        &self,
        record: &ThreadRecord,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<usize, AdapterError> {
        let timeout = self.ctx.config.fetch_event_timeout();
        let node = tokio::time::timeout(timeout, self.recover_body(record, shutdown))
            .await
            .map_err(|_| AdapterError::Timeout {
                operation: "fetch event",
                after: timeout,
            })??;

        let events = self.ctx.store.decode_events(node.raw_data())?;
        let count = events.len();
        debug!(
            thread = %record.thread_id().fmt_short(),
            log = %record.log_id().fmt_short(),
            events = count,
            "dispatching to db external new record"
        );
        self.ctx.store.dispatch(events).await?;
        Ok(count)
    }

    async fn recover_body(
        &self,
        record: &ThreadRecord,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<Node, AdapterError> {
        let event = match self.ctx.codec.event_from_record(record.value()).await {
            Ok(event) => event,
            Err(err) => {
                debug!(
                    record = %record.value().cid().fmt_short(),
                    error = %err,
                    "event not decodable from record, fetching block"
                );
                let block = self.fetcher.fetch(record.value(), shutdown).await?;
                self.ctx.codec.event_from_block(&block)?
            }
        };

        let thread_id = self.ctx.thread_id();
        let info = self
            .ctx
            .network
            .get_thread(&self.ctx.creds)
            .await
            .map_err(|e| thread_lookup_error(thread_id, e))?;
        let key = info
            .key
            .read()
            .ok_or(AdapterError::ReadKeyUnavailable { thread_id })?;

        Ok(self.ctx.codec.event_body(&event, key).await?)
    }
}
