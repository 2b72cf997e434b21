//! # Publish Flow (local store to thread)
//!
//! Drains the local change queue in FIFO order and appends each change to
//! the own log. A change that cannot be published after the configured
//! retries is dead-lettered so later changes are not held back.

use crate::application::context::FlowContext;
use crate::domain::{AdapterError, DeadLetterPayload};
use shared_bus::{AdapterEvent, FlowExit, FlowKind};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error};

pub(crate) struct PublishFlow {
    ctx: Arc<FlowContext>,
}

impl PublishFlow {
    pub(crate) fn new(ctx: Arc<FlowContext>) -> Self {
        Self { ctx }
    }

    /// Run until shutdown or until the store closes its queue.
    ///
    /// The listener is released on every exit path.
    pub(crate) async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
        ready: oneshot::Sender<Result<(), AdapterError>>,
    ) -> FlowExit {
        let thread = self.ctx.thread_id();
        let mut listener = match self.ctx.store.local_change_listener() {
            Ok(listener) => listener,
            Err(err) => {
                let err = AdapterError::ListenerUnavailable(err);
                error!(thread = %thread.fmt_short(), error = %err, "db-to-thread flow could not start");
                let exit = FlowExit::Fatal(err.to_string());
                let _ = ready.send(Err(err));
                return exit;
            }
        };
        self.ctx
            .emit(AdapterEvent::FlowReady {
                flow: FlowKind::Publish,
            })
            .await;
        let _ = ready.send(Ok(()));

        let stop = shutdown.clone();
        let exit = loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    debug!(thread = %thread.fmt_short(), "closing db-to-thread flow");
                    break FlowExit::Shutdown;
                }
                next = listener.recv() => {
                    let Some(node) = next else {
                        error!(
                            thread = %thread.fmt_short(),
                            "ending sending db local event to own thread since channel was closed"
                        );
                        break FlowExit::QueueClosed;
                    };
                    match self.ctx.publish_change(&node, &stop).await {
                        Ok(record) => {
                            self.ctx.stats.change_published();
                            self.ctx
                                .emit(AdapterEvent::ChangePublished {
                                    thread_id: thread,
                                    record: record.value().cid(),
                                })
                                .await;
                        }
                        Err(err) => {
                            let attempts = err.attempts();
                            self.ctx
                                .dead_letter(FlowKind::Publish, DeadLetterPayload::Change(node), &err, attempts)
                                .await;
                        }
                    }
                }
            }
        };

        listener.discard();
        self.ctx
            .emit(AdapterEvent::FlowTerminated {
                flow: FlowKind::Publish,
                exit: exit.clone(),
            })
            .await;
        exit
    }
}
