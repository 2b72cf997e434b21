//! Read-only context shared by both flows and the lifecycle controller.

use crate::algorithms::{retry_with_backoff, BackoffPolicy, RetryError};
use crate::config::AdapterConfig;
use crate::domain::{AdapterError, DeadLetter, DeadLetterPayload, DeadLetterQueue, FlowStats};
use crate::ports::{EventCodec, LocalStore, ThreadNetwork};
use shared_bus::{AdapterEvent, EventPublisher, FlowKind, InMemoryEventBus};
use shared_types::{ChangeNode, ThreadCredentials, ThreadId, ThreadRecord};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

pub(crate) struct FlowContext {
    pub(crate) creds: ThreadCredentials,
    pub(crate) network: Arc<dyn ThreadNetwork>,
    pub(crate) codec: Arc<dyn EventCodec>,
    pub(crate) store: Arc<dyn LocalStore>,
    pub(crate) config: AdapterConfig,
    pub(crate) bus: InMemoryEventBus,
    pub(crate) stats: FlowStats,
    pub(crate) dead_letters: DeadLetterQueue,
}

impl FlowContext {
    pub(crate) fn thread_id(&self) -> ThreadId {
        self.creds.thread_id()
    }

    pub(crate) async fn emit(&self, event: AdapterEvent) {
        self.bus.publish(event).await;
    }

    /// Append `node` to the own log, retrying with backoff. Each attempt is
    /// bounded by the add-record timeout, and none starts after `shutdown`.
    pub(crate) async fn publish_change(
        &self,
        node: &ChangeNode,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<ThreadRecord, AdapterError> {
        let policy = BackoffPolicy::new(self.config.publish_attempts, self.config.publish_backoff());
        let timeout = self.config.add_record_timeout();
        retry_with_backoff(policy, "create_record", shutdown, |_| async move {
            match tokio::time::timeout(timeout, self.network.create_record(&self.creds, node)).await {
                Ok(Ok(record)) => Ok(record),
                Ok(Err(err)) => Err(AdapterError::Network(err)),
                Err(_) => Err(AdapterError::Timeout {
                    operation: "create_record",
                    after: timeout,
                }),
            }
        })
        .await
        .map_err(|err| match err {
            RetryError::Exhausted { attempts, last } => AdapterError::Publish {
                attempts,
                source: Box::new(last),
            },
            RetryError::Interrupted { attempts } => AdapterError::Interrupted {
                operation: "create_record",
                attempts,
            },
        })
    }

    /// Buffer a failed item and report it.
    pub(crate) async fn dead_letter(
        &self,
        flow: FlowKind,
        payload: DeadLetterPayload,
        error: &AdapterError,
        attempts: u32,
    ) {
        self.stats.item_failed();
        let letter = DeadLetter::new(flow, self.thread_id(), payload, error.to_string(), attempts);
        let id = letter.id;
        warn!(
            thread = %self.thread_id().fmt_short(),
            %flow,
            dead_letter = %id,
            error = %error,
            "item failed, moved to dead-letter buffer"
        );
        if let Some(evicted) = self.dead_letters.push(letter) {
            self.stats.dead_letter_evicted();
            warn!(evicted = %evicted.id, "dead-letter buffer full, dropped oldest entry");
        }
        self.emit(AdapterEvent::ItemFailed {
            flow,
            error: error.to_string(),
            dead_letter: Some(id),
        })
        .await;
    }
}
