//! # Inbound Ports
//!
//! API trait defining what the owner of a thread adapter can do with it.

use crate::domain::{AdapterError, AdapterState, DeadLetter, StatsSnapshot};
use async_trait::async_trait;
use shared_bus::{EventFilter, Subscription};
use shared_types::{LogId, ThreadId};

/// Thread adapter API - inbound port.
#[async_trait]
pub trait ThreadAdapterApi: Send + Sync {
    /// Resolve the own log and launch both flows.
    ///
    /// Returns once the thread subscription and the local change listener
    /// are both established. A no-op when already started.
    async fn start(&self) -> Result<(), AdapterError>;

    /// Stop both flows and wait for them to exit.
    ///
    /// A no-op when already closed. `Closed` is terminal. No record is
    /// created or dispatched after this returns.
    async fn close(&self) -> Result<(), AdapterError>;

    /// Current lifecycle state.
    fn state(&self) -> AdapterState;

    /// The bound thread.
    fn thread_id(&self) -> ThreadId;

    /// This peer's log within the thread, once resolved by `start`.
    fn own_log(&self) -> Option<LogId>;

    /// Subscribe to status events.
    fn subscribe_events(&self, filter: EventFilter) -> Subscription;

    /// Counters for both flows.
    fn stats(&self) -> StatsSnapshot;

    /// Drain the dead-letter buffer.
    fn take_dead_letters(&self) -> Vec<DeadLetter>;

    /// Re-append dead-lettered local changes, in their original order.
    ///
    /// Returns how many were published; changes that fail again go back to
    /// the dead-letter buffer.
    async fn republish_dead_letters(&self) -> Result<usize, AdapterError>;
}
