//! # Domain Errors
//!
//! Error types for the thread adapter.

use crate::config::ConfigError;
use crate::ports::outbound::{CodecError, NetworkError, StoreError};
use shared_bus::FlowKind;
use shared_types::ThreadId;
use std::time::Duration;
use thiserror::Error;

/// Thread adapter error types.
///
/// Split into fatal errors (misconfiguration or a missing capability; the
/// affected flow, or `start`, cannot continue) and per-item errors (the item
/// is dead-lettered and the flow moves on). See [`AdapterError::is_fatal`].
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The network layer does not know the bound thread.
    #[error("thread {thread_id} not found")]
    ThreadNotFound {
        /// Bound thread
        thread_id: ThreadId,
    },

    /// The local peer has no log registered in the bound thread.
    #[error("own log not found for thread {thread_id}")]
    OwnLogMissing {
        /// Bound thread
        thread_id: ThreadId,
    },

    /// The local peer cannot decrypt the thread's event bodies.
    #[error("read key not found for thread {thread_id}")]
    ReadKeyUnavailable {
        /// Bound thread
        thread_id: ThreadId,
    },

    /// The thread subscription could not be opened.
    #[error("error getting thread subscription: {0}")]
    SubscriptionFailed(#[source] NetworkError),

    /// The local change queue could not be listened to.
    #[error("error listening to local changes: {0}")]
    ListenerUnavailable(#[source] StoreError),

    /// The configuration was rejected.
    #[error("invalid adapter config: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// The adapter was closed and cannot be started again.
    #[error("adapter is closed")]
    AdapterClosed,

    /// The adapter has not been started.
    #[error("adapter is not started")]
    NotStarted,

    /// A flow task panicked before acknowledging shutdown.
    #[error("{flow} flow panicked")]
    FlowPanicked {
        /// The flow
        flow: FlowKind,
    },

    /// Every block fetch attempt failed.
    #[error("error when getting block from record after {attempts} attempts: {source}")]
    BlockFetch {
        /// Attempts made
        attempts: u32,
        /// Last error
        source: NetworkError,
    },

    /// Every `create_record` attempt failed.
    #[error("error writing record after {attempts} attempts: {source}")]
    Publish {
        /// Attempts made
        attempts: u32,
        /// Last error (network failure or per-attempt timeout)
        source: Box<AdapterError>,
    },

    /// Shutdown fired before the item finished; no further attempt was made.
    #[error("{operation} interrupted by shutdown after {attempts} attempts")]
    Interrupted {
        /// What was being done
        operation: &'static str,
        /// Attempts made
        attempts: u32,
    },

    /// An operation exceeded its bound.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was being done
        operation: &'static str,
        /// The bound that expired
        after: Duration,
    },

    /// The event codec failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The local store failed to decode or apply events.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A transient network failure outside the retried paths.
    #[error("network error: {0}")]
    Network(#[source] NetworkError),
}

impl AdapterError {
    /// Whether the error stops the affected flow (or `start`) rather than
    /// just the current item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ThreadNotFound { .. }
                | Self::OwnLogMissing { .. }
                | Self::ReadKeyUnavailable { .. }
                | Self::SubscriptionFailed(_)
                | Self::ListenerUnavailable(_)
                | Self::InvalidConfig(_)
                | Self::AdapterClosed
                | Self::NotStarted
                | Self::FlowPanicked { .. }
        )
    }

    /// Attempts made on the failed item. Errors outside the retried paths
    /// count as one.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::BlockFetch { attempts, .. }
            | Self::Publish { attempts, .. }
            | Self::Interrupted { attempts, .. } => *attempts,
            _ => 1,
        }
    }
}
