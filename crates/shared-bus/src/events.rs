//! # Adapter Events
//!
//! Every status event a thread adapter can emit.

use serde::{Deserialize, Serialize};
use shared_types::{Cid, LogId, ThreadId};
use std::fmt;
use uuid::Uuid;

/// Which of the two adapter flows an event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowKind {
    /// Distributed log to local store.
    Ingest,
    /// Local store to distributed log.
    Publish,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingest => write!(f, "thread-to-db"),
            Self::Publish => write!(f, "db-to-thread"),
        }
    }
}

/// Why a flow stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowExit {
    /// The shared shutdown signal fired.
    Shutdown,
    /// The thread subscription ended while the adapter was running.
    StreamClosed,
    /// The local change queue closed while the adapter was running.
    QueueClosed,
    /// A precondition failed at the point of use.
    Fatal(String),
}

/// Status events emitted by a thread adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AdapterEvent {
    /// Own log resolved and both flows launched.
    Started {
        /// Bound thread.
        thread_id: ThreadId,
        /// This peer's log within the thread.
        own_log: LogId,
    },

    /// `start` failed; any flow it launched has already terminated.
    StartFailed {
        /// Bound thread.
        thread_id: ThreadId,
        /// Rendered error.
        error: String,
    },

    /// A flow established its subscription or listener.
    FlowReady {
        /// The flow.
        flow: FlowKind,
    },

    /// A remote record was decoded and dispatched into the local store.
    RecordApplied {
        /// Thread of the record.
        thread_id: ThreadId,
        /// Originating log.
        log_id: LogId,
        /// Number of local store events dispatched.
        events: usize,
    },

    /// A self-authored record was skipped.
    EchoSuppressed {
        /// Own log the record came from.
        log_id: LogId,
    },

    /// A local change was appended to the own log.
    ChangePublished {
        /// Thread written to.
        thread_id: ThreadId,
        /// Identifier of the created record.
        record: Cid,
    },

    /// An item failed and the flow moved on.
    ItemFailed {
        /// The flow.
        flow: FlowKind,
        /// Rendered error.
        error: String,
        /// Dead-letter entry holding the item, if it was buffered.
        dead_letter: Option<Uuid>,
    },

    /// A flow exited.
    FlowTerminated {
        /// The flow.
        flow: FlowKind,
        /// Exit reason.
        exit: FlowExit,
    },

    /// Both flows exited and the adapter is closed.
    Closed {
        /// Bound thread.
        thread_id: ThreadId,
    },
}

impl AdapterEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::Started { .. } | Self::StartFailed { .. } | Self::Closed { .. } => EventTopic::Lifecycle,
            Self::FlowReady { .. } | Self::FlowTerminated { .. } => EventTopic::Lifecycle,
            Self::RecordApplied { .. } | Self::EchoSuppressed { .. } => EventTopic::Ingest,
            Self::ChangePublished { .. } => EventTopic::Publish,
            Self::ItemFailed { .. } => EventTopic::DeadLetterQueue,
        }
    }

    /// Flow the event originated from, if it concerns one.
    #[must_use]
    pub fn flow(&self) -> Option<FlowKind> {
        match self {
            Self::FlowReady { flow } | Self::FlowTerminated { flow, .. } | Self::ItemFailed { flow, .. } => {
                Some(*flow)
            }
            Self::RecordApplied { .. } | Self::EchoSuppressed { .. } => Some(FlowKind::Ingest),
            Self::ChangePublished { .. } => Some(FlowKind::Publish),
            Self::Started { .. } | Self::StartFailed { .. } | Self::Closed { .. } => None,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Start, readiness, termination and close.
    Lifecycle,
    /// Records arriving from the thread.
    Ingest,
    /// Changes leaving for the thread.
    Publish,
    /// Per-item failures.
    DeadLetterQueue,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Flows to include. Empty means all flows; flowless events always pass.
    pub flows: Vec<FlowKind>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            flows: Vec::new(),
        }
    }

    /// Create a filter for events from specific flows.
    #[must_use]
    pub fn from_flows(flows: Vec<FlowKind>) -> Self {
        Self {
            topics: Vec::new(),
            flows,
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &AdapterEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let flow_match = self.flows.is_empty()
            || event.flow().map_or(true, |flow| self.flows.contains(&flow));

        topic_match && flow_match
    }
}
