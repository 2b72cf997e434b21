//! # Thread Adapter
//!
//! Bridges a local embedded store with a distributed, per-peer append-only
//! log ("thread").
//!
//! **Architecture:** Hexagonal (Ports/Adapters)
//!
//! ## Purpose
//!
//! - Publish every locally committed change to this peer's own log, in order.
//! - Ingest every remote record, decode and decrypt it, and dispatch the
//!   resulting events into the local store as one atomic batch.
//! - Never re-apply records this peer authored itself.
//! - Start and stop both flows cleanly, with a single shutdown signal.
//!
//! ## Flows
//!
//! ```text
//!                 ┌──────────────────── ThreadAdapter ────────────────────┐
//!  local store ──▶│ publish flow ──create_record──▶                       │──▶ thread
//!  local store ◀──│                 ◀──dispatch── ingest flow ◀─subscribe │◀── thread
//!                 └───────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! ```text
//! td-thread-adapter/
//! ├── domain/          # Errors, lifecycle state, dead letters, flow stats
//! ├── algorithms/      # Backoff retry, block fetcher, echo filter
//! ├── ports/           # API trait (inbound) + collaborator traits (outbound)
//! ├── application/     # ThreadAdapter, identity resolver, ingest and publish flows
//! ├── adapters/        # In-memory network, codec and local store
//! └── config.rs        # AdapterConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use algorithms::{is_self_echo, retry_with_backoff, BackoffPolicy, BlockFetcher, RetryError};
pub use application::{resolve_own_log, ThreadAdapter};
pub use config::{AdapterConfig, ConfigError};
pub use domain::{
    AdapterError, AdapterState, DeadLetter, DeadLetterPayload, DeadLetterQueue, FlowStats,
    StatsSnapshot,
};
pub use ports::{
    EventCodec, LocalChangeListener, LocalStore, RecordStream, ThreadAdapterApi, ThreadEvent,
    ThreadNetwork,
};
pub use ports::outbound::{CodecError, NetworkError, StoreError};

pub use shared_bus::{AdapterEvent, EventFilter, EventTopic, FlowExit, FlowKind};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
