//! # Shared Bus - Adapter Status Events
//!
//! Broadcast bus through which a thread adapter reports what its flows are
//! doing: readiness, applied records, published changes, per-item failures
//! and terminations.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │ Ingest flow  │──┐                 │    Owner     │
//! └──────────────┘  │  publish()      │              │
//! ┌──────────────┐  ├──────┐          └──────────────┘
//! │ Publish flow │──┘      ▼                 ↑
//! └──────────────┘   ┌──────────────┐        │
//!                    │  Event Bus   │────────┘
//!                    └──────────────┘  subscribe()
//! ```
//!
//! Events are advisory. A bus with no subscribers drops them.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{AdapterEvent, EventFilter, EventTopic, FlowExit, FlowKind};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
