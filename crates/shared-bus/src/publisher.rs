//! # Event Publisher
//!
//! Publishing side of the bus.

use crate::events::{AdapterEvent, EventFilter};
use crate::subscriber::{EventStream, Subscription, SubscriptionGuard};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Anything that can carry adapter status events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event, returning how many subscribers were handed it.
    async fn publish(&self, event: AdapterEvent) -> usize;

    /// Total events published so far, delivered or not.
    fn events_published(&self) -> u64;
}

/// Broadcast bus held by one adapter.
///
/// Slow subscribers lag rather than block publishers; a lagging
/// subscription skips the events it missed.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<AdapterEvent>,
    active: Arc<AtomicUsize>,
    events_published: AtomicU64,
    capacity: usize,
}

impl InMemoryEventBus {
    /// Bus with [`DEFAULT_CHANNEL_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Bus buffering up to `capacity` events per subscriber.
    ///
    /// # Panics
    ///
    /// If `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            active: Arc::new(AtomicUsize::new(0)),
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to events matching `filter`, starting from the next one
    /// published.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        trace!(topics = ?filter.topics, flows = ?filter.flows, "subscription opened");
        Subscription::new(
            self.sender.subscribe(),
            filter,
            SubscriptionGuard::new(self.active.clone()),
        )
    }

    /// Same as [`subscribe`](Self::subscribe), as a `Stream`.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream {
        self.subscribe(filter).into_stream()
    }

    /// Subscriptions and streams currently alive.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Per-subscriber buffer size.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: AdapterEvent) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        let topic = event.topic();
        // Err only means nobody is listening.
        let delivered = self.sender.send(event).unwrap_or(0);
        trace!(?topic, delivered, "event published");
        delivered
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
