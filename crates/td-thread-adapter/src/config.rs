//! # Adapter Configuration
//!
//! Timeouts, retry policies and buffer sizes for the thread adapter.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A timeout was configured as zero.
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    /// A retry policy allows no attempts.
    #[error("{0} must allow at least one attempt")]
    ZeroAttempts(&'static str),

    /// A buffer or channel was configured with no capacity.
    #[error("{0} must have non-zero capacity")]
    ZeroCapacity(&'static str),
}

/// Thread adapter configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Bound on each `create_record` attempt, in milliseconds.
    pub add_record_timeout_ms: u64,

    /// Bound on decode-or-fetch plus body recovery for one remote record,
    /// in milliseconds.
    pub fetch_event_timeout_ms: u64,

    /// Block fetch attempts before giving up on a record.
    pub block_fetch_attempts: u32,

    /// Sleep before the second block fetch attempt; doubles afterwards.
    pub block_fetch_backoff_ms: u64,

    /// `create_record` attempts before a change is dead-lettered.
    pub publish_attempts: u32,

    /// Sleep before the second publish attempt; doubles afterwards.
    pub publish_backoff_ms: u64,

    /// Maximum dead letters kept before the oldest is evicted.
    pub dead_letter_capacity: usize,

    /// Capacity of the status event bus.
    pub event_channel_capacity: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            add_record_timeout_ms: 10_000,
            fetch_event_timeout_ms: 15_000,
            block_fetch_attempts: 3,
            block_fetch_backoff_ms: 500,
            publish_attempts: 3,
            publish_backoff_ms: 500,
            dead_letter_capacity: 256,
            event_channel_capacity: 1024,
        }
    }
}

impl AdapterConfig {
    /// Create a config for testing (short timeouts and backoffs).
    pub fn for_testing() -> Self {
        Self {
            add_record_timeout_ms: 1_000,
            fetch_event_timeout_ms: 1_500,
            block_fetch_attempts: 3,
            block_fetch_backoff_ms: 10,
            publish_attempts: 3,
            publish_backoff_ms: 10,
            dead_letter_capacity: 16,
            event_channel_capacity: 256,
        }
    }

    /// Reject values that would make a flow spin or block forever.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.add_record_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("add_record_timeout_ms"));
        }
        if self.fetch_event_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("fetch_event_timeout_ms"));
        }
        if self.block_fetch_attempts == 0 {
            return Err(ConfigError::ZeroAttempts("block_fetch_attempts"));
        }
        if self.publish_attempts == 0 {
            return Err(ConfigError::ZeroAttempts("publish_attempts"));
        }
        if self.dead_letter_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("dead_letter_capacity"));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("event_channel_capacity"));
        }
        Ok(())
    }

    /// Per-attempt `create_record` bound.
    pub fn add_record_timeout(&self) -> Duration {
        Duration::from_millis(self.add_record_timeout_ms)
    }

    /// Per-record ingest bound.
    pub fn fetch_event_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_event_timeout_ms)
    }

    /// Initial block fetch backoff.
    pub fn block_fetch_backoff(&self) -> Duration {
        Duration::from_millis(self.block_fetch_backoff_ms)
    }

    /// Initial publish backoff.
    pub fn publish_backoff(&self) -> Duration {
        Duration::from_millis(self.publish_backoff_ms)
    }
}
