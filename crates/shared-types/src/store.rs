//! # Local Store Events
//!
//! The local store's representation of an applied change.

use serde::{Deserialize, Serialize};

/// Kind of mutation an event applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreEventKind {
    /// A new instance was created.
    Create,
    /// An existing instance was replaced.
    Save,
    /// An instance was removed.
    Delete,
}

/// One decoded change, applicable by the local store's dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEvent {
    /// Collection the instance lives in.
    pub collection: String,
    /// Instance identifier within the collection.
    pub instance_id: String,
    /// Mutation kind.
    pub kind: StoreEventKind,
    /// Serialized instance (empty for deletes).
    pub payload: Vec<u8>,
}

impl StoreEvent {
    /// Create event for `instance_id` with `payload`.
    #[must_use]
    pub fn create(collection: impl Into<String>, instance_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            collection: collection.into(),
            instance_id: instance_id.into(),
            kind: StoreEventKind::Create,
            payload,
        }
    }

    /// Save event for `instance_id` with `payload`.
    #[must_use]
    pub fn save(collection: impl Into<String>, instance_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            kind: StoreEventKind::Save,
            ..Self::create(collection, instance_id, payload)
        }
    }

    /// Delete event for `instance_id`.
    #[must_use]
    pub fn delete(collection: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            kind: StoreEventKind::Delete,
            ..Self::create(collection, instance_id, Vec::new())
        }
    }
}
