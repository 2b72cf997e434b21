//! # Lifecycle State

use serde::{Deserialize, Serialize};
use std::fmt;

/// Observable lifecycle state of a thread adapter.
///
/// `Started` and `Closed` are idempotent; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterState {
    /// Constructed, flows not running.
    NotStarted,
    /// Both flows running.
    Started,
    /// Both flows exited; no further records are accepted or emitted.
    Closed,
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not-started"),
            Self::Started => write!(f, "started"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
