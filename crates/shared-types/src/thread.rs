//! # Thread Metadata
//!
//! Credentials, log listings and key material for a thread.

use crate::ids::{Cid, LogId, ThreadId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies the thread an adapter is bound to, plus the authorization
/// material needed to read and write it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadCredentials {
    thread_id: ThreadId,
    token: Option<String>,
}

impl ThreadCredentials {
    /// Credentials for `thread_id` without an auth token.
    #[must_use]
    pub fn new(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            token: None,
        }
    }

    /// Attach an auth token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// The bound thread.
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Auth token, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Symmetric key that decrypts a thread's event bodies.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadKey(pub [u8; 32]);

impl ReadKey {
    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for ReadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReadKey(..)")
    }
}

/// Key material a peer holds for a thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadKey {
    /// Service key (network-level envelope), if held.
    pub service: Option<[u8; 32]>,
    /// Read key, if held.
    pub read: Option<ReadKey>,
}

impl ThreadKey {
    /// Whether the peer may decrypt event bodies.
    #[must_use]
    pub fn can_read(&self) -> bool {
        self.read.is_some()
    }

    /// The read key, if held.
    #[must_use]
    pub fn read(&self) -> Option<&ReadKey> {
        self.read.as_ref()
    }
}

/// One log within a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogInfo {
    /// Log identifier.
    pub id: LogId,
    /// Latest record appended to this log.
    pub head: Option<Cid>,
    /// Whether this log belongs to the local peer.
    pub own: bool,
}

/// A peer's view of a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    /// Thread identifier.
    pub id: ThreadId,
    /// Logs known for this thread.
    pub logs: Vec<LogInfo>,
    /// Key material held by this peer.
    pub key: ThreadKey,
}

impl ThreadInfo {
    /// The log owned by the local peer, if registered.
    #[must_use]
    pub fn own_log(&self) -> Option<&LogInfo> {
        self.logs.iter().find(|l| l.own)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_log_lookup() {
        let own = LogId::random();
        let info = ThreadInfo {
            id: ThreadId::random(),
            logs: vec![
                LogInfo { id: LogId::random(), head: None, own: false },
                LogInfo { id: own, head: None, own: true },
            ],
            key: ThreadKey::default(),
        };
        assert_eq!(info.own_log().map(|l| l.id), Some(own));
    }

    #[test]
    fn test_read_key_debug_is_redacted() {
        let key = ReadKey([7u8; 32]);
        assert_eq!(format!("{key:?}"), "ReadKey(..)");
    }

    #[test]
    fn test_can_read_requires_read_key() {
        let mut key = ThreadKey::default();
        assert!(!key.can_read());
        key.read = Some(ReadKey([1u8; 32]));
        assert!(key.can_read());
    }
}
