//! # Identifiers
//!
//! Fixed-width identifiers for threads, logs and content.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when an identifier cannot be parsed from hex.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdParseError {
    /// Input was not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    /// Input decoded to the wrong number of bytes.
    #[error("expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

macro_rules! fixed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Generate a random identifier.
            #[must_use]
            pub fn random() -> Self {
                let mut bytes = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut bytes);
                Self(bytes)
            }

            /// Raw bytes.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// First eight hex characters, for log lines.
            #[must_use]
            pub fn fmt_short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.fmt_short())
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(s).map_err(|e| IdParseError::InvalidHex(e.to_string()))?;
                let len = bytes.len();
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| IdParseError::InvalidLength(len))?;
                Ok(Self(arr))
            }
        }
    };
}

fixed_id!(
    /// Identifier of a thread (a multi-writer log shared by a set of peers).
    ThreadId
);

fixed_id!(
    /// Identifier of one peer's append-only log within a thread.
    LogId
);

fixed_id!(
    /// Content identifier: SHA-256 of the addressed bytes.
    Cid
);

impl Cid {
    /// Compute the content identifier of `data`.
    #[must_use]
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }
}
