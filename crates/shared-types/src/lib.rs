//! # Shared Types Crate
//!
//! Vocabulary shared by every crate in the workspace: thread and log
//! identifiers, content identifiers, records, blocks and the local store's
//! event representation.
//!
//! ## Design Principles
//!
//! - **Opaque records**: the adapter reads records through accessors and
//!   never mutates them.
//! - **Content addressing**: every [`Node`] carries the [`Cid`] of its bytes.
//! - **Capability material stays redacted**: [`ReadKey`] never prints its
//!   bytes through `Debug`.

pub mod ids;
pub mod record;
pub mod store;
pub mod thread;

pub use ids::*;
pub use record::*;
pub use store::*;
pub use thread::*;
