//! # Thread-DB Test Suite
//!
//! Cross-crate scenarios: several peers, each with its own local store and
//! thread adapter, replicating through one shared in-memory thread service.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── harness.rs      # Cluster and peer fixtures
//!     ├── replication.rs  # Two-way replication, echo suppression, ordering
//!     ├── resilience.rs   # Block fetch fallback, dead letters, fatal ingest
//!     └── lifecycle.rs    # Start/close semantics and flow termination
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p td-tests
//! cargo test -p td-tests integration::replication::
//! ```

pub mod integration;
