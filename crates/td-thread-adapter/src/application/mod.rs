//! # Application Layer
//!
//! The lifecycle controller and the two flows it owns.

mod context;
pub mod identity;
mod ingest;
mod publish;
pub mod service;

pub use identity::resolve_own_log;
pub use service::ThreadAdapter;
