//! # Domain Module
//!
//! Core domain types for the thread adapter.

pub mod dead_letter;
pub mod errors;
pub mod state;
pub mod stats;

pub use dead_letter::*;
pub use errors::*;
pub use state::*;
pub use stats::*;
