//! # Algorithms
//!
//! Retry with exponential backoff, the block fetcher built on it, and the
//! self-echo filter.

pub mod backoff;
pub mod block_fetcher;
pub mod echo_filter;

pub use backoff::{retry_with_backoff, BackoffPolicy, RetryError};
pub use block_fetcher::BlockFetcher;
pub use echo_filter::is_self_echo;
