//! # Block Fetcher
//!
//! Retrieves the encoded block underlying a record with bounded retry and
//! exponential backoff. The only place the ingest flow retries; callers
//! treat exhaustion as final for that record.

use crate::algorithms::backoff::{retry_with_backoff, BackoffPolicy, RetryError};
use crate::domain::AdapterError;
use crate::ports::ThreadNetwork;
use shared_types::{Block, Record};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Fetches record blocks from the thread network.
#[derive(Clone)]
pub struct BlockFetcher {
    network: Arc<dyn ThreadNetwork>,
    policy: BackoffPolicy,
}

impl BlockFetcher {
    /// Fetcher making up to `max_attempts` tries, first sleeping
    /// `initial_backoff` and doubling after each failure.
    pub fn new(network: Arc<dyn ThreadNetwork>, max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            network,
            policy: BackoffPolicy::new(max_attempts, initial_backoff),
        }
    }

    /// Fetch the block for `record`, returning the last error if every
    /// attempt fails. No new attempt starts once `shutdown` has fired.
    pub async fn fetch(
        &self,
        record: &Record,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<Block, AdapterError> {
        let network = &self.network;
        let block = retry_with_backoff(self.policy, "fetch_block", shutdown, |attempt| async move {
            debug!(record = %record.cid().fmt_short(), attempt, "fetching block");
            network.fetch_block(record).await
        })
        .await
        .map_err(|err| match err {
            RetryError::Exhausted { attempts, last } => AdapterError::BlockFetch {
                attempts,
                source: last,
            },
            RetryError::Interrupted { attempts } => AdapterError::Interrupted {
                operation: "fetch_block",
                attempts,
            },
        })?;
        Ok(block)
    }
}
