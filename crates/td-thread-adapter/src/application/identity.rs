//! # Own-Identity Resolver
//!
//! Finds this peer's log within the bound thread. Runs once, before either
//! flow starts; the result is the key the ingest flow filters echoes by.

use crate::domain::AdapterError;
use crate::ports::outbound::NetworkError;
use crate::ports::ThreadNetwork;
use shared_types::{LogId, ThreadCredentials, ThreadId};
use tracing::debug;

/// Resolve the own log of the local peer in the thread `creds` is bound to.
///
/// # Errors
///
/// - [`AdapterError::ThreadNotFound`] if the network does not know the thread
/// - [`AdapterError::OwnLogMissing`] if the peer has no log in it
/// - [`AdapterError::Network`] for any other lookup failure
pub async fn resolve_own_log(
    network: &dyn ThreadNetwork,
    creds: &ThreadCredentials,
) -> Result<LogId, AdapterError> {
    let thread_id = creds.thread_id();
    let info = network
        .get_thread(creds)
        .await
        .map_err(|e| thread_lookup_error(thread_id, e))?;
    let own_log = info
        .own_log()
        .map(|log| log.id)
        .ok_or(AdapterError::OwnLogMissing { thread_id })?;
    debug!(thread = %thread_id.fmt_short(), own_log = %own_log.fmt_short(), "own log resolved");
    Ok(own_log)
}

pub(crate) fn thread_lookup_error(thread_id: ThreadId, err: NetworkError) -> AdapterError {
    match err {
        NetworkError::ThreadNotFound(_) => AdapterError::ThreadNotFound { thread_id },
        other => AdapterError::Network(other),
    }
}
