//! # Exponential Backoff
//!
//! Bounded retry: up to `max_attempts` tries, sleeping between consecutive
//! tries for `initial`, `2 * initial`, `4 * initial`, ... A shutdown signal
//! ends the loop between tries.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Attempt budget and initial sleep of a retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Sleep after the first failed attempt.
    pub initial: Duration,
}

impl BackoffPolicy {
    /// Policy with `max_attempts` (at least one) and `initial` backoff.
    pub fn new(max_attempts: u32, initial: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial,
        }
    }

    /// The sleeps taken between attempts when every attempt fails.
    pub fn schedule(&self) -> Vec<Duration> {
        let mut delays = Vec::with_capacity(self.max_attempts.saturating_sub(1) as usize);
        let mut backoff = self.initial;
        for _ in 1..self.max_attempts {
            delays.push(backoff);
            backoff = backoff.saturating_mul(2);
        }
        delays
    }
}

/// Why a retry loop gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed.
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error of the final attempt.
        last: E,
    },
    /// Shutdown fired before the next attempt could start.
    Interrupted {
        /// Attempts made before shutdown.
        attempts: u32,
    },
}

impl<E> RetryError<E> {
    /// Attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Interrupted { attempts } => *attempts,
        }
    }
}

/// Whether `shutdown` has fired. A dropped sender counts as fired.
fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

/// Run `op` until it succeeds, the policy's attempts are used up, or
/// `shutdown` fires.
///
/// `op` receives the 1-based attempt number. No sleep follows the final
/// attempt. An attempt already running is never cut short; shutdown is
/// observed before each attempt and during the sleep between attempts.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: BackoffPolicy,
    operation: &'static str,
    shutdown: &watch::Receiver<bool>,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut stop = shutdown.clone();
    let mut backoff = policy.initial;
    let mut attempt = 1;
    loop {
        if shutdown_requested(&stop) {
            debug!(operation, attempts = attempt - 1, "shutdown requested, not retrying");
            return Err(RetryError::Interrupted {
                attempts: attempt - 1,
            });
        }
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(last) if attempt >= policy.max_attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last,
                })
            }
            Err(err) => {
                warn!(
                    operation,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "attempt failed, backing off"
                );
                tokio::select! {
                    biased;
                    _ = stop.wait_for(|stop| *stop) => {
                        debug!(operation, attempts = attempt, "shutdown during backoff");
                        return Err(RetryError::Interrupted { attempts: attempt });
                    }
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = backoff.saturating_mul(2);
                attempt += 1;
            }
        }
    }
}
