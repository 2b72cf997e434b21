//! # Thread-DB Telemetry
//!
//! Structured logging bootstrap. Library crates only emit `tracing` events;
//! binaries and test harnesses call [`init_logging`] once to decide where
//! those events go.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use td_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&TelemetryConfig::from_env())?;
//!     // ...
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RUST_LOG` | unset | Full filter directive, wins over `TD_LOG_LEVEL` |
//! | `TD_LOG_LEVEL` | `info` | Log level filter |
//! | `TD_JSON_LOGS` | `false` | Emit one JSON object per line |
//! | `TD_SERVICE_NAME` | `thread-db` | Service name attached to the startup line |

#![warn(missing_docs)]

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::init_logging;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The level or directive string could not be parsed.
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter {
        /// The rejected directive.
        filter: String,
        /// Parser message.
        reason: String,
    },

    /// A global subscriber was already installed.
    #[error("failed to install global subscriber: {0}")]
    AlreadyInitialized(String),
}
