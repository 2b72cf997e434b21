//! Telemetry configuration from environment variables.

use serde::{Deserialize, Serialize};
use std::env;

/// Configuration for the logging subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name for the startup line
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or a full directive
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Whether to include the event target (module path)
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "thread-db".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// - `TD_SERVICE_NAME`: Service name (default: thread-db)
    /// - `TD_LOG_LEVEL`: Log level (default: info)
    /// - `TD_JSON_LOGS`: Enable JSON logs (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            service_name: lookup("TD_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: lookup("TD_LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logs: lookup("TD_JSON_LOGS")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(defaults.json_logs),
            with_target: defaults.with_target,
        }
    }

    /// Quiet configuration for test harnesses.
    pub fn for_testing() -> Self {
        Self {
            service_name: "thread-db-test".to_string(),
            log_level: "warn".to_string(),
            json_logs: false,
            with_target: false,
        }
    }
}
