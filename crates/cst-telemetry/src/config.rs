//! Telemetry configuration from environment variables.

use std::env;

use serde::{Deserialize, Serialize};

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, ANSI coloured.
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Configuration for logging and metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event
    pub service_name: String,

    /// Log level filter directive (trace, debug, info, warn, error, or a
    /// full `EnvFilter` directive string)
    pub log_level: String,

    /// Log output format
    pub format: LogFormat,

    /// Include file and line in each event
    pub with_location: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "cst-sync".to_string(),
            log_level: "info".to_string(),
            format: LogFormat::Pretty,
            with_location: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CST_SERVICE_NAME`: Service name (default: cst-sync)
    /// - `CST_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `CST_JSON_LOGS`: JSON output (default: false, true in containers)
    /// - `CST_LOG_LOCATION`: Include file and line (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let is_container =
            lookup("KUBERNETES_SERVICE_HOST").is_some() || lookup("DOCKER_CONTAINER").is_some();
        let json_logs = lookup("CST_JSON_LOGS")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(is_container);

        Self {
            service_name: lookup("CST_SERVICE_NAME").unwrap_or_else(|| "cst-sync".to_string()),
            log_level: lookup("CST_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or_else(|| "info".to_string()),
            format: if json_logs {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
            with_location: lookup("CST_LOG_LOCATION")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
        }
    }
}
