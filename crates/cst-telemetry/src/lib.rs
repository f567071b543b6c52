//! # CST Telemetry
//!
//! Logging and metrics bootstrap for compressed state tree sync.
//!
//! ## Components
//!
//! - **Logs**: `tracing-subscriber` registry with an `EnvFilter` and either a
//!   pretty or a JSON fmt layer
//! - **Metrics**: Prometheus counters for verification outcomes, scan
//!   progress and upstream failures
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cst_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CST_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter directive |
//! | `CST_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |
//! | `CST_LOG_LOCATION` | `false` | File and line in each event |
//! | `CST_SERVICE_NAME` | `cst-sync` | Service name |

#![warn(missing_docs)]

mod config;
pub mod metrics;
mod subscriber;

pub use config::{LogFormat, TelemetryConfig};
pub use metrics::{
    encode_metrics, record_proof_failure, register_metrics, HistogramTimer, MetricsHandle,
    ITEMS_SCANNED, PAGES_FETCHED, PASS_DURATION, PROOFS_VERIFIED, PROOF_FAILURES,
    UPSTREAM_ERRORS,
};
pub use subscriber::{env_filter, init_subscriber};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// A global subscriber is already installed, or install failed.
    #[error("Failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),

    /// Metric registration or encoding failed.
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    /// Unparseable configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Install logging and register metrics.
///
/// The returned guard carries the metrics handle; keep it for as long as
/// metrics should be exported.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    init_subscriber(&config)?;
    Ok(TelemetryGuard { metrics, config })
}

/// Keeps telemetry active.
pub struct TelemetryGuard {
    metrics: MetricsHandle,
    config: TelemetryConfig,
}

impl TelemetryGuard {
    /// Registered metrics.
    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.config.service_name, "[cst] Shutting down telemetry");
    }
}
