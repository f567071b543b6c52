//! # CST Runtime Library
//!
//! Process wiring for compressed state tree sync: environment
//! configuration, adapter construction, and the pass runner. The entry
//! point is the `cst-runtime` binary; the modules are exposed for testing.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging and metrics (`cst-telemetry`)
//! 2. Load [`RuntimeConfig`] from the environment
//! 3. Build the JSON-RPC ledger and index adapters
//! 4. Run one tree verification, group scan or owner scan, racing Ctrl+C
//! 5. Export metrics, log the tally and exit non-zero when items need a retry

#![warn(missing_docs)]

pub mod config;
pub mod runner;

pub use config::{ConfigError, Mode, RuntimeConfig};
pub use runner::{export_metrics, record, RunOutcome, RunSummary, Runner};

use cst_proof_sync::{ProofSyncError, ProofSyncService, RpcIndexService, RpcLedgerClient};
use std::sync::Arc;

/// Service type the binary runs against.
pub type RpcProofSyncService = ProofSyncService<RpcLedgerClient, RpcIndexService>;

/// Build the JSON-RPC backed service described by `config`.
pub fn build_service(config: &RuntimeConfig) -> Result<RpcProofSyncService, ProofSyncError> {
    let ledger = Arc::new(RpcLedgerClient::new(&config.rpc)?);
    let index = Arc::new(RpcIndexService::new(&config.rpc)?);
    Ok(ProofSyncService::new(config.sync.clone(), ledger, index))
}
