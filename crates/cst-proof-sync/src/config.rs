//! # Proof Sync Configuration
//!
//! Scan, verification and transport settings.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{
    Address, ProofSyncError, BUBBLEGUM_PROGRAM_ID, DEFAULT_CONCURRENCY_LIMIT, DEFAULT_PAGE_LIMIT,
    DEFAULT_PARTITION_COUNT,
};

/// What to do with a proof whose path has blank entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteProofPolicy {
    /// Log a warning and report the item as unverifiable.
    #[default]
    Skip,
    /// Log an error and count the item as a `MalformedProof` failure.
    Surface,
}

impl FromStr for IncompleteProofPolicy {
    type Err = ProofSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "surface" => Ok(Self::Surface),
            other => Err(ProofSyncError::Decode(format!(
                "unknown incomplete proof policy: {other}"
            ))),
        }
    }
}

/// Scan and verification configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofSyncConfig {
    /// Operations admitted per batch. A batch settles fully before the next starts.
    pub concurrency_limit: usize,

    /// Items requested per search page.
    pub page_limit: usize,

    /// Identifier-space partitions for group scans.
    pub partition_count: usize,

    /// Keep scanned items instead of only counting them.
    pub collect_items: bool,

    /// Handling of proofs with blank path entries.
    pub incomplete_proof_policy: IncompleteProofPolicy,

    /// Flag verified proofs whose root is not the current ledger root.
    pub verify_against_current_root: bool,

    /// Program leaf identifiers are derived under.
    pub program_id: Address,
}

impl Default for ProofSyncConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            page_limit: DEFAULT_PAGE_LIMIT,
            partition_count: DEFAULT_PARTITION_COUNT,
            collect_items: false,
            incomplete_proof_policy: IncompleteProofPolicy::Skip,
            verify_against_current_root: false,
            program_id: BUBBLEGUM_PROGRAM_ID,
        }
    }
}

impl ProofSyncConfig {
    /// Create a config for testing (smaller values).
    pub fn for_testing() -> Self {
        Self {
            concurrency_limit: 4,
            page_limit: 10,
            partition_count: 4,
            collect_items: true,
            ..Self::default()
        }
    }
}

/// Retry policy for transient upstream failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First backoff delay.
    pub initial_backoff_ms: u64,
    /// Backoff ceiling.
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }
}

/// Endpoints and transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Index Service JSON-RPC endpoint.
    pub index_url: String,
    /// Ledger JSON-RPC endpoint.
    pub ledger_url: String,
    /// Commitment level for ledger reads.
    pub commitment: String,
    /// Per-request timeout.
    pub request_timeout_ms: u64,
    /// Retry policy.
    pub retry: RetryConfig,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            index_url: "http://127.0.0.1:9090".to_string(),
            ledger_url: "http://127.0.0.1:8899".to_string(),
            commitment: "confirmed".to_string(),
            request_timeout_ms: 30_000,
            retry: RetryConfig::default(),
        }
    }
}

impl RpcConfig {
    /// Create a config for testing: one fast retry, short timeout.
    pub fn for_testing(url: &str) -> Self {
        Self {
            index_url: url.to_string(),
            ledger_url: url.to_string(),
            commitment: "confirmed".to_string(),
            request_timeout_ms: 2_000,
            retry: RetryConfig {
                max_retries: 1,
                initial_backoff_ms: 1,
                max_backoff_ms: 5,
            },
        }
    }
}
