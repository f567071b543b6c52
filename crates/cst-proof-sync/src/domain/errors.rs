//! # Domain Errors
//!
//! Error types for compressed state tree sync.
//!
//! Verification and derivation only ever fail on malformed input; anything
//! that crossed the network is classified as upstream so callers can decide
//! whether to retry.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hash type alias (32-byte tree node digest).
pub type Hash = [u8; 32];

/// Coarse error classification, used in failure tallies and metric labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Proof path is incomplete, has the wrong length, or does not decode.
    MalformedProof,
    /// Well-formed proof whose recomputed root differs from the claimed root.
    RootMismatch,
    /// No bump in the search range produced a valid identifier.
    DerivationExhausted,
    /// Seeds violate the ledger's length or count limits.
    InvalidSeeds,
    /// Partition count below one.
    InvalidPartitionCount,
    /// Transport failure or an overloaded service.
    UpstreamUnavailable,
    /// The service answered with a JSON-RPC error object.
    Rpc,
    /// The service answered with a body we could not decode.
    Decode,
    /// Base58 text that is not a 32-byte address.
    InvalidAddress,
    /// Ledger account bytes that are not a concurrent tree account.
    InvalidAccount,
    /// A page did not move the keyset cursor forward.
    CursorStalled,
}

impl ErrorKind {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedProof => "malformed_proof",
            Self::RootMismatch => "root_mismatch",
            Self::DerivationExhausted => "derivation_exhausted",
            Self::InvalidSeeds => "invalid_seeds",
            Self::InvalidPartitionCount => "invalid_partition_count",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::Rpc => "rpc",
            Self::Decode => "decode",
            Self::InvalidAddress => "invalid_address",
            Self::InvalidAccount => "invalid_account",
            Self::CursorStalled => "cursor_stalled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compressed state tree sync error types.
#[derive(Clone, Debug, Error)]
pub enum ProofSyncError {
    /// Proof cannot be verified: wrong depth, blank entries, bad encoding.
    /// Distinct from a proof that verifies to false.
    #[error("Malformed proof: {0}")]
    MalformedProof(String),

    /// Recomputed root disagrees with the root the proof was fetched against.
    #[error(
        "Root mismatch: expected {}, computed {}",
        hex::encode(.expected),
        hex::encode(.computed)
    )]
    RootMismatch {
        /// Root embedded in the proof
        expected: Hash,
        /// Root recomputed from leaf and path
        computed: Hash,
    },

    /// Every bump from 255 down to 1 produced a reserved output.
    #[error("Identifier derivation exhausted all bump seeds")]
    DerivationExhausted,

    /// Seed material rejected before hashing.
    #[error("Invalid seeds: {0}")]
    InvalidSeeds(String),

    /// Caller asked for fewer than one partition.
    #[error("Invalid partition count: {0} (must be at least 1)")]
    InvalidPartitionCount(usize),

    /// Network error or retryable service status.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// JSON-RPC error object returned by a service.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code (or HTTP status for non-RPC failures)
        code: i64,
        /// Error message from the service
        message: String,
    },

    /// Response body did not match the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Text that is not a base58-encoded 32-byte value.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Ledger account data is not a concurrent Merkle tree.
    #[error("Invalid tree account: {0}")]
    InvalidAccount(String),

    /// The index returned a page whose last id does not advance the cursor.
    #[error("Cursor stalled at {cursor} in partition {partition}")]
    CursorStalled {
        /// Partition being scanned
        partition: usize,
        /// Cursor value that failed to advance
        cursor: String,
    },
}

impl ProofSyncError {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedProof(_) => ErrorKind::MalformedProof,
            Self::RootMismatch { .. } => ErrorKind::RootMismatch,
            Self::DerivationExhausted => ErrorKind::DerivationExhausted,
            Self::InvalidSeeds(_) => ErrorKind::InvalidSeeds,
            Self::InvalidPartitionCount(_) => ErrorKind::InvalidPartitionCount,
            Self::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            Self::Rpc { .. } => ErrorKind::Rpc,
            Self::Decode(_) => ErrorKind::Decode,
            Self::InvalidAddress(_) => ErrorKind::InvalidAddress,
            Self::InvalidAccount(_) => ErrorKind::InvalidAccount,
            Self::CursorStalled { .. } => ErrorKind::CursorStalled,
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_))
    }
}
