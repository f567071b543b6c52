//! # CST Proof Sync
//!
//! Off-chain verification and enumeration for compressed state trees: the
//! ledger stores only each tree's root, the Index Service serves leaves and
//! proofs, and this crate checks one against the other.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! - Verify Merkle inclusion proofs (`keccak256` 2-to-1 hash, index-bit
//!   ordering) against the root they were served with
//! - Derive the identifier of the asset at any leaf of a tree, bit-for-bit
//!   the way the ledger program does
//! - Enumerate large groups by splitting the 256-bit identifier space into
//!   partitions and keyset-paging each one, with bounded concurrency
//!
//! ## Failure Classes
//!
//! | Outcome | Meaning |
//! |---------|---------|
//! | `Verified` | Path hashes up to the proof's root |
//! | `RootMismatch` | Well-formed proof, wrong root: definitive failure |
//! | `Unverifiable` | Index served blank path entries; skipped by policy |
//! | `UpstreamUnavailable` | Transport failure, retried then isolated per item |
//!
//! ## Module Structure
//!
//! ```text
//! cst-proof-sync/
//! ├── domain/          # Address, InclusionProof, Partition, errors
//! ├── algorithms/      # hashing, verification, classification, derivation, partitioning
//! ├── ports/           # API trait (inbound) + ledger/index traits (outbound)
//! ├── application/     # bounded-concurrency scanner, ProofSyncService
//! ├── adapters/        # JSON-RPC ledger and index clients
//! └── config.rs        # ProofSyncConfig, RpcConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use adapters::{JsonRpcTransport, RpcIndexService, RpcLedgerClient, TreeAccount};
pub use algorithms::{
    classify_proof, combine, derive_asset_id, find_program_address, leaf_hash, partition,
    partition_space, recompute_root, verify, verify_checked, IdentifierDeriver, Keccak,
    NodeHasher,
};
pub use application::{
    scan_partitions, verify_batch, verify_leaf_range, ProofSyncService, ScanFailure, ScanOptions,
    ScanReport, VerificationOutcome, VerificationReport, VerifyItem, VerifyOptions,
};
pub use config::{IncompleteProofPolicy, ProofSyncConfig, RetryConfig, RpcConfig};
pub use domain::{
    Address, AssetItem, AssetPage, AssetRecord, ErrorKind, Hash, InclusionProof, LeafIdentifier,
    LeafSchema, OwnerQuery, Partition, ProofShape, ProofSyncError, RawAssetProof, SearchQuery,
    TreeAddress, TreeSnapshot, BUBBLEGUM_PROGRAM_ID,
};
pub use ports::{
    GroupPageFetcher, IndexService, LedgerClient, MockIndexService, MockLedgerClient, MockTree,
    OwnerPageFetcher, PageFetcher, ProofSyncApi, TreeVerification,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
