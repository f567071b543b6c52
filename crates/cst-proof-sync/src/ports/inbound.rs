//! # Inbound Ports
//!
//! API trait defining what the proof sync service can do.

use std::ops::Range;

use async_trait::async_trait;

use crate::application::{ScanReport, VerificationOutcome, VerificationReport};
use crate::domain::{
    Address, AssetItem, LeafIdentifier, ProofSyncError, TreeAddress, TreeSnapshot,
};

/// Result of verifying every occupied leaf of a tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeVerification {
    /// Ledger state the pass ran against.
    pub snapshot: TreeSnapshot,
    /// Per-leaf outcomes, keyed by leaf index.
    pub report: VerificationReport,
}

/// Proof sync API - inbound port.
#[async_trait]
pub trait ProofSyncApi: Send + Sync {
    /// Root, depth and size of a tree as the ledger reports them now.
    async fn snapshot(&self, tree: &TreeAddress) -> Result<TreeSnapshot, ProofSyncError>;

    /// Identifiers for a range of leaf indices.
    fn derive_leaf_ids(
        &self,
        tree: &TreeAddress,
        range: Range<u64>,
    ) -> Result<Vec<(u64, LeafIdentifier)>, ProofSyncError>;

    /// Fetch and verify the proof of one leaf.
    async fn verify_leaf(
        &self,
        tree: &TreeAddress,
        leaf_index: u64,
    ) -> Result<VerificationOutcome, ProofSyncError>;

    /// Recompute an asset's leaf from its record, then verify its proof.
    async fn verify_asset(&self, id: &LeafIdentifier)
        -> Result<VerificationOutcome, ProofSyncError>;

    /// Verify the listed leaves of a tree.
    async fn verify_leaves(
        &self,
        tree: &TreeAddress,
        leaf_indices: &[u64],
    ) -> Result<VerificationReport, ProofSyncError>;

    /// Verify every occupied leaf of a tree.
    async fn verify_tree(&self, tree: &TreeAddress) -> Result<TreeVerification, ProofSyncError>;

    /// Enumerate a group through partitioned keyset scans.
    async fn scan_group(
        &self,
        group_key: &str,
        group_value: &str,
    ) -> Result<ScanReport<AssetItem>, ProofSyncError>;

    /// Enumerate the assets held by `owner` through partitioned keyset scans.
    async fn scan_owner(&self, owner: &Address) -> Result<ScanReport<AssetItem>, ProofSyncError>;
}
