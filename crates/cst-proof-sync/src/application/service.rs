//! # Proof Sync Service
//!
//! Application service tying the ledger, the Index Service and the
//! algorithms together: snapshot a tree, derive its leaf identifiers, fetch
//! and verify their proofs, or enumerate a group by partitioned scan.

use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use super::scanner::{
    scan_partitions, verify_batch, verify_item, verify_leaf_range, ScanOptions, ScanReport,
    VerificationOutcome, VerificationReport, VerifyItem, VerifyOptions,
};
use crate::algorithms::{leaf_hash, partition, IdentifierDeriver};
use crate::config::ProofSyncConfig;
use crate::domain::{
    Address, AssetItem, LeafIdentifier, LeafSchema, ProofSyncError, TreeAddress, TreeSnapshot,
};
use crate::ports::{
    GroupPageFetcher, IndexService, LedgerClient, OwnerPageFetcher, PageFetcher, ProofSyncApi,
    TreeVerification,
};

/// Proof Sync Service - orchestrates verification and enumeration.
pub struct ProofSyncService<L: LedgerClient, I: IndexService> {
    /// Configuration.
    config: ProofSyncConfig,
    /// Ledger client (tree roots).
    ledger: Arc<L>,
    /// Index Service (proofs, search).
    index: Arc<I>,
    /// Identifier deriver for `config.program_id`.
    deriver: IdentifierDeriver,
}

impl<L: LedgerClient, I: IndexService> ProofSyncService<L, I> {
    /// Create a new service.
    pub fn new(config: ProofSyncConfig, ledger: Arc<L>, index: Arc<I>) -> Self {
        let deriver = IdentifierDeriver::new(config.program_id);
        Self {
            config,
            ledger,
            index,
            deriver,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &ProofSyncConfig {
        &self.config
    }

    /// Deriver in use.
    pub fn deriver(&self) -> &IdentifierDeriver {
        &self.deriver
    }

    fn verify_options(&self, snapshot: &TreeSnapshot) -> VerifyOptions {
        VerifyOptions {
            concurrency_limit: self.config.concurrency_limit,
            policy: self.config.incomplete_proof_policy,
            expected_depth: Some(snapshot.depth as usize),
            current_root: self
                .config
                .verify_against_current_root
                .then_some(snapshot.root),
        }
    }

    /// Partition the identifier space and scan it through `fetcher`.
    async fn scan_with<F>(&self, fetcher: &F) -> Result<ScanReport<F::Item>, ProofSyncError>
    where
        F: PageFetcher,
    {
        let partitions = partition(self.config.partition_count)?;
        let options = ScanOptions {
            concurrency_limit: self.config.concurrency_limit,
            collect_items: self.config.collect_items,
        };
        Ok(scan_partitions(&partitions, fetcher, &options).await)
    }

    fn check_leaf_index(snapshot: &TreeSnapshot, leaf_index: u64) -> Result<(), ProofSyncError> {
        if leaf_index >= snapshot.size {
            return Err(ProofSyncError::MalformedProof(format!(
                "leaf {leaf_index} is beyond tree size {}",
                snapshot.size
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<L, I> ProofSyncApi for ProofSyncService<L, I>
where
    L: LedgerClient + 'static,
    I: IndexService + 'static,
{
    async fn snapshot(&self, tree: &TreeAddress) -> Result<TreeSnapshot, ProofSyncError> {
        self.ledger.get_tree_snapshot(tree).await
    }

    fn derive_leaf_ids(
        &self,
        tree: &TreeAddress,
        range: Range<u64>,
    ) -> Result<Vec<(u64, LeafIdentifier)>, ProofSyncError> {
        self.deriver.derive_range(tree, range)
    }

    #[instrument(skip(self), fields(tree = %tree))]
    async fn verify_leaf(
        &self,
        tree: &TreeAddress,
        leaf_index: u64,
    ) -> Result<VerificationOutcome, ProofSyncError> {
        let snapshot = self.snapshot(tree).await?;
        Self::check_leaf_index(&snapshot, leaf_index)?;
        let id = self.deriver.derive(tree, leaf_index)?;
        verify_item(
            self.index.as_ref(),
            &VerifyItem::leaf(leaf_index, id),
            &self.verify_options(&snapshot),
        )
        .await
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn verify_asset(
        &self,
        id: &LeafIdentifier,
    ) -> Result<VerificationOutcome, ProofSyncError> {
        let record = self.index.get_asset(id).await?;
        let schema = LeafSchema::from_record(&record)?;
        let tree = record
            .compression
            .as_ref()
            .map(|c| c.tree)
            .ok_or_else(|| ProofSyncError::Decode(format!("asset {id} has no tree")))?;

        let expected_id = self.deriver.derive(&tree, schema.nonce)?;
        if expected_id != *id {
            return Err(ProofSyncError::InvalidAddress(format!(
                "asset {id} does not derive from tree {tree} nonce {}",
                schema.nonce
            )));
        }

        let snapshot = self.snapshot(&tree).await?;
        let item = VerifyItem {
            key: schema.nonce,
            id: *id,
            leaf_index: Some(schema.nonce),
            leaf: Some(leaf_hash(&schema)),
        };
        verify_item(self.index.as_ref(), &item, &self.verify_options(&snapshot)).await
    }

    #[instrument(skip(self, leaf_indices), fields(tree = %tree, count = leaf_indices.len()))]
    async fn verify_leaves(
        &self,
        tree: &TreeAddress,
        leaf_indices: &[u64],
    ) -> Result<VerificationReport, ProofSyncError> {
        let snapshot = self.snapshot(tree).await?;
        let items = leaf_indices
            .iter()
            .map(|&i| -> Result<VerifyItem, ProofSyncError> {
                Self::check_leaf_index(&snapshot, i)?;
                Ok(VerifyItem::leaf(i, self.deriver.derive(tree, i)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(verify_batch(self.index.as_ref(), &items, &self.verify_options(&snapshot)).await)
    }

    #[instrument(skip(self), fields(tree = %tree))]
    async fn verify_tree(&self, tree: &TreeAddress) -> Result<TreeVerification, ProofSyncError> {
        let snapshot = self.snapshot(tree).await?;
        info!(
            depth = snapshot.depth,
            size = snapshot.size,
            "[cst] Verifying tree"
        );

        let report = verify_leaf_range(
            self.index.as_ref(),
            0..snapshot.size,
            |i| self.deriver.derive(tree, i),
            &self.verify_options(&snapshot),
        )
        .await?;

        info!(
            verified = report.verified(),
            mismatched = report.mismatched(),
            unverifiable = report.unverifiable(),
            failed = report.failures.len(),
            "[cst] Tree verification finished"
        );
        Ok(TreeVerification { snapshot, report })
    }

    #[instrument(skip(self))]
    async fn scan_group(
        &self,
        group_key: &str,
        group_value: &str,
    ) -> Result<ScanReport<AssetItem>, ProofSyncError> {
        let fetcher = GroupPageFetcher::new(
            Arc::clone(&self.index),
            group_key,
            group_value,
            self.config.page_limit,
        );
        let report = self.scan_with(&fetcher).await?;
        info!(
            items = report.total_items(),
            pages = report.total_pages(),
            failed = report.failures.len(),
            "[cst] Group scan finished"
        );
        Ok(report)
    }

    #[instrument(skip(self), fields(owner = %owner))]
    async fn scan_owner(&self, owner: &Address) -> Result<ScanReport<AssetItem>, ProofSyncError> {
        let fetcher =
            OwnerPageFetcher::new(Arc::clone(&self.index), *owner, self.config.page_limit);
        let report = self.scan_with(&fetcher).await?;
        info!(
            items = report.total_items(),
            pages = report.total_pages(),
            failed = report.failures.len(),
            "[cst] Owner scan finished"
        );
        Ok(report)
    }
}
