//! # Outbound Ports
//!
//! Traits for the external collaborators: the ledger (tree roots) and the
//! Index Service (proofs and keyset search).

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::algorithms::{combine, IdentifierDeriver};
use crate::domain::{
    Address, AssetItem, AssetPage, AssetRecord, Hash, Keyed, LeafIdentifier, OwnerQuery,
    ProofSyncError, RawAssetProof, SearchQuery, TreeAddress, TreeSnapshot,
};

/// Ledger client - outbound port.
///
/// Answers are a snapshot valid at call time.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current root of `tree`.
    async fn get_tree_root(&self, tree: &TreeAddress) -> Result<Hash, ProofSyncError>;

    /// Fixed depth of `tree`.
    async fn get_tree_depth(&self, tree: &TreeAddress) -> Result<u32, ProofSyncError>;

    /// Number of occupied leaves in `tree`.
    async fn get_tree_size(&self, tree: &TreeAddress) -> Result<u64, ProofSyncError>;

    /// Root, depth and size together.
    ///
    /// The default issues three reads, which may straddle a tree update.
    /// Adapters that can read all three at once should override it.
    async fn get_tree_snapshot(&self, tree: &TreeAddress) -> Result<TreeSnapshot, ProofSyncError> {
        let root = self.get_tree_root(tree).await?;
        let depth = self.get_tree_depth(tree).await?;
        let size = self.get_tree_size(tree).await?;
        Ok(TreeSnapshot {
            tree: *tree,
            root,
            depth,
            size,
            sequence: 0,
        })
    }
}

/// Index Service - outbound port.
#[async_trait]
pub trait IndexService: Send + Sync {
    /// Proof for one leaf identifier, as served.
    async fn get_asset_proof(&self, id: &LeafIdentifier) -> Result<RawAssetProof, ProofSyncError>;

    /// One keyset page of a search.
    async fn search_assets(&self, query: &SearchQuery) -> Result<AssetPage, ProofSyncError>;

    /// One keyset page of the assets held by an owner.
    async fn get_assets_by_owner(&self, query: &OwnerQuery) -> Result<AssetPage, ProofSyncError>;

    /// Asset record for one identifier.
    async fn get_asset(&self, id: &LeafIdentifier) -> Result<AssetRecord, ProofSyncError>;
}

/// Source of keyset pages - outbound port.
///
/// Both bounds are exclusive; `None` leaves that side open.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Item type; its key becomes the next cursor.
    type Item: Keyed + Send;

    /// Items with `after < id < before`, ascending, at most one page.
    async fn fetch_page(
        &self,
        after: Option<Address>,
        before: Option<Address>,
    ) -> Result<Vec<Self::Item>, ProofSyncError>;
}

/// Pages through one group of an [`IndexService`].
pub struct GroupPageFetcher<I: IndexService> {
    index: Arc<I>,
    group_key: String,
    group_value: String,
    limit: usize,
}

impl<I: IndexService> GroupPageFetcher<I> {
    /// Fetcher for `group_key = group_value`, `limit` items per page.
    pub fn new(
        index: Arc<I>,
        group_key: impl Into<String>,
        group_value: impl Into<String>,
        limit: usize,
    ) -> Self {
        Self {
            index,
            group_key: group_key.into(),
            group_value: group_value.into(),
            limit,
        }
    }
}

#[async_trait]
impl<I: IndexService> PageFetcher for GroupPageFetcher<I> {
    type Item = AssetItem;

    async fn fetch_page(
        &self,
        after: Option<Address>,
        before: Option<Address>,
    ) -> Result<Vec<AssetItem>, ProofSyncError> {
        let query = SearchQuery::group_page(
            self.group_key.clone(),
            self.group_value.clone(),
            self.limit,
            after,
            before,
        );
        Ok(self.index.search_assets(&query).await?.items)
    }
}

/// Pages through the assets of one owner.
pub struct OwnerPageFetcher<I: IndexService> {
    index: Arc<I>,
    owner: Address,
    limit: usize,
}

impl<I: IndexService> OwnerPageFetcher<I> {
    /// Fetcher for `owner`, `limit` items per page.
    pub fn new(index: Arc<I>, owner: Address, limit: usize) -> Self {
        Self {
            index,
            owner,
            limit,
        }
    }
}

#[async_trait]
impl<I: IndexService> PageFetcher for OwnerPageFetcher<I> {
    type Item = AssetItem;

    async fn fetch_page(
        &self,
        after: Option<Address>,
        before: Option<Address>,
    ) -> Result<Vec<AssetItem>, ProofSyncError> {
        let query = OwnerQuery::page(self.owner, self.limit, after, before);
        Ok(self.index.get_assets_by_owner(&query).await?.items)
    }
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Fully materialised tree with zero-valued empty leaves, for building
/// consistent mock proofs.
#[derive(Clone, Debug)]
pub struct MockTree {
    /// Tree address.
    pub address: TreeAddress,
    /// `levels[0]` are the leaves, the last level holds the root.
    levels: Vec<Vec<Hash>>,
    /// Occupied leaves.
    size: u64,
}

impl MockTree {
    /// Build a depth-`depth` tree whose first leaves are `leaves`.
    pub fn new(address: TreeAddress, depth: u32, leaves: &[Hash]) -> Self {
        let width = 1usize << depth;
        let mut level = vec![[0u8; 32]; width];
        level[..leaves.len()].copy_from_slice(leaves);

        let mut levels = vec![level];
        for _ in 0..depth {
            let below = levels.last().map(Vec::as_slice).unwrap_or_default();
            let next: Vec<Hash> = below.chunks(2).map(|pair| combine(&pair[0], &pair[1])).collect();
            levels.push(next);
        }
        Self {
            address,
            levels,
            size: leaves.len() as u64,
        }
    }

    /// Tree depth.
    pub fn depth(&self) -> u32 {
        (self.levels.len() - 1) as u32
    }

    /// Root.
    pub fn root(&self) -> Hash {
        self.levels[self.levels.len() - 1][0]
    }

    /// Leaf at `index`.
    pub fn leaf(&self, index: u64) -> Hash {
        self.levels[0][index as usize]
    }

    /// Sibling path for `index`, nearest the leaf first.
    pub fn path(&self, index: u64) -> Vec<Hash> {
        let mut position = index as usize;
        let mut path = Vec::with_capacity(self.levels.len() - 1);
        for level in &self.levels[..self.levels.len() - 1] {
            path.push(level[position ^ 1]);
            position >>= 1;
        }
        path
    }

    /// Snapshot as the ledger would report it.
    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            tree: self.address,
            root: self.root(),
            depth: self.depth(),
            size: self.size,
            sequence: self.size,
        }
    }

    /// Index Service proof response for `index`.
    pub fn raw_proof(&self, index: u64) -> RawAssetProof {
        let b58 = |h: &Hash| Address::new(*h).to_string();
        RawAssetProof {
            root: Some(b58(&self.root())),
            proof: Some(self.path(index).iter().map(|h| Some(b58(h))).collect()),
            node_index: Some((1u64 << self.depth()) + index),
            leaf: Some(b58(&self.leaf(index))),
            tree_id: Some(self.address.to_string()),
        }
    }
}

/// Mock Index Service for testing.
#[derive(Default)]
pub struct MockIndexService {
    /// Proofs by identifier.
    pub proofs: HashMap<LeafIdentifier, RawAssetProof>,
    /// Asset records by identifier.
    pub assets: HashMap<LeafIdentifier, AssetRecord>,
    /// Group members by `(key, value)`.
    pub groups: HashMap<(String, String), BTreeSet<Address>>,
    /// Assets by owner.
    pub owners: HashMap<Address, BTreeSet<Address>>,
    /// Identifiers whose proof fetch fails as unavailable.
    pub failing: HashSet<LeafIdentifier>,
    /// Fail every search whose `after` cursor is one of these.
    pub failing_cursors: HashSet<Option<Address>>,
    /// Should every call fail?
    pub should_fail: bool,
    /// Proof fetches so far.
    pub proof_calls: AtomicUsize,
    /// Searches so far.
    pub search_calls: AtomicUsize,
}

impl MockIndexService {
    /// Serve proofs for every occupied leaf of `tree`.
    pub fn with_tree(tree: &MockTree, deriver: &IdentifierDeriver) -> Result<Self, ProofSyncError> {
        let mut mock = Self::default();
        mock.add_tree(tree, deriver)?;
        Ok(mock)
    }

    /// Add proofs for every occupied leaf of `tree`.
    pub fn add_tree(
        &mut self,
        tree: &MockTree,
        deriver: &IdentifierDeriver,
    ) -> Result<(), ProofSyncError> {
        for (index, id) in deriver.derive_range(&tree.address, 0..tree.size)? {
            self.proofs.insert(id, tree.raw_proof(index));
        }
        Ok(())
    }

    /// Add members to a group.
    pub fn add_group(
        &mut self,
        key: &str,
        value: &str,
        ids: impl IntoIterator<Item = Address>,
    ) {
        self.groups
            .entry((key.to_string(), value.to_string()))
            .or_default()
            .extend(ids);
    }

    /// Add assets held by `owner`.
    pub fn add_owned(&mut self, owner: Address, ids: impl IntoIterator<Item = Address>) {
        self.owners.entry(owner).or_default().extend(ids);
    }

    fn unavailable() -> ProofSyncError {
        ProofSyncError::UpstreamUnavailable("mock failure".to_string())
    }

    /// Serve one keyset page out of `members`.
    fn page(
        &self,
        members: Option<&BTreeSet<Address>>,
        after: Option<Address>,
        before: Option<Address>,
        limit: usize,
    ) -> Result<AssetPage, ProofSyncError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail || self.failing_cursors.contains(&after) {
            return Err(Self::unavailable());
        }

        let members = match members {
            Some(members) => members,
            None => return Ok(AssetPage::default()),
        };
        if let (Some(after), Some(before)) = (after, before) {
            if after >= before {
                return Ok(AssetPage::default());
            }
        }
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        let upper = before.map_or(Bound::Unbounded, Bound::Excluded);

        let items: Vec<AssetItem> = members
            .range((lower, upper))
            .take(limit)
            .map(|id| AssetItem::bare(*id))
            .collect();
        Ok(AssetPage {
            total: items.len() as u64,
            limit: limit as u64,
            items,
        })
    }
}

#[async_trait]
impl IndexService for MockIndexService {
    async fn get_asset_proof(&self, id: &LeafIdentifier) -> Result<RawAssetProof, ProofSyncError> {
        self.proof_calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail || self.failing.contains(id) {
            return Err(Self::unavailable());
        }
        self.proofs.get(id).cloned().ok_or_else(|| ProofSyncError::Rpc {
            code: -32000,
            message: format!("asset proof not found: {id}"),
        })
    }

    async fn search_assets(&self, query: &SearchQuery) -> Result<AssetPage, ProofSyncError> {
        self.page(
            self.groups.get(&query.grouping),
            query.after,
            query.before,
            query.limit,
        )
    }

    async fn get_assets_by_owner(&self, query: &OwnerQuery) -> Result<AssetPage, ProofSyncError> {
        self.page(
            self.owners.get(&query.owner),
            query.after,
            query.before,
            query.limit,
        )
    }

    async fn get_asset(&self, id: &LeafIdentifier) -> Result<AssetRecord, ProofSyncError> {
        if self.should_fail {
            return Err(Self::unavailable());
        }
        self.assets.get(id).cloned().ok_or_else(|| ProofSyncError::Rpc {
            code: -32000,
            message: format!("asset not found: {id}"),
        })
    }
}

/// Mock ledger client for testing.
#[derive(Clone, Default)]
pub struct MockLedgerClient {
    /// Snapshots by tree.
    pub snapshots: HashMap<TreeAddress, TreeSnapshot>,
    /// Should return errors?
    pub should_fail: bool,
}

impl MockLedgerClient {
    /// Ledger that knows a single tree.
    pub fn with_snapshot(snapshot: TreeSnapshot) -> Self {
        let mut snapshots = HashMap::new();
        snapshots.insert(snapshot.tree, snapshot);
        Self {
            snapshots,
            should_fail: false,
        }
    }

    fn lookup(&self, tree: &TreeAddress) -> Result<&TreeSnapshot, ProofSyncError> {
        if self.should_fail {
            return Err(ProofSyncError::UpstreamUnavailable("mock failure".to_string()));
        }
        self.snapshots
            .get(tree)
            .ok_or_else(|| ProofSyncError::InvalidAccount(format!("unknown tree {tree}")))
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    async fn get_tree_root(&self, tree: &TreeAddress) -> Result<Hash, ProofSyncError> {
        self.lookup(tree).map(|s| s.root)
    }

    async fn get_tree_depth(&self, tree: &TreeAddress) -> Result<u32, ProofSyncError> {
        self.lookup(tree).map(|s| s.depth)
    }

    async fn get_tree_size(&self, tree: &TreeAddress) -> Result<u64, ProofSyncError> {
        self.lookup(tree).map(|s| s.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{classify_proof, verify};
    use crate::domain::ProofShape;

    fn leaves(n: u8) -> Vec<Hash> {
        (1..=n).map(|i| [i; 32]).collect()
    }

    #[test]
    fn test_mock_tree_proofs_verify() {
        let tree = MockTree::new(Address::new([7u8; 32]), 3, &leaves(5));
        for index in 0..5 {
            match classify_proof(&tree.raw_proof(index), Some(3)).unwrap() {
                ProofShape::Complete(proof) => {
                    assert_eq!(proof.leaf_index, index);
                    assert!(verify(&proof));
                }
                other => panic!("unexpected shape {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_mock_ledger_snapshot() {
        let tree = MockTree::new(Address::new([7u8; 32]), 3, &leaves(5));
        let ledger = MockLedgerClient::with_snapshot(tree.snapshot());
        let snapshot = ledger.get_tree_snapshot(&tree.address).await.unwrap();
        assert_eq!(snapshot.root, tree.root());
        assert_eq!(snapshot.depth, 3);
        assert_eq!(snapshot.size, 5);
    }

    #[tokio::test]
    async fn test_mock_ledger_failed() {
        let ledger = MockLedgerClient {
            should_fail: true,
            ..Default::default()
        };
        let err = ledger.get_tree_root(&Address::MIN).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_mock_search_respects_bounds() {
        let mut index = MockIndexService::default();
        let ids: Vec<Address> = (0u8..10).map(|i| Address::new([i; 32])).collect();
        index.add_group("collection", "c", ids.clone());
        let fetcher = GroupPageFetcher::new(Arc::new(index), "collection", "c", 3);

        let page = fetcher.fetch_page(Some(ids[2]), Some(ids[9])).await.unwrap();
        let got: Vec<Address> = page.iter().map(|i| i.id).collect();
        assert_eq!(got, vec![ids[3], ids[4], ids[5]]);

        let page = fetcher.fetch_page(None, Some(ids[1])).await.unwrap();
        assert_eq!(page.len(), 1);

        let page = fetcher.fetch_page(Some(ids[5]), Some(ids[5])).await.unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_owner_fetcher_pages_one_owner() {
        let mut index = MockIndexService::default();
        let owner = Address::new([9u8; 32]);
        let ids: Vec<Address> = (1u8..=5).map(|i| Address::new([i; 32])).collect();
        index.add_owned(owner, ids.clone());
        index.add_owned(Address::new([8u8; 32]), [Address::new([6u8; 32])]);
        let fetcher = OwnerPageFetcher::new(Arc::new(index), owner, 2);

        let page = fetcher.fetch_page(None, None).await.unwrap();
        let got: Vec<Address> = page.iter().map(|i| i.id).collect();
        assert_eq!(got, vec![ids[0], ids[1]]);

        let page = fetcher.fetch_page(Some(ids[3]), None).await.unwrap();
        let got: Vec<Address> = page.iter().map(|i| i.id).collect();
        assert_eq!(got, vec![ids[4]]);
    }

    #[tokio::test]
    async fn test_mock_index_unknown_proof() {
        let index = MockIndexService::default();
        let err = index.get_asset_proof(&Address::MIN).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(index.proof_calls.load(Ordering::SeqCst), 1);
    }
}
