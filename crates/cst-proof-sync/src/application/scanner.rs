//! # Bounded-Concurrency Scanner
//!
//! Drives keyset scans over partitions and proof verifications over leaf
//! identifiers, at most `concurrency_limit` at a time.
//!
//! Work is admitted in fixed batches: a batch of `concurrency_limit` units
//! runs concurrently and the next batch starts only once every unit of the
//! current one has settled. Within a partition pages are strictly
//! sequential. Failures are isolated per unit and reported at the end.
//!
//! Dropping the returned future abandons the batch in flight.

use std::collections::BTreeMap;
use std::ops::Range;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::algorithms::{classify_proof, verify_checked};
use crate::config::IncompleteProofPolicy;
use crate::domain::{
    Address, ErrorKind, Hash, Keyed, LeafIdentifier, Partition, ProofShape, ProofSyncError,
};
use crate::ports::{IndexService, PageFetcher};

// =============================================================================
// Partition scans
// =============================================================================

/// Options for [`scan_partitions`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanOptions {
    /// Partitions scanned concurrently per batch (0 is treated as 1).
    pub concurrency_limit: usize,
    /// Keep items, not just counts.
    pub collect_items: bool,
}

/// Outcome of one fully scanned partition.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionScan<T> {
    /// Partition scanned.
    pub partition: Partition,
    /// Page requests issued, including the final empty one.
    pub pages: usize,
    /// Items seen.
    pub count: u64,
    /// Items, when collected.
    pub items: Vec<T>,
}

/// A partition that could not be scanned to the end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScanFailure {
    /// Partition index.
    pub partition: usize,
    /// Error class.
    pub kind: ErrorKind,
    /// Error message.
    pub message: String,
    /// Cursor of the failed request, for resuming.
    pub cursor: Option<Address>,
    /// Items counted before the failure.
    pub items_before_failure: u64,
    /// Pages fetched before the failure.
    pub pages_before_failure: usize,
}

/// Result of a partitioned scan, merged by partition index.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanReport<T> {
    /// Completed partitions.
    pub partitions: BTreeMap<usize, PartitionScan<T>>,
    /// Failed partitions.
    pub failures: Vec<ScanFailure>,
}

impl<T> Default for ScanReport<T> {
    fn default() -> Self {
        Self {
            partitions: BTreeMap::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> ScanReport<T> {
    /// Items across completed partitions.
    pub fn total_items(&self) -> u64 {
        self.partitions.values().map(|p| p.count).sum()
    }

    /// Page requests across completed and failed partitions.
    pub fn total_pages(&self) -> usize {
        self.partitions.values().map(|p| p.pages).sum::<usize>()
            + self.failures.iter().map(|f| f.pages_before_failure).sum::<usize>()
    }

    /// Item count per completed partition.
    pub fn counts(&self) -> BTreeMap<usize, u64> {
        self.partitions.iter().map(|(i, p)| (*i, p.count)).collect()
    }

    /// Indices of failed partitions, for a targeted retry.
    pub fn failed_partitions(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.partition).collect()
    }

    /// Whether every partition completed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

async fn scan_one<F: PageFetcher>(
    partition: Partition,
    fetcher: &F,
    collect_items: bool,
) -> Result<PartitionScan<F::Item>, ScanFailure> {
    let before = partition.upper_bound();
    let mut cursor = partition.first_cursor();
    let mut scan = PartitionScan {
        partition,
        pages: 0,
        count: 0,
        items: Vec::new(),
    };

    let fail = |scan: &PartitionScan<F::Item>, cursor: Option<Address>, e: ProofSyncError| {
        ScanFailure {
            partition: partition.index,
            kind: e.kind(),
            message: e.to_string(),
            cursor,
            items_before_failure: scan.count,
            pages_before_failure: scan.pages,
        }
    };

    loop {
        let page = match fetcher.fetch_page(cursor, before).await {
            Ok(page) => page,
            Err(e) => return Err(fail(&scan, cursor, e)),
        };
        scan.pages += 1;

        let next = match page.last() {
            Some(last) => last.key(),
            None => break,
        };
        if cursor.is_some_and(|c| next <= c) {
            let e = ProofSyncError::CursorStalled {
                partition: partition.index,
                cursor: cursor.map(|c| c.to_string()).unwrap_or_default(),
            };
            return Err(fail(&scan, cursor, e));
        }

        scan.count += page.len() as u64;
        if collect_items {
            scan.items.extend(page);
        }
        debug!(
            partition = partition.index,
            cursor = %next,
            items = scan.count,
            "[cst] Page fetched"
        );
        cursor = Some(next);
    }

    Ok(scan)
}

/// Scan every partition to exhaustion.
///
/// Each partition starts just before its lower bound, pages with keyset
/// cursors, and stops on the first empty page. A failed partition is
/// recorded and does not stop its siblings.
pub async fn scan_partitions<F: PageFetcher>(
    partitions: &[Partition],
    fetcher: &F,
    options: &ScanOptions,
) -> ScanReport<F::Item> {
    let limit = options.concurrency_limit.max(1);
    let mut report = ScanReport::default();

    for (batch, chunk) in partitions.chunks(limit).enumerate() {
        debug!(batch, size = chunk.len(), "[cst] Starting scan batch");
        let results = join_all(
            chunk
                .iter()
                .map(|p| scan_one(*p, fetcher, options.collect_items)),
        )
        .await;

        for result in results {
            match result {
                Ok(scan) => {
                    info!(
                        partition = scan.partition.index,
                        items = scan.count,
                        pages = scan.pages,
                        "[cst] Partition scanned"
                    );
                    report.partitions.insert(scan.partition.index, scan);
                }
                Err(failure) => {
                    warn!(
                        partition = failure.partition,
                        kind = %failure.kind,
                        error = %failure.message,
                        "[cst] Partition scan failed"
                    );
                    report.failures.push(failure);
                }
            }
        }
    }

    report
}

// =============================================================================
// Proof verification batches
// =============================================================================

/// One identifier to fetch a proof for and verify.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyItem {
    /// Caller's key for merging results (the leaf index for tree passes).
    pub key: u64,
    /// Identifier to fetch the proof for.
    pub id: LeafIdentifier,
    /// Leaf index the proof must report, when known.
    pub leaf_index: Option<u64>,
    /// Leaf value the proof must carry, when recomputed independently.
    pub leaf: Option<Hash>,
}

impl VerifyItem {
    /// Item for the leaf at `leaf_index` of a tree.
    pub fn leaf(leaf_index: u64, id: LeafIdentifier) -> Self {
        Self {
            key: leaf_index,
            id,
            leaf_index: Some(leaf_index),
            leaf: None,
        }
    }
}

/// Options for [`verify_batch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Verifications in flight per batch (0 is treated as 1).
    pub concurrency_limit: usize,
    /// Handling of incomplete proofs.
    pub policy: IncompleteProofPolicy,
    /// Depth every path must have, when known.
    pub expected_depth: Option<usize>,
    /// Current ledger root; proofs against other roots are flagged stale.
    pub current_root: Option<Hash>,
}

/// Per-item verification result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The path hashes up to the proof's root.
    Verified {
        /// Root differs from the current ledger root.
        stale_root: bool,
    },
    /// Well-formed proof, wrong root: a definitive failure.
    RootMismatch {
        /// Root claimed by the proof.
        expected: Hash,
        /// Root recomputed from the path.
        computed: Hash,
    },
    /// Served leaf differs from the independently recomputed one.
    LeafMismatch {
        /// Recomputed leaf.
        expected: Hash,
        /// Leaf carried by the proof.
        served: Hash,
    },
    /// Proof had blank entries and was skipped.
    Unverifiable(ProofShape),
}

impl VerificationOutcome {
    /// Whether the item is proven included.
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }
}

/// Item whose verification could not produce an outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    /// Caller's key.
    pub key: u64,
    /// Identifier.
    pub id: LeafIdentifier,
    /// Error class.
    pub kind: ErrorKind,
    /// Error message.
    pub message: String,
}

/// Outcomes merged by key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerificationReport {
    /// Outcome per key.
    pub outcomes: BTreeMap<u64, (LeafIdentifier, VerificationOutcome)>,
    /// Items that failed with an error.
    pub failures: Vec<ItemFailure>,
}

impl VerificationReport {
    fn count(&self, pred: impl Fn(&VerificationOutcome) -> bool) -> usize {
        self.outcomes.values().filter(|(_, o)| pred(o)).count()
    }

    /// Proven items.
    pub fn verified(&self) -> usize {
        self.count(VerificationOutcome::is_verified)
    }

    /// Proven items whose root is not the current one.
    pub fn stale(&self) -> usize {
        self.count(|o| matches!(o, VerificationOutcome::Verified { stale_root: true }))
    }

    /// Definitive failures (root or leaf mismatch).
    pub fn mismatched(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                VerificationOutcome::RootMismatch { .. } | VerificationOutcome::LeafMismatch { .. }
            )
        })
    }

    /// Skipped incomplete proofs.
    pub fn unverifiable(&self) -> usize {
        self.count(|o| matches!(o, VerificationOutcome::Unverifiable(_)))
    }

    /// Failure tally by error kind.
    pub fn failures_by_kind(&self) -> BTreeMap<ErrorKind, usize> {
        let mut tally = BTreeMap::new();
        for failure in &self.failures {
            *tally.entry(failure.kind).or_insert(0) += 1;
        }
        tally
    }

    /// Keys to retry.
    pub fn failed_keys(&self) -> Vec<u64> {
        self.failures.iter().map(|f| f.key).collect()
    }

    /// Every item verified with no failures.
    pub fn all_verified(&self) -> bool {
        self.failures.is_empty() && self.verified() == self.outcomes.len()
    }

    /// Fold another batch's results into this report.
    pub fn merge(&mut self, other: VerificationReport) {
        self.outcomes.extend(other.outcomes);
        self.failures.extend(other.failures);
    }
}

/// Fetch, classify and verify the proof of a single item.
///
/// # Errors
/// Upstream errors, malformed proofs, a proof for a different leaf index,
/// and incomplete proofs under [`IncompleteProofPolicy::Surface`].
pub async fn verify_item<I: IndexService + ?Sized>(
    index: &I,
    item: &VerifyItem,
    options: &VerifyOptions,
) -> Result<VerificationOutcome, ProofSyncError> {
    let raw = index.get_asset_proof(&item.id).await?;

    let proof = match classify_proof(&raw, options.expected_depth)? {
        ProofShape::Complete(proof) => proof,
        shape => {
            return match options.policy {
                IncompleteProofPolicy::Skip => {
                    warn!(
                        key = item.key,
                        id = %item.id,
                        shape = shape.label(),
                        "[cst] Skipping incomplete proof"
                    );
                    Ok(VerificationOutcome::Unverifiable(shape))
                }
                IncompleteProofPolicy::Surface => {
                    error!(
                        key = item.key,
                        id = %item.id,
                        shape = shape.label(),
                        "[cst] Incomplete proof"
                    );
                    Err(ProofSyncError::MalformedProof(format!(
                        "{} proof for {}",
                        shape.label(),
                        item.id
                    )))
                }
            };
        }
    };

    if let Some(expected) = item.leaf_index {
        if proof.leaf_index != expected {
            return Err(ProofSyncError::MalformedProof(format!(
                "proof is for leaf {}, expected {expected}",
                proof.leaf_index
            )));
        }
    }
    if let Some(expected) = item.leaf {
        if proof.leaf != expected {
            return Ok(VerificationOutcome::LeafMismatch {
                expected,
                served: proof.leaf,
            });
        }
    }

    match verify_checked(&proof, options.expected_depth) {
        Ok(()) => Ok(VerificationOutcome::Verified {
            stale_root: options.current_root.is_some_and(|root| root != proof.root),
        }),
        Err(ProofSyncError::RootMismatch { expected, computed }) => {
            Ok(VerificationOutcome::RootMismatch { expected, computed })
        }
        Err(e) => Err(e),
    }
}

/// Fetch, classify and verify a proof for every item.
///
/// Transport errors, malformed proofs, and (under
/// [`IncompleteProofPolicy::Surface`]) incomplete proofs become
/// [`ItemFailure`]s; everything else becomes an outcome.
pub async fn verify_batch<I: IndexService + ?Sized>(
    index: &I,
    items: &[VerifyItem],
    options: &VerifyOptions,
) -> VerificationReport {
    let limit = options.concurrency_limit.max(1);
    let mut report = VerificationReport::default();

    for chunk in items.chunks(limit) {
        let results = join_all(chunk.iter().map(|item| verify_item(index, item, options))).await;

        for (item, result) in chunk.iter().zip(results) {
            match result {
                Ok(outcome) => {
                    if let VerificationOutcome::RootMismatch { .. } = outcome {
                        warn!(key = item.key, id = %item.id, "[cst] Root mismatch");
                    }
                    report.outcomes.insert(item.key, (item.id, outcome));
                }
                Err(e) => {
                    debug!(key = item.key, id = %item.id, error = %e, "[cst] Verification failed");
                    report.failures.push(ItemFailure {
                        key: item.key,
                        id: item.id,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    report
}

/// Verify the leaves in `range`, deriving identifiers one batch at a time.
///
/// Each batch of `concurrency_limit` identifiers is derived right before its
/// proofs are fetched, so memory and up-front CPU stay bounded by the batch
/// size rather than the tree size.
///
/// # Errors
/// The first derivation error; batches already verified are discarded.
pub async fn verify_leaf_range<I, D>(
    index: &I,
    range: Range<u64>,
    derive: D,
    options: &VerifyOptions,
) -> Result<VerificationReport, ProofSyncError>
where
    I: IndexService + ?Sized,
    D: Fn(u64) -> Result<LeafIdentifier, ProofSyncError>,
{
    let limit = options.concurrency_limit.max(1) as u64;
    let mut report = VerificationReport::default();
    let mut start = range.start;

    while start < range.end {
        let end = range.end.min(start.saturating_add(limit));
        let items = (start..end)
            .map(|i| derive(i).map(|id| VerifyItem::leaf(i, id)))
            .collect::<Result<Vec<_>, _>>()?;
        report.merge(verify_batch(index, &items, options).await);
        debug!(done = end - range.start, total = range.end - range.start, "[cst] Leaf batch");
        start = end;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{partition, IdentifierDeriver};
    use crate::ports::{MockIndexService, MockTree};
    use async_trait::async_trait;
    use primitive_types::U256;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Returns `limit` fresh items per call for the first `k` calls of every
    /// partition, then empty pages. Tracks concurrency.
    struct CountingFetcher {
        k: usize,
        limit: usize,
        delay: Duration,
        calls: Mutex<BTreeMap<Option<Address>, usize>>,
        total_calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        fail_before: Option<Address>,
    }

    impl CountingFetcher {
        fn new(k: usize, limit: usize) -> Self {
            Self {
                k,
                limit,
                delay: Duration::from_millis(0),
                calls: Mutex::new(BTreeMap::new()),
                total_calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                fail_before: None,
            }
        }
    }

    #[async_trait]
    impl PageFetcher for CountingFetcher {
        type Item = Address;

        async fn fetch_page(
            &self,
            after: Option<Address>,
            before: Option<Address>,
        ) -> Result<Vec<Address>, ProofSyncError> {
            self.total_calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_before.is_some() && before == self.fail_before {
                return Err(ProofSyncError::UpstreamUnavailable("boom".into()));
            }

            // calls are counted per partition, keyed by its upper bound
            let call = {
                let mut calls = self.calls.lock().unwrap();
                let n = calls.entry(before).or_insert(0);
                *n += 1;
                *n
            };
            if call > self.k {
                return Ok(vec![]);
            }
            let base = after.map_or(U256::zero(), |a| a.to_u256() + U256::one());
            Ok((0..self.limit)
                .map(|i| Address::from_u256(base + U256::from(i)))
                .collect())
        }
    }

    #[tokio::test]
    async fn test_scan_stops_after_k_plus_one_calls() {
        let fetcher = CountingFetcher::new(3, 5);
        let parts = partition(4).unwrap();
        let options = ScanOptions {
            concurrency_limit: 50,
            collect_items: false,
        };
        let report = scan_partitions(&parts, &fetcher, &options).await;

        assert!(report.is_complete());
        assert_eq!(report.partitions.len(), 4);
        for scan in report.partitions.values() {
            assert_eq!(scan.pages, 4);
            assert_eq!(scan.count, 15);
            assert!(scan.items.is_empty());
        }
        assert_eq!(fetcher.total_calls.load(Ordering::SeqCst), 16);
        assert_eq!(report.total_items(), 60);
        assert_eq!(report.total_pages(), 16);
    }

    #[tokio::test]
    async fn test_scan_collects_items_in_order() {
        let fetcher = CountingFetcher::new(2, 3);
        let parts = partition(1).unwrap();
        let options = ScanOptions {
            concurrency_limit: 1,
            collect_items: true,
        };
        let report = scan_partitions(&parts, &fetcher, &options).await;
        let items = &report.partitions[&0].items;
        assert_eq!(items.len(), 6);
        assert!(items.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(items[0], Address::MIN);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_batches_respect_concurrency_limit() {
        let mut fetcher = CountingFetcher::new(1, 1);
        fetcher.delay = Duration::from_millis(10);
        let parts = partition(10).unwrap();
        let options = ScanOptions {
            concurrency_limit: 3,
            collect_items: false,
        };
        let report = scan_partitions(&parts, &fetcher, &options).await;
        assert_eq!(report.partitions.len(), 10);
        assert_eq!(fetcher.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_scan_failure_is_isolated() {
        let parts = partition(3).unwrap();
        let mut fetcher = CountingFetcher::new(2, 2);
        fetcher.fail_before = parts[1].upper_bound();
        let options = ScanOptions {
            concurrency_limit: 2,
            collect_items: false,
        };
        let report = scan_partitions(&parts, &fetcher, &options).await;

        assert_eq!(report.failed_partitions(), vec![1]);
        assert_eq!(report.failures[0].kind, ErrorKind::UpstreamUnavailable);
        assert_eq!(report.failures[0].cursor, parts[1].first_cursor());
        assert_eq!(report.counts(), BTreeMap::from([(0, 4), (2, 4)]));
    }

    struct StuckFetcher;

    #[async_trait]
    impl PageFetcher for StuckFetcher {
        type Item = Address;

        async fn fetch_page(
            &self,
            _after: Option<Address>,
            _before: Option<Address>,
        ) -> Result<Vec<Address>, ProofSyncError> {
            Ok(vec![Address::new([1u8; 32])])
        }
    }

    #[tokio::test]
    async fn test_scan_detects_stalled_cursor() {
        let parts = partition(1).unwrap();
        let options = ScanOptions {
            concurrency_limit: 1,
            collect_items: false,
        };
        let report = scan_partitions(&parts, &StuckFetcher, &options).await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, ErrorKind::CursorStalled);
        assert_eq!(report.failures[0].items_before_failure, 1);
        assert_eq!(report.failures[0].pages_before_failure, 2);
    }

    fn fixture(leaves: u8) -> (MockTree, MockIndexService, Vec<VerifyItem>) {
        let leaf_values: Vec<Hash> = (1..=leaves).map(|i| [i; 32]).collect();
        let tree = MockTree::new(Address::new([7u8; 32]), 4, &leaf_values);
        let deriver = IdentifierDeriver::default();
        let index = MockIndexService::with_tree(&tree, &deriver).unwrap();
        let items = deriver
            .derive_range(&tree.address, 0..leaves as u64)
            .unwrap()
            .into_iter()
            .map(|(i, id)| VerifyItem::leaf(i, id))
            .collect();
        (tree, index, items)
    }

    fn options(policy: IncompleteProofPolicy) -> VerifyOptions {
        VerifyOptions {
            concurrency_limit: 2,
            policy,
            expected_depth: Some(4),
            current_root: None,
        }
    }

    #[tokio::test]
    async fn test_verify_batch_all_verified() {
        let (_, index, items) = fixture(5);
        let report = verify_batch(&index, &items, &options(IncompleteProofPolicy::Skip)).await;
        assert!(report.all_verified());
        assert_eq!(report.verified(), 5);
        assert_eq!(index.proof_calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_verify_batch_flags_stale_root() {
        let (_, index, items) = fixture(3);
        let mut opts = options(IncompleteProofPolicy::Skip);
        opts.current_root = Some([0xee; 32]);
        let report = verify_batch(&index, &items, &opts).await;
        assert_eq!(report.verified(), 3);
        assert_eq!(report.stale(), 3);
    }

    #[tokio::test]
    async fn test_verify_batch_root_mismatch() {
        let (_, mut index, items) = fixture(3);
        let proof = index.proofs.get_mut(&items[1].id).unwrap();
        proof.root = Some(Address::new([0xab; 32]).to_string());
        let report = verify_batch(&index, &items, &options(IncompleteProofPolicy::Skip)).await;
        assert_eq!(report.verified(), 2);
        assert_eq!(report.mismatched(), 1);
        assert!(matches!(
            report.outcomes[&1].1,
            VerificationOutcome::RootMismatch { .. }
        ));
    }

    #[tokio::test]
    async fn test_verify_batch_incomplete_policy() {
        let (_, mut index, items) = fixture(3);
        let proof = index.proofs.get_mut(&items[0].id).unwrap();
        proof.proof.as_mut().unwrap()[2] = Some(String::new());

        let skipped = verify_batch(&index, &items, &options(IncompleteProofPolicy::Skip)).await;
        assert_eq!(skipped.unverifiable(), 1);
        assert!(skipped.failures.is_empty());

        let surfaced =
            verify_batch(&index, &items, &options(IncompleteProofPolicy::Surface)).await;
        assert_eq!(surfaced.unverifiable(), 0);
        assert_eq!(surfaced.failed_keys(), vec![0]);
        assert_eq!(surfaced.failures[0].kind, ErrorKind::MalformedProof);
    }

    #[tokio::test]
    async fn test_verify_batch_isolates_upstream_failures() {
        let (_, mut index, items) = fixture(4);
        index.failing.insert(items[2].id);
        let report = verify_batch(&index, &items, &options(IncompleteProofPolicy::Skip)).await;
        assert_eq!(report.verified(), 3);
        assert_eq!(
            report.failures_by_kind(),
            BTreeMap::from([(ErrorKind::UpstreamUnavailable, 1)])
        );
        assert_eq!(report.failed_keys(), vec![2]);
    }

    #[tokio::test]
    async fn test_verify_batch_wrong_leaf_index() {
        let (_, index, mut items) = fixture(3);
        items[0].leaf_index = Some(2);
        let report = verify_batch(&index, &items, &options(IncompleteProofPolicy::Skip)).await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, ErrorKind::MalformedProof);
    }

    #[tokio::test]
    async fn test_verify_batch_leaf_mismatch() {
        let (_, index, mut items) = fixture(2);
        items[1].leaf = Some([0x55; 32]);
        let report = verify_batch(&index, &items, &options(IncompleteProofPolicy::Skip)).await;
        assert_eq!(
            report.outcomes[&1].1,
            VerificationOutcome::LeafMismatch {
                expected: [0x55; 32],
                served: [2u8; 32],
            }
        );
    }

    /// Records how many identifiers had been derived when each proof was
    /// requested.
    struct DerivationAwareIndex {
        inner: MockIndexService,
        derived: Arc<AtomicUsize>,
        derived_at_fetch: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl IndexService for DerivationAwareIndex {
        async fn get_asset_proof(
            &self,
            id: &LeafIdentifier,
        ) -> Result<crate::domain::RawAssetProof, ProofSyncError> {
            let derived = self.derived.load(Ordering::SeqCst);
            self.derived_at_fetch.lock().unwrap().push(derived);
            self.inner.get_asset_proof(id).await
        }

        async fn search_assets(
            &self,
            query: &crate::domain::SearchQuery,
        ) -> Result<crate::domain::AssetPage, ProofSyncError> {
            self.inner.search_assets(query).await
        }

        async fn get_assets_by_owner(
            &self,
            query: &crate::domain::OwnerQuery,
        ) -> Result<crate::domain::AssetPage, ProofSyncError> {
            self.inner.get_assets_by_owner(query).await
        }

        async fn get_asset(
            &self,
            id: &LeafIdentifier,
        ) -> Result<crate::domain::AssetRecord, ProofSyncError> {
            self.inner.get_asset(id).await
        }
    }

    #[tokio::test]
    async fn test_leaf_range_derives_batch_by_batch() {
        let (tree, inner, _) = fixture(10);
        let derived = Arc::new(AtomicUsize::new(0));
        let index = DerivationAwareIndex {
            inner,
            derived: Arc::clone(&derived),
            derived_at_fetch: Mutex::new(Vec::new()),
        };
        let deriver = IdentifierDeriver::default();
        let derive = |i: u64| {
            derived.fetch_add(1, Ordering::SeqCst);
            deriver.derive(&tree.address, i)
        };

        // concurrency 2 -> batches [0,1] [2,3] ... [8,9]
        let opts = options(IncompleteProofPolicy::Skip);
        let report = verify_leaf_range(&index, 0..10, derive, &opts).await.unwrap();

        assert_eq!(report.verified(), 10);
        assert!(report.all_verified());
        assert_eq!(derived.load(Ordering::SeqCst), 10);
        let seen = index.derived_at_fetch.lock().unwrap().clone();
        assert_eq!(seen.len(), 10);
        assert_eq!(seen[0], 2, "first proof must be fetched after one batch");
        assert_eq!(seen, vec![2, 2, 4, 4, 6, 6, 8, 8, 10, 10]);
    }

    #[tokio::test]
    async fn test_leaf_range_partial_and_empty() {
        let (tree, index, _) = fixture(5);
        let deriver = IdentifierDeriver::default();
        let derive = |i: u64| deriver.derive(&tree.address, i);
        let opts = options(IncompleteProofPolicy::Skip);

        let report = verify_leaf_range(&index, 3..5, derive, &opts).await.unwrap();
        assert_eq!(report.outcomes.keys().copied().collect::<Vec<_>>(), vec![3, 4]);

        let report = verify_leaf_range(&index, 0..0, derive, &opts).await.unwrap();
        assert!(report.outcomes.is_empty());
        assert_eq!(index.proof_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_leaf_range_stops_on_derivation_error() {
        let (_, index, _) = fixture(4);
        let derive = |i: u64| {
            if i == 2 {
                Err(ProofSyncError::DerivationExhausted)
            } else {
                IdentifierDeriver::default().derive(&Address::new([7u8; 32]), i)
            }
        };
        let result =
            verify_leaf_range(&index, 0..4, derive, &options(IncompleteProofPolicy::Skip)).await;
        assert!(matches!(result, Err(ProofSyncError::DerivationExhausted)));
        // the first batch was already fetched
        assert_eq!(index.proof_calls.load(Ordering::SeqCst), 2);
    }
}
