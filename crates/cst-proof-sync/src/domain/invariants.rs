//! # Domain Invariants
//!
//! Constants fixed by the ledger programs, and the checks every proof,
//! seed list, and partition request has to pass.

use super::errors::ProofSyncError;
use super::value_objects::Address;

/// Maximum number of seeds in one derivation.
pub const MAX_SEEDS: usize = 16;

/// Maximum length of a single seed.
pub const MAX_SEED_LEN: usize = 32;

/// Domain separator appended to every derivation preimage.
pub const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Namespace tag of asset identifier seeds.
pub const ASSET_SEED: &[u8] = b"asset";

/// Deepest tree the account compression program supports.
pub const MAX_TREE_DEPTH: usize = 30;

/// Program that owns compressed assets (`BGUMAp9Gq7iTEuizy4pqaxsTyUCBK68MDfK752saRPUY`).
pub const BUBBLEGUM_PROGRAM_ID: Address = Address::new([
    152, 139, 128, 235, 121, 53, 40, 105, 178, 36, 116, 95, 89, 221, 191, 138, 38, 88, 202, 19,
    220, 104, 129, 33, 38, 53, 28, 174, 7, 193, 165, 165,
]);

/// Program that owns tree accounts.
pub const ACCOUNT_COMPRESSION_PROGRAM_ID: &str = "cmtDvXumGCrqC1Age74AVPhSRVXJMd8PJS91L8KbNCK";

/// Default number of in-flight operations per batch.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 50;

/// Default search page size (the index caps pages at 1000).
pub const DEFAULT_PAGE_LIMIT: usize = 1000;

/// Default number of identifier-space partitions.
pub const DEFAULT_PARTITION_COUNT: usize = 20;

/// Invariant: a partition split needs at least one partition.
pub fn invariant_partition_count(n: usize) -> Result<(), ProofSyncError> {
    if n < 1 {
        return Err(ProofSyncError::InvalidPartitionCount(n));
    }
    Ok(())
}

/// Invariant: path length equals the tree depth the proof was fetched for.
pub fn invariant_path_depth(path_len: usize, expected: usize) -> Result<(), ProofSyncError> {
    if path_len != expected {
        return Err(ProofSyncError::MalformedProof(format!(
            "path has {path_len} entries, tree depth is {expected}"
        )));
    }
    if path_len > MAX_TREE_DEPTH {
        return Err(ProofSyncError::MalformedProof(format!(
            "depth {path_len} exceeds maximum {MAX_TREE_DEPTH}"
        )));
    }
    Ok(())
}

/// Invariant: `0 <= leaf_index < 2^depth`.
pub fn invariant_leaf_index(leaf_index: u64, depth: usize) -> Result<(), ProofSyncError> {
    let in_range = match 1u64.checked_shl(depth as u32) {
        Some(capacity) => leaf_index < capacity,
        None => true,
    };
    if !in_range {
        return Err(ProofSyncError::MalformedProof(format!(
            "leaf index {leaf_index} does not fit a depth {depth} tree"
        )));
    }
    Ok(())
}

/// Invariant: seed list within the ledger's count and length limits.
pub fn invariant_seeds(seeds: &[&[u8]]) -> Result<(), ProofSyncError> {
    if seeds.len() > MAX_SEEDS {
        return Err(ProofSyncError::InvalidSeeds(format!(
            "{} seeds, at most {MAX_SEEDS} allowed",
            seeds.len()
        )));
    }
    if let Some((i, seed)) = seeds.iter().enumerate().find(|(_, s)| s.len() > MAX_SEED_LEN) {
        return Err(ProofSyncError::InvalidSeeds(format!(
            "seed {i} is {} bytes, at most {MAX_SEED_LEN} allowed",
            seed.len()
        )));
    }
    Ok(())
}
