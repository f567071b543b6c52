//! # Range Partitioning
//!
//! Splits the 256-bit identifier space into contiguous slices for parallel
//! keyset scans.
//!
//! `size = floor(span / n)`. Partition `i` covers `[start + i*size,
//! start + (i+1)*size)`; the last one ends at `end` inclusive, absorbing the
//! remainder.

use primitive_types::U256;

use crate::domain::{invariant_partition_count, Address, Partition, ProofSyncError};

/// Split `[0, 2^256 - 1]` into `n` partitions.
///
/// # Errors
/// `InvalidPartitionCount` if `n < 1`.
pub fn partition(n: usize) -> Result<Vec<Partition>, ProofSyncError> {
    partition_space(U256::zero(), U256::MAX, n)
}

/// Split `[start, end]` (both inclusive) into `n` partitions.
///
/// # Errors
/// `InvalidPartitionCount` if `n < 1` or `start > end`.
pub fn partition_space(start: U256, end: U256, n: usize) -> Result<Vec<Partition>, ProofSyncError> {
    invariant_partition_count(n)?;
    if start > end {
        return Err(ProofSyncError::InvalidPartitionCount(n));
    }

    let count = U256::from(n);
    let size = (end - start) / count;

    let partitions = (0..n)
        .map(|i| {
            let low = start + size * U256::from(i);
            let last = i + 1 == n;
            let high = if last {
                end
            } else {
                start + size * U256::from(i + 1)
            };
            Partition {
                index: i,
                start: Address::from_u256(low),
                end: Address::from_u256(high),
                end_inclusive: last,
            }
        })
        .collect();
    Ok(partitions)
}
