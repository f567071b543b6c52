//! Concurrent Merkle tree account decoding.
//!
//! Account layout (little-endian):
//!
//! ```text
//! 0      account type (1 = concurrent tree)
//! 1      header version (0 = V1)
//! 2..6   max_buffer_size  u32
//! 6..10  max_depth        u32
//! 10..42 authority        [u8; 32]
//! 42..50 creation_slot    u64
//! 50..56 padding
//! 56     sequence_number  u64
//! 64     active_index     u64
//! 72     buffer_size      u64
//! 80     change_logs[max_buffer_size] { root, path[depth], index u32, _pad u32 }
//! ..     rightmost_path { proof[depth], leaf, index u32, _pad u32 }
//! ..     canopy (ignored)
//! ```

use crate::domain::{Address, Hash, ProofSyncError, TreeAddress, TreeSnapshot, MAX_TREE_DEPTH};

/// Discriminator of a concurrent Merkle tree account.
pub const ACCOUNT_TYPE_CONCURRENT_TREE: u8 = 1;

/// Header version this decoder understands.
pub const HEADER_VERSION_V1: u8 = 0;

/// Bytes before the tree body.
pub const HEADER_LEN: usize = 56;

const TREE_PREFIX_LEN: usize = 24;

/// Decoded header and the parts of the tree body needed for a snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeAccount {
    /// Change log ring capacity.
    pub max_buffer_size: u32,
    /// Fixed tree depth.
    pub max_depth: u32,
    /// Tree authority.
    pub authority: Address,
    /// Slot the tree was created in.
    pub creation_slot: u64,
    /// Number of applied changes.
    pub sequence_number: u64,
    /// Change log slot holding the current root.
    pub active_index: u64,
    /// Number of filled change log slots.
    pub buffer_size: u64,
    /// Current root.
    pub root: Hash,
    /// Rightmost leaf value.
    pub rightmost_leaf: Hash,
    /// Index one past the rightmost leaf, i.e. the number of appended leaves.
    pub rightmost_index: u32,
}

impl TreeAccount {
    /// Bytes per change log entry at `depth`.
    pub fn change_log_len(depth: u32) -> usize {
        32 + 32 * depth as usize + 8
    }

    /// Bytes of the rightmost path at `depth`.
    pub fn rightmost_path_len(depth: u32) -> usize {
        32 * depth as usize + 32 + 8
    }

    /// Minimum account size for a tree, canopy excluded.
    pub fn account_len(depth: u32, max_buffer_size: u32) -> usize {
        HEADER_LEN
            + TREE_PREFIX_LEN
            + max_buffer_size as usize * Self::change_log_len(depth)
            + Self::rightmost_path_len(depth)
    }

    /// Decode raw account data.
    pub fn parse(data: &[u8]) -> Result<Self, ProofSyncError> {
        if data.len() < HEADER_LEN + TREE_PREFIX_LEN {
            return Err(invalid(format!("{} bytes is too short", data.len())));
        }
        if data[0] != ACCOUNT_TYPE_CONCURRENT_TREE {
            return Err(invalid(format!("account type {}", data[0])));
        }
        if data[1] != HEADER_VERSION_V1 {
            return Err(invalid(format!("header version {}", data[1])));
        }

        let max_buffer_size = read_u32(data, 2)?;
        let max_depth = read_u32(data, 6)?;
        let authority = Address::new(read_hash(data, 10)?);
        let creation_slot = read_u64(data, 42)?;

        if max_depth == 0 || max_depth as usize > MAX_TREE_DEPTH {
            return Err(invalid(format!("max depth {max_depth}")));
        }
        if max_buffer_size == 0 {
            return Err(invalid("zero change log capacity".into()));
        }
        let needed = Self::account_len(max_depth, max_buffer_size);
        if data.len() < needed {
            return Err(invalid(format!(
                "{} bytes, depth {max_depth} buffer {max_buffer_size} needs {needed}",
                data.len()
            )));
        }

        let sequence_number = read_u64(data, HEADER_LEN)?;
        let active_index = read_u64(data, HEADER_LEN + 8)?;
        let buffer_size = read_u64(data, HEADER_LEN + 16)?;
        if active_index >= u64::from(max_buffer_size) {
            return Err(invalid(format!(
                "active index {active_index} outside buffer of {max_buffer_size}"
            )));
        }

        let change_logs = HEADER_LEN + TREE_PREFIX_LEN;
        let change_log_len = Self::change_log_len(max_depth);
        let root = read_hash(data, change_logs + active_index as usize * change_log_len)?;

        let rightmost = change_logs + max_buffer_size as usize * change_log_len;
        let leaf_at = rightmost + 32 * max_depth as usize;
        let rightmost_leaf = read_hash(data, leaf_at)?;
        let rightmost_index = read_u32(data, leaf_at + 32)?;

        Ok(Self {
            max_buffer_size,
            max_depth,
            authority,
            creation_slot,
            sequence_number,
            active_index,
            buffer_size,
            root,
            rightmost_leaf,
            rightmost_index,
        })
    }

    /// Snapshot view of this account for `tree`.
    pub fn snapshot(&self, tree: TreeAddress) -> TreeSnapshot {
        TreeSnapshot {
            tree,
            root: self.root,
            depth: self.max_depth,
            size: u64::from(self.rightmost_index),
            sequence: self.sequence_number,
        }
    }
}

fn invalid(reason: String) -> ProofSyncError {
    ProofSyncError::InvalidAccount(reason)
}

fn slice<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ProofSyncError> {
    data.get(offset..offset + N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| invalid(format!("read of {N} bytes at {offset} out of range")))
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, ProofSyncError> {
    slice::<4>(data, offset).map(u32::from_le_bytes)
}

fn read_u64(data: &[u8], offset: usize) -> Result<u64, ProofSyncError> {
    slice::<8>(data, offset).map(u64::from_le_bytes)
}

fn read_hash(data: &[u8], offset: usize) -> Result<Hash, ProofSyncError> {
    slice::<32>(data, offset)
}

/// Account bytes with the given header and current root; every other
/// change log and path entry is zero.
#[cfg(test)]
pub(crate) fn encode_for_test(
    depth: u32,
    max_buffer_size: u32,
    active_index: u64,
    root: Hash,
    size: u32,
    sequence: u64,
) -> Vec<u8> {
    let mut data = vec![0u8; TreeAccount::account_len(depth, max_buffer_size)];
    data[0] = ACCOUNT_TYPE_CONCURRENT_TREE;
    data[1] = HEADER_VERSION_V1;
    data[2..6].copy_from_slice(&max_buffer_size.to_le_bytes());
    data[6..10].copy_from_slice(&depth.to_le_bytes());
    data[10..42].copy_from_slice(&[9u8; 32]);
    data[42..50].copy_from_slice(&77u64.to_le_bytes());
    data[56..64].copy_from_slice(&sequence.to_le_bytes());
    data[64..72].copy_from_slice(&active_index.to_le_bytes());
    data[72..80].copy_from_slice(&(active_index + 1).to_le_bytes());

    let change_log_len = TreeAccount::change_log_len(depth);
    let root_at = HEADER_LEN + TREE_PREFIX_LEN + active_index as usize * change_log_len;
    data[root_at..root_at + 32].copy_from_slice(&root);

    let index_at = HEADER_LEN
        + TREE_PREFIX_LEN
        + max_buffer_size as usize * change_log_len
        + 32 * depth as usize
        + 32;
    data[index_at..index_at + 4].copy_from_slice(&size.to_le_bytes());
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;

    #[test]
    fn test_sizes() {
        // depth 14, buffer 64: the smallest tree shape commonly deployed
        assert_eq!(TreeAccount::change_log_len(14), 488);
        assert_eq!(TreeAccount::account_len(14, 64), 56 + 24 + 64 * 488 + 488);
    }

    #[test]
    fn test_parse_reads_active_root() {
        let root = [0x5a; 32];
        let data = encode_for_test(3, 8, 5, root, 6, 42);
        let account = TreeAccount::parse(&data).unwrap();

        assert_eq!(account.max_depth, 3);
        assert_eq!(account.max_buffer_size, 8);
        assert_eq!(account.active_index, 5);
        assert_eq!(account.buffer_size, 6);
        assert_eq!(account.sequence_number, 42);
        assert_eq!(account.creation_slot, 77);
        assert_eq!(account.authority, Address::new([9u8; 32]));
        assert_eq!(account.root, root);
        assert_eq!(account.rightmost_index, 6);
    }

    #[test]
    fn test_snapshot_view() {
        let tree = Address::new([7u8; 32]);
        let data = encode_for_test(4, 2, 1, [1u8; 32], 11, 12);
        let snapshot = TreeAccount::parse(&data).unwrap().snapshot(tree);
        assert_eq!(snapshot.tree, tree);
        assert_eq!(snapshot.depth, 4);
        assert_eq!(snapshot.size, 11);
        assert_eq!(snapshot.sequence, 12);
        assert_eq!(snapshot.root, [1u8; 32]);
    }

    #[test]
    fn test_trailing_canopy_ignored() {
        let mut data = encode_for_test(3, 8, 0, [2u8; 32], 1, 1);
        data.extend_from_slice(&[0xee; 32 * 6]);
        assert_eq!(TreeAccount::parse(&data).unwrap().root, [2u8; 32]);
    }

    #[test]
    fn test_rejects_wrong_type() {
        let mut data = encode_for_test(3, 8, 0, [0u8; 32], 0, 0);
        data[0] = 0;
        assert_eq!(
            TreeAccount::parse(&data).unwrap_err().kind(),
            ErrorKind::InvalidAccount
        );
    }

    #[test]
    fn test_rejects_unknown_header_version() {
        let mut data = encode_for_test(3, 8, 0, [0u8; 32], 0, 0);
        data[1] = 1;
        assert!(TreeAccount::parse(&data).is_err());
    }

    #[test]
    fn test_rejects_truncated() {
        let data = encode_for_test(5, 4, 0, [0u8; 32], 0, 0);
        let err = TreeAccount::parse(&data[..data.len() - 1]).unwrap_err();
        assert!(err.to_string().contains("needs"));
        assert!(TreeAccount::parse(&[1, 0, 0]).is_err());
    }

    #[test]
    fn test_rejects_active_index_outside_buffer() {
        let mut data = encode_for_test(3, 4, 0, [0u8; 32], 0, 0);
        data[64..72].copy_from_slice(&4u64.to_le_bytes());
        assert!(TreeAccount::parse(&data).is_err());
    }

    #[test]
    fn test_rejects_depth_out_of_range() {
        let mut data = encode_for_test(3, 4, 0, [0u8; 32], 0, 0);
        data[6..10].copy_from_slice(&0u32.to_le_bytes());
        assert!(TreeAccount::parse(&data).is_err());
        data[6..10].copy_from_slice(&31u32.to_le_bytes());
        assert!(TreeAccount::parse(&data).is_err());
    }
}
