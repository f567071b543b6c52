//! # Node Hashing
//!
//! The 2-to-1 compression function the concurrent Merkle tree is built with,
//! `keccak256(left || right)`, plus the leaf hash of a compressed asset.

use sha3::{Digest, Keccak256};

use crate::domain::{Hash, LeafSchema};

/// Order-sensitive 2-to-1 compression over 32-byte nodes.
pub trait NodeHasher {
    /// Parent of `left` and `right`.
    fn combine(left: &Hash, right: &Hash) -> Hash;
}

/// Production hasher used by the ledger program.
#[derive(Clone, Copy, Debug, Default)]
pub struct Keccak;

impl NodeHasher for Keccak {
    fn combine(left: &Hash, right: &Hash) -> Hash {
        hashv(&[left, right])
    }
}

/// Keccak-256 over the concatenation of `parts`.
pub fn hashv(parts: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut output = [0u8; 32];
    output.copy_from_slice(&hasher.finalize());
    output
}

/// `keccak256(left || right)`.
pub fn combine(left: &Hash, right: &Hash) -> Hash {
    Keccak::combine(left, right)
}

/// Leaf value of a compressed asset.
pub fn leaf_hash(schema: &LeafSchema) -> Hash {
    hashv(&[&schema.preimage()])
}
