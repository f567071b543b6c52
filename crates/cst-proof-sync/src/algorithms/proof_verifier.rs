//! # Inclusion Proof Verification
//!
//! Recomputes a root from a leaf, its index and a sibling path.
//!
//! # Algorithm
//!
//! 1. Start with the leaf as the current node
//! 2. For each path entry `i`, read bit `i` of the leaf index:
//!    - bit 0: current node is a left child, `node = H(node || path[i])`
//!    - bit 1: current node is a right child, `node = H(path[i] || node)`
//! 3. The final node must equal the root byte for byte
//!
//! Time O(depth), space O(1).

use super::hasher::{Keccak, NodeHasher};
use crate::domain::{
    invariant_leaf_index, invariant_path_depth, Hash, InclusionProof, ProofSyncError,
};

/// Root implied by `leaf` at `leaf_index` under `path`.
pub fn recompute_root<H: NodeHasher>(leaf: &Hash, leaf_index: u64, path: &[Hash]) -> Hash {
    path.iter().enumerate().fold(*leaf, |node, (i, sibling)| {
        let is_right = i < 64 && (leaf_index >> i) & 1 == 1;
        if is_right {
            H::combine(sibling, &node)
        } else {
            H::combine(&node, sibling)
        }
    })
}

/// Verify a complete proof with the ledger's hasher.
///
/// An empty path verifies only when `leaf == root`.
pub fn verify(proof: &InclusionProof) -> bool {
    verify_with::<Keccak>(proof)
}

/// Verify a complete proof with an arbitrary hasher.
pub fn verify_with<H: NodeHasher>(proof: &InclusionProof) -> bool {
    recompute_root::<H>(&proof.leaf, proof.leaf_index, &proof.path) == proof.root
}

/// Verify with shape checks, returning a typed failure.
///
/// # Errors
/// - `MalformedProof` if the path length differs from `expected_depth` or the
///   index does not fit the depth
/// - `RootMismatch` if the recomputed root differs from the proof's root
pub fn verify_checked(
    proof: &InclusionProof,
    expected_depth: Option<usize>,
) -> Result<(), ProofSyncError> {
    verify_checked_with::<Keccak>(proof, expected_depth)
}

/// [`verify_checked`] with an arbitrary hasher.
pub fn verify_checked_with<H: NodeHasher>(
    proof: &InclusionProof,
    expected_depth: Option<usize>,
) -> Result<(), ProofSyncError> {
    invariant_path_depth(proof.depth(), expected_depth.unwrap_or(proof.depth()))?;
    invariant_leaf_index(proof.leaf_index, proof.depth())?;

    let computed = recompute_root::<H>(&proof.leaf, proof.leaf_index, &proof.path);
    if computed != proof.root {
        return Err(ProofSyncError::RootMismatch {
            expected: proof.root,
            computed,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::hasher::combine;
    use crate::domain::Address;
    use proptest::prelude::*;

    /// Cheap order-sensitive hasher, bijective in each argument.
    struct Shuffle;

    impl NodeHasher for Shuffle {
        fn combine(left: &Hash, right: &Hash) -> Hash {
            let mut out = [0u8; 32];
            for (i, byte) in out.iter_mut().enumerate() {
                *byte = left[i].rotate_left(1) ^ right[31 - i];
            }
            out
        }
    }

    fn make_hash(n: u8) -> Hash {
        let mut h = [0u8; 32];
        h[0] = n;
        h
    }

    fn proof(root: Hash, leaf: Hash, leaf_index: u64, path: Vec<Hash>) -> InclusionProof {
        InclusionProof {
            root,
            leaf,
            leaf_index,
            path,
            tree_id: Address::default(),
        }
    }

    #[test]
    fn test_depth_one_left_child() {
        let leaf = make_hash(1);
        let sibling = make_hash(2);
        let root = combine(&leaf, &sibling);
        assert!(verify(&proof(root, leaf, 0, vec![sibling])));
    }

    #[test]
    fn test_depth_one_wrong_side_fails() {
        let leaf = make_hash(1);
        let sibling = make_hash(2);
        let root = combine(&leaf, &sibling);
        let p = proof(root, leaf, 1, vec![sibling]);
        assert!(!verify(&p));
        assert!(matches!(
            verify_checked(&p, Some(1)),
            Err(ProofSyncError::RootMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_path() {
        let leaf = make_hash(7);
        assert!(verify(&proof(leaf, leaf, 0, vec![])));
        assert!(!verify(&proof(make_hash(8), leaf, 0, vec![])));
    }

    #[test]
    fn test_depth_two_right_then_left() {
        // leaf sits at index 1: right child at level 0, left child at level 1
        let leaf = make_hash(1);
        let (s0, s1) = (make_hash(2), make_hash(3));
        let root = combine(&combine(&s0, &leaf), &s1);
        assert!(verify(&proof(root, leaf, 1, vec![s0, s1])));
        assert!(!verify(&proof(root, leaf, 3, vec![s0, s1])));
    }

    #[test]
    fn test_checked_rejects_wrong_depth() {
        let leaf = make_hash(1);
        let p = proof(leaf, leaf, 0, vec![make_hash(2)]);
        assert!(matches!(
            verify_checked(&p, Some(2)),
            Err(ProofSyncError::MalformedProof(_))
        ));
    }

    #[test]
    fn test_checked_rejects_oversized_index() {
        let leaf = make_hash(1);
        let sibling = make_hash(2);
        let root = combine(&leaf, &sibling);
        // bit 1 lies beyond a depth-1 path and would otherwise be ignored
        let p = proof(root, leaf, 2, vec![sibling]);
        assert!(verify(&p));
        assert!(matches!(
            verify_checked(&p, None),
            Err(ProofSyncError::MalformedProof(_))
        ));
    }

    fn arb_hash() -> impl Strategy<Value = Hash> {
        prop::array::uniform32(any::<u8>())
    }

    fn arb_proof() -> impl Strategy<Value = (Hash, u64, Vec<Hash>)> {
        (1usize..=24).prop_flat_map(|depth| {
            (
                arb_hash(),
                0u64..(1u64 << depth),
                prop::collection::vec(arb_hash(), depth),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_round_trip_and_perturbation(
            (leaf, index, path) in arb_proof(),
            pick in any::<prop::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let root = recompute_root::<Shuffle>(&leaf, index, &path);
            let mut p = proof(root, leaf, index, path);
            prop_assert!(verify_with::<Shuffle>(&p));
            prop_assert!(verify_checked_with::<Shuffle>(&p, Some(p.depth())).is_ok());

            let at = pick.index(p.path.len());
            p.path[at][0] ^= flip;
            prop_assert!(!verify_with::<Shuffle>(&p));
        }

        #[test]
        fn prop_flipping_one_index_bit_fails(
            (leaf, index, path) in arb_proof(),
            pick in any::<prop::sample::Index>(),
        ) {
            let root = recompute_root::<Keccak>(&leaf, index, &path);
            let bit = pick.index(path.len());
            let p = proof(root, leaf, index ^ (1u64 << bit), path);
            prop_assert!(!verify(&p));
        }
    }
}
