//! # Leaf Identifier Derivation
//!
//! Program-derived addresses as the ledger computes them:
//!
//! ```text
//! candidate = sha256(seed_0 || ... || seed_n || [bump] || program_id || "ProgramDerivedAddress")
//! ```
//!
//! A candidate is usable only if it is *not* a valid ed25519 point, so that
//! no private key can exist for it. The search walks `bump` from 255 down to
//! 1 and keeps the first usable candidate. Identifiers must match the
//! ledger's bit for bit, otherwise proofs silently stop lining up with assets.

use ed25519_dalek::VerifyingKey;
use sha2::{Digest, Sha256};

use crate::domain::{
    invariant_seeds, Address, Hash, LeafIdentifier, ProofSyncError, TreeAddress, ASSET_SEED,
    BUBBLEGUM_PROGRAM_ID, MAX_SEEDS, PDA_MARKER,
};

/// Whether `bytes` decompress to a point on the ed25519 curve.
pub fn is_on_curve(bytes: &Hash) -> bool {
    VerifyingKey::from_bytes(bytes).is_ok()
}

fn candidate(seeds: &[&[u8]], bump: Option<u8>, program_id: &Address) -> Hash {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    if let Some(bump) = bump {
        hasher.update([bump]);
    }
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);
    let mut output = [0u8; 32];
    output.copy_from_slice(&hasher.finalize());
    output
}

/// Address for a full seed list (bump included).
///
/// # Errors
/// `InvalidSeeds` if the seeds break the ledger limits or hash to a curve point.
pub fn create_program_address(
    seeds: &[&[u8]],
    program_id: &Address,
) -> Result<Address, ProofSyncError> {
    invariant_seeds(seeds)?;
    let hash = candidate(seeds, None, program_id);
    if is_on_curve(&hash) {
        return Err(ProofSyncError::InvalidSeeds(
            "derived address lies on the ed25519 curve".to_string(),
        ));
    }
    Ok(Address::new(hash))
}

/// Bump search with a caller-supplied rejection predicate.
///
/// # Errors
/// - `InvalidSeeds` if there is no room for the bump seed or a seed is too long
/// - `DerivationExhausted` if every bump from 255 to 1 is rejected
pub fn find_program_address_with<F>(
    seeds: &[&[u8]],
    program_id: &Address,
    is_reserved: F,
) -> Result<(Address, u8), ProofSyncError>
where
    F: Fn(&Hash) -> bool,
{
    invariant_seeds(seeds)?;
    if seeds.len() >= MAX_SEEDS {
        return Err(ProofSyncError::InvalidSeeds(format!(
            "{} seeds leave no room for the bump",
            seeds.len()
        )));
    }

    for bump in (1..=u8::MAX).rev() {
        let hash = candidate(seeds, Some(bump), program_id);
        if !is_reserved(&hash) {
            return Ok((Address::new(hash), bump));
        }
    }
    Err(ProofSyncError::DerivationExhausted)
}

/// First off-curve address for `seeds`, with its bump.
pub fn find_program_address(
    seeds: &[&[u8]],
    program_id: &Address,
) -> Result<(Address, u8), ProofSyncError> {
    find_program_address_with(seeds, program_id, is_on_curve)
}

/// Derives leaf identifiers and tree-scoped addresses for one program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentifierDeriver {
    program_id: Address,
}

impl Default for IdentifierDeriver {
    fn default() -> Self {
        Self::new(BUBBLEGUM_PROGRAM_ID)
    }
}

impl IdentifierDeriver {
    /// Deriver for `program_id`.
    pub fn new(program_id: Address) -> Self {
        Self { program_id }
    }

    /// Program the addresses are derived under.
    pub fn program_id(&self) -> &Address {
        &self.program_id
    }

    /// Identifier of the asset at `leaf_index`, with its bump.
    pub fn derive_with_bump(
        &self,
        tree: &TreeAddress,
        leaf_index: u64,
    ) -> Result<(LeafIdentifier, u8), ProofSyncError> {
        let nonce = leaf_index.to_le_bytes();
        find_program_address(&[ASSET_SEED, tree.as_ref(), &nonce], &self.program_id)
    }

    /// Identifier of the asset at `leaf_index`.
    pub fn derive(
        &self,
        tree: &TreeAddress,
        leaf_index: u64,
    ) -> Result<LeafIdentifier, ProofSyncError> {
        self.derive_with_bump(tree, leaf_index).map(|(id, _)| id)
    }

    /// Identifiers for `range`, in order.
    pub fn derive_range(
        &self,
        tree: &TreeAddress,
        range: std::ops::Range<u64>,
    ) -> Result<Vec<(u64, LeafIdentifier)>, ProofSyncError> {
        range
            .map(|i| self.derive(tree, i).map(|id| (i, id)))
            .collect()
    }

    /// Tree config (authority) account, seeds `[tree]`.
    pub fn tree_authority(&self, tree: &TreeAddress) -> Result<(Address, u8), ProofSyncError> {
        find_program_address(&[tree.as_ref()], &self.program_id)
    }
}

/// Asset identifier under the default program.
pub fn derive_asset_id(
    tree: &TreeAddress,
    leaf_index: u64,
) -> Result<LeafIdentifier, ProofSyncError> {
    IdentifierDeriver::default().derive(tree, leaf_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn tree() -> TreeAddress {
        Address::new([7u8; 32])
    }

    #[test]
    fn test_known_asset_ids() {
        let deriver = IdentifierDeriver::default();
        let cases = [
            (0u64, "gPUs18eKDJ33U52bkDvoDEN9kahPpbZ9HtfhvMWZH1Q", 255u8),
            (1, "GdmgeU2QxnQ1Du7aDQZDfCpsS374D2S9LeMA1GV3UkpC", 253),
            (2, "DWcvnqBRGLA1n9KjyRhsbiLXeC7iVuxucPhSEv4dYbyB", 255),
            (3050, "7B9EvY6ZBEimzo1uuXn5hYBCXNFiSUJqaNs3dWbFqyed", 253),
        ];
        for (index, expected, bump) in cases {
            let (id, found) = deriver.derive_with_bump(&tree(), index).unwrap();
            assert_eq!(id.to_string(), expected, "leaf {index}");
            assert_eq!(found, bump, "leaf {index}");
        }
    }

    #[test]
    fn test_known_id_for_base58_tree() {
        let tree: TreeAddress = "FkiWasg2sef3t3iSHKxrtdfddtAcBTsPbX5sAF7NFTSi".parse().unwrap();
        let (id, bump) = IdentifierDeriver::default().derive_with_bump(&tree, 0).unwrap();
        assert_eq!(id.to_string(), "B2tjAavYDXg2xHnMcVgrbcBUa6T3NkotyzWJ5CqVxoR");
        assert_eq!(bump, 254);

        let (authority, bump) = IdentifierDeriver::default().tree_authority(&tree).unwrap();
        assert_eq!(authority.to_string(), "3RWLmVJX3P6n2hcaVUyU9uT95aYuQGwWJd8b8jDj3Uwn");
        assert_eq!(bump, 255);
    }

    #[test]
    fn test_derived_ids_are_off_curve() {
        for i in 0..16 {
            let id = derive_asset_id(&tree(), i).unwrap();
            assert!(!is_on_curve(id.as_bytes()));
        }
    }

    #[test]
    fn test_create_matches_find() {
        let nonce = 1u64.to_le_bytes();
        let (id, bump) =
            find_program_address(&[ASSET_SEED, tree().as_ref(), &nonce], &BUBBLEGUM_PROGRAM_ID)
                .unwrap();
        let created = create_program_address(
            &[ASSET_SEED, tree().as_ref(), &nonce, &[bump]],
            &BUBBLEGUM_PROGRAM_ID,
        )
        .unwrap();
        assert_eq!(created, id);
        // bump 255 for leaf 1 lands on the curve
        assert!(create_program_address(
            &[ASSET_SEED, tree().as_ref(), &nonce, &[255]],
            &BUBBLEGUM_PROGRAM_ID,
        )
        .is_err());
    }

    #[test]
    fn test_deterministic() {
        let deriver = IdentifierDeriver::default();
        assert_eq!(
            deriver.derive(&tree(), 42).unwrap(),
            deriver.derive(&tree(), 42).unwrap()
        );
    }

    #[test]
    fn test_no_collisions_over_sample() {
        let ids = IdentifierDeriver::default()
            .derive_range(&tree(), 0..2000)
            .unwrap();
        let unique: HashSet<_> = ids.iter().map(|(_, id)| *id).collect();
        assert_eq!(unique.len(), 2000);
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let result = find_program_address_with(&[b"x"], &BUBBLEGUM_PROGRAM_ID, |_| true);
        assert!(matches!(result, Err(ProofSyncError::DerivationExhausted)));
    }

    #[test]
    fn test_bump_search_visits_255_down_to_1() {
        let visited = std::cell::RefCell::new(Vec::new());
        let _ = find_program_address_with(&[b"x"], &BUBBLEGUM_PROGRAM_ID, |h| {
            visited.borrow_mut().push(*h);
            true
        });
        let visited = visited.into_inner();
        assert_eq!(visited.len(), 255);
        let first = create_program_address_unchecked(&[b"x", &[255]]);
        let last = create_program_address_unchecked(&[b"x", &[1]]);
        assert_eq!(visited[0], first);
        assert_eq!(visited[254], last);
    }

    fn create_program_address_unchecked(seeds: &[&[u8]]) -> Hash {
        candidate(seeds, None, &BUBBLEGUM_PROGRAM_ID)
    }

    #[test]
    fn test_seed_limits() {
        let too_long = [0u8; 33];
        assert!(matches!(
            find_program_address(&[&too_long], &BUBBLEGUM_PROGRAM_ID),
            Err(ProofSyncError::InvalidSeeds(_))
        ));
        let sixteen: Vec<&[u8]> = vec![&b"s"[..]; 16];
        assert!(matches!(
            find_program_address(&sixteen, &BUBBLEGUM_PROGRAM_ID),
            Err(ProofSyncError::InvalidSeeds(_))
        ));
    }
}
