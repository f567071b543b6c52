//! # Proof Classification
//!
//! Turns an Index Service proof response into a [`ProofShape`]. This is the
//! only place that looks for blank path entries; callers match on the shape.

use crate::domain::{
    decode_hash, invariant_path_depth, Address, Hash, InclusionProof, ProofShape,
    ProofSyncError, RawAssetProof,
};

fn is_blank(entry: &Option<String>) -> bool {
    entry.as_deref().map_or(true, |s| s.trim().is_empty())
}

fn decode_field(name: &str, text: &str) -> Result<Hash, ProofSyncError> {
    decode_hash(text.trim())
        .map_err(|e| ProofSyncError::MalformedProof(format!("{name}: {e}")))
}

/// Leaf index from the 1-rooted heap index the Index Service reports.
///
/// A depth `d` tree numbers its leaves `2^d ..= 2^(d+1) - 1`.
pub fn leaf_index_from_node_index(node_index: u64, depth: usize) -> Result<u64, ProofSyncError> {
    let first_leaf = 1u64.checked_shl(depth as u32).filter(|_| depth < 63).ok_or_else(|| {
        ProofSyncError::MalformedProof(format!("depth {depth} is too deep for a node index"))
    })?;
    if node_index < first_leaf || node_index >= first_leaf << 1 {
        return Err(ProofSyncError::MalformedProof(format!(
            "node index {node_index} is not a leaf of a depth {depth} tree"
        )));
    }
    Ok(node_index - first_leaf)
}

/// Classify a raw proof.
///
/// - missing or blank root, missing path, empty path, or a path of only
///   blank entries: [`ProofShape::EmptyRoot`]
/// - some blank entries: [`ProofShape::PartiallyEmpty`]
/// - otherwise: [`ProofShape::Complete`]
///
/// A zero-length path is complete only when `expected_depth` is `Some(0)`.
///
/// # Errors
/// `MalformedProof` when a complete-looking proof has the wrong depth, a bad
/// `node_index`, a missing leaf or tree, or entries that are not base58.
pub fn classify_proof(
    raw: &RawAssetProof,
    expected_depth: Option<usize>,
) -> Result<ProofShape, ProofSyncError> {
    let root = match raw.root.as_deref().map(str::trim) {
        Some(root) if !root.is_empty() => root,
        _ => return Ok(ProofShape::EmptyRoot),
    };
    let entries = match raw.proof.as_ref() {
        Some(entries) if !entries.is_empty() || expected_depth == Some(0) => entries,
        _ => return Ok(ProofShape::EmptyRoot),
    };

    let missing: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| is_blank(entry))
        .map(|(i, _)| i)
        .collect();
    if !entries.is_empty() && missing.len() == entries.len() {
        return Ok(ProofShape::EmptyRoot);
    }
    if !missing.is_empty() {
        return Ok(ProofShape::PartiallyEmpty {
            missing,
            depth: entries.len(),
        });
    }

    let depth = entries.len();
    invariant_path_depth(depth, expected_depth.unwrap_or(depth))?;

    let node_index = raw
        .node_index
        .ok_or_else(|| ProofSyncError::MalformedProof("missing node_index".to_string()))?;
    let leaf = raw
        .leaf
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ProofSyncError::MalformedProof("missing leaf".to_string()))?;
    let tree_id = raw
        .tree_id
        .as_deref()
        .ok_or_else(|| ProofSyncError::MalformedProof("missing tree_id".to_string()))?;

    let path = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            decode_field(&format!("proof[{i}]"), entry.as_deref().unwrap_or_default())
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ProofShape::Complete(InclusionProof {
        root: decode_field("root", root)?,
        leaf: decode_field("leaf", leaf)?,
        leaf_index: leaf_index_from_node_index(node_index, depth)?,
        path,
        tree_id: tree_id
            .trim()
            .parse::<Address>()
            .map_err(|e| ProofSyncError::MalformedProof(format!("tree_id: {e}")))?,
    }))
}
