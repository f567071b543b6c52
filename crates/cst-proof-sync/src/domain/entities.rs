//! # Domain Entities
//!
//! Proofs, leaf schemas and the Index Service records they are built from.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::{Hash, ProofSyncError};
use super::value_objects::{decode_hash, Address, LeafIdentifier, TreeAddress};

/// A syntactically complete inclusion proof.
///
/// Only meaningful relative to `root`, the value it was fetched against.
/// The tree may have moved on since.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    /// Root the path hashes up to.
    pub root: Hash,
    /// Leaf value being proven.
    pub leaf: Hash,
    /// Position of the leaf, `0 <= leaf_index < 2^depth`.
    pub leaf_index: u64,
    /// Sibling path, index 0 nearest the leaf.
    pub path: Vec<Hash>,
    /// Tree the proof was fetched for.
    pub tree_id: TreeAddress,
}

impl InclusionProof {
    /// Depth implied by the path length.
    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

/// Proof as returned by the Index Service.
///
/// Every field is optional and path entries may be `null` or `""`, so that a
/// partial response can be classified instead of failing to decode.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAssetProof {
    /// Base58 root.
    #[serde(default)]
    pub root: Option<String>,
    /// Base58 sibling path.
    #[serde(default)]
    pub proof: Option<Vec<Option<String>>>,
    /// 1-rooted heap index of the leaf in the full tree.
    #[serde(default)]
    pub node_index: Option<u64>,
    /// Base58 leaf value.
    #[serde(default)]
    pub leaf: Option<String>,
    /// Base58 tree address.
    #[serde(default)]
    pub tree_id: Option<String>,
}

/// Result of classifying a [`RawAssetProof`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProofShape {
    /// Every field present, every path entry non-blank.
    Complete(InclusionProof),
    /// Some path entries are blank.
    PartiallyEmpty {
        /// Blank positions, in path order.
        missing: Vec<usize>,
        /// Path length as returned.
        depth: usize,
    },
    /// No usable root or path at all.
    EmptyRoot,
}

impl ProofShape {
    /// Whether the proof can be handed to the verifier.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Complete(_) => "complete",
            Self::PartiallyEmpty { .. } => "partially_empty",
            Self::EmptyRoot => "empty_root",
        }
    }
}

/// Leaf layout version written by the ledger program.
pub const LEAF_SCHEMA_V1: u8 = 1;

/// Fields hashed into a compressed asset leaf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafSchema {
    /// Asset identifier (derived from tree and nonce).
    pub id: LeafIdentifier,
    /// Current owner.
    pub owner: Address,
    /// Current delegate, equal to owner when none is set.
    pub delegate: Address,
    /// Leaf nonce, which is also the leaf index at mint time.
    pub nonce: u64,
    /// Hash of the asset metadata.
    pub data_hash: Hash,
    /// Hash of the creator list.
    pub creator_hash: Hash,
}

impl LeafSchema {
    /// Bytes hashed to produce the leaf value.
    pub fn preimage(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + 32 * 5 + 8);
        bytes.push(LEAF_SCHEMA_V1);
        bytes.extend_from_slice(self.id.as_bytes());
        bytes.extend_from_slice(self.owner.as_bytes());
        bytes.extend_from_slice(self.delegate.as_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes.extend_from_slice(&self.data_hash);
        bytes.extend_from_slice(&self.creator_hash);
        bytes
    }

    /// Rebuild the leaf schema from an Index Service asset record.
    pub fn from_record(record: &AssetRecord) -> Result<Self, ProofSyncError> {
        let compression = record
            .compression
            .as_ref()
            .ok_or_else(|| {
                ProofSyncError::Decode(format!("asset {} has no compression", record.id))
            })?;
        let ownership = record
            .ownership
            .as_ref()
            .ok_or_else(|| {
                ProofSyncError::Decode(format!("asset {} has no ownership", record.id))
            })?;

        let delegate = match ownership.delegate.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text.parse()?,
            _ => ownership.owner,
        };

        Ok(Self {
            id: record.id,
            owner: ownership.owner,
            delegate,
            nonce: compression.leaf_id,
            data_hash: decode_hash(compression.data_hash.trim())?,
            creator_hash: decode_hash(compression.creator_hash.trim())?,
        })
    }
}

/// Subset of the Index Service asset record used for leaf recomputation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Asset identifier.
    pub id: LeafIdentifier,
    /// Compression details, absent for uncompressed assets.
    #[serde(default)]
    pub compression: Option<AssetCompression>,
    /// Ownership details.
    #[serde(default)]
    pub ownership: Option<AssetOwnership>,
    /// Group memberships (collection etc).
    #[serde(default)]
    pub grouping: Vec<AssetGroup>,
}

/// Compression block of an asset record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetCompression {
    /// Base58 data hash (the index pads some values with whitespace).
    pub data_hash: String,
    /// Base58 creator hash.
    pub creator_hash: String,
    /// Tree holding the leaf.
    pub tree: TreeAddress,
    /// Leaf nonce.
    pub leaf_id: u64,
    /// Sequence number of the last change.
    #[serde(default)]
    pub seq: u64,
}

/// Ownership block of an asset record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetOwnership {
    /// Owner address.
    pub owner: Address,
    /// Delegate, if any.
    #[serde(default)]
    pub delegate: Option<String>,
}

/// One group membership.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetGroup {
    /// Group kind, e.g. `collection`.
    pub group_key: String,
    /// Group value, e.g. the collection address.
    pub group_value: String,
}

/// Sort key for keyset pagination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Sort by asset id.
    #[default]
    Id,
    /// Sort by creation.
    Created,
    /// Sort by last update.
    Updated,
}

/// Sort direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// `sortBy` parameter of a search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortBy {
    /// Field to sort by.
    pub sort_by: SortKey,
    /// Direction.
    pub sort_direction: SortDirection,
}

/// Named parameters of a `searchAssets` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    /// `[group_key, group_value]`.
    pub grouping: (String, String),
    /// Page size.
    pub limit: usize,
    /// Exclusive lower bound on id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Address>,
    /// Exclusive upper bound on id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Address>,
    /// Ordering, ascending by id for keyset paging.
    pub sort_by: SortBy,
}

impl SearchQuery {
    /// Keyset page of a group, ascending by id, bounded by `(after, before)`.
    /// `None` leaves that side open.
    pub fn group_page(
        key: impl Into<String>,
        value: impl Into<String>,
        limit: usize,
        after: Option<Address>,
        before: Option<Address>,
    ) -> Self {
        Self {
            grouping: (key.into(), value.into()),
            limit,
            after,
            before,
            sort_by: SortBy::default(),
        }
    }
}

/// Parameters of a `get_assets_by_owner` call.
///
/// The method takes positional parameters
/// `[owner, sortBy, limit, page, before, after]`; keyset paging leaves
/// `page` null.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnerQuery {
    /// Owner whose assets are listed.
    pub owner: Address,
    /// Page size.
    pub limit: usize,
    /// Exclusive lower bound on id.
    pub after: Option<Address>,
    /// Exclusive upper bound on id.
    pub before: Option<Address>,
    /// Ordering, ascending by id for keyset paging.
    pub sort_by: SortBy,
}

impl OwnerQuery {
    /// Keyset page of `owner`'s assets, ascending by id.
    pub fn page(
        owner: Address,
        limit: usize,
        after: Option<Address>,
        before: Option<Address>,
    ) -> Self {
        Self {
            owner,
            limit,
            after,
            before,
            sort_by: SortBy::default(),
        }
    }

    /// Positional JSON-RPC parameters.
    pub fn to_params(&self) -> Value {
        let bound = |b: Option<Address>| b.map_or(Value::Null, |a| Value::String(a.to_string()));
        Value::Array(vec![
            Value::String(self.owner.to_string()),
            serde_json::to_value(self.sort_by).unwrap_or(Value::Null),
            Value::from(self.limit),
            Value::Null,
            bound(self.before),
            bound(self.after),
        ])
    }
}

/// One item of a search page. Only the id is interpreted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetItem {
    /// Asset id, used as the next cursor.
    pub id: Address,
    /// Remaining fields, passed through untouched.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl AssetItem {
    /// Item carrying nothing but its id.
    pub fn bare(id: Address) -> Self {
        Self { id, rest: Map::new() }
    }
}

/// One page of a search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetPage<T = AssetItem> {
    /// Count reported by the index (items in this page).
    #[serde(default)]
    pub total: u64,
    /// Limit echoed by the index.
    #[serde(default)]
    pub limit: u64,
    /// Items in ascending id order.
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> Default for AssetPage<T> {
    fn default() -> Self {
        Self {
            total: 0,
            limit: 0,
            items: Vec::new(),
        }
    }
}

/// Anything that exposes a keyset cursor.
pub trait Keyed {
    /// Identifier to continue paging after.
    fn key(&self) -> Address;
}

impl Keyed for AssetItem {
    fn key(&self) -> Address {
        self.id
    }
}

impl Keyed for Address {
    fn key(&self) -> Address {
        *self
    }
}
