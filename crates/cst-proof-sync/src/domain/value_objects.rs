//! # Domain Value Objects
//!
//! Immutable value types for compressed state tree sync.

use std::fmt;
use std::str::FromStr;

use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::errors::{Hash, ProofSyncError};

/// A 32-byte ledger address, rendered as base58.
///
/// Ordering is byte-lexicographic, which is the same as comparing the bytes
/// as a big-endian 256-bit integer. Keyset cursors and partition bounds rely
/// on that.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; 32]);

/// Address naming a specific tree instance.
pub type TreeAddress = Address;

/// Derived identifier of the logical item stored at a tree position.
pub type LeafIdentifier = Address;

impl Address {
    /// Byte length of every address.
    pub const LEN: usize = 32;

    /// Smallest address (all zero bytes).
    pub const MIN: Address = Address([0u8; 32]);

    /// Largest address (all 0xff bytes), i.e. `2^256 - 1`.
    pub const MAX: Address = Address([0xffu8; 32]);

    /// Wrap raw bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub const fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Interpret as a big-endian 256-bit integer.
    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// Big-endian encoding of a 256-bit integer.
    pub fn from_u256(value: U256) -> Self {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        Self(bytes)
    }

    /// Previous address, `None` for [`Address::MIN`].
    pub fn predecessor(&self) -> Option<Self> {
        self.to_u256().checked_sub(U256::one()).map(Self::from_u256)
    }

    /// Next address, `None` for [`Address::MAX`].
    pub fn successor(&self) -> Option<Self> {
        self.to_u256().checked_add(U256::one()).map(Self::from_u256)
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Address {
    type Error = ProofSyncError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| {
            ProofSyncError::InvalidAddress(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(array))
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = ProofSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s.trim())
            .into_vec()
            .map_err(|e| ProofSyncError::InvalidAddress(format!("{s}: {e}")))?;
        Self::try_from(bytes.as_slice()).map_err(|_| {
            ProofSyncError::InvalidAddress(format!("{s}: decodes to {} bytes", bytes.len()))
        })
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Decode a base58 node value (root, leaf, path entry, data hash).
pub fn decode_hash(text: &str) -> Result<Hash, ProofSyncError> {
    text.parse::<Address>().map(Address::to_bytes)
}

/// One contiguous slice of the 256-bit identifier space.
///
/// Every partition is half-open `[start, end)` except the last one of a
/// split, which is closed so that `2^256 - 1` is covered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Position of this partition in its split.
    pub index: usize,
    /// Inclusive lower bound.
    pub start: Address,
    /// Upper bound, exclusive unless `end_inclusive`.
    pub end: Address,
    /// Whether `end` itself belongs to this partition.
    pub end_inclusive: bool,
}

impl Partition {
    /// Whether `id` falls inside this partition.
    pub fn contains(&self, id: &Address) -> bool {
        if *id < self.start {
            return false;
        }
        if self.end_inclusive {
            *id <= self.end
        } else {
            *id < self.end
        }
    }

    /// Exclusive `after` bound of the first page, so that `start` itself is
    /// included. `None` means unbounded.
    pub fn first_cursor(&self) -> Option<Address> {
        self.start.predecessor()
    }

    /// Exclusive `before` bound for every page. `None` means unbounded.
    pub fn upper_bound(&self) -> Option<Address> {
        if self.end_inclusive {
            self.end.successor()
        } else {
            Some(self.end)
        }
    }

    /// Number of identifiers covered, saturating at `U256::MAX`.
    pub fn width(&self) -> U256 {
        let span = self.end.to_u256() - self.start.to_u256();
        if self.end_inclusive {
            span.saturating_add(U256::one())
        } else {
            span
        }
    }
}

/// Tree state read from the ledger at one point in time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    /// Tree the snapshot belongs to.
    pub tree: TreeAddress,
    /// Current root.
    pub root: Hash,
    /// Fixed depth of the tree.
    pub depth: u32,
    /// Number of occupied leaves.
    pub size: u64,
    /// Ledger sequence number of the last change, when known.
    pub sequence: u64,
}

impl TreeSnapshot {
    /// Leaf capacity (`2^depth`), saturating at `u64::MAX`.
    pub fn capacity(&self) -> u64 {
        1u64.checked_shl(self.depth).unwrap_or(u64::MAX)
    }
}
