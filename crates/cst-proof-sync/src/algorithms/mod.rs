//! # Algorithms Module
//!
//! Pure, synchronous algorithms: node hashing, proof verification and
//! classification, identifier derivation, range partitioning.

pub mod hasher;
pub mod identifier;
pub mod partition;
pub mod proof_shape;
pub mod proof_verifier;

pub use hasher::{combine, hashv, leaf_hash, Keccak, NodeHasher};
pub use identifier::{
    create_program_address, derive_asset_id, find_program_address, find_program_address_with,
    is_on_curve, IdentifierDeriver,
};
pub use partition::{partition, partition_space};
pub use proof_shape::{classify_proof, leaf_index_from_node_index};
pub use proof_verifier::{
    recompute_root, verify, verify_checked, verify_checked_with, verify_with,
};
