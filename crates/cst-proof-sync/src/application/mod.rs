//! # Application Module
//!
//! Application services orchestrating the domain and outbound ports.

pub mod scanner;
pub mod service;

pub use scanner::{
    scan_partitions, verify_batch, verify_item, verify_leaf_range, ItemFailure, PartitionScan,
    ScanFailure, ScanOptions, ScanReport, VerificationOutcome, VerificationReport, VerifyItem,
    VerifyOptions,
};
pub use service::ProofSyncService;
