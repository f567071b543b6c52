//! # Runtime Configuration
//!
//! Everything the runtime needs, read from the environment.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CST_INDEX_URL` | required | Index Service JSON-RPC endpoint |
//! | `CST_LEDGER_URL` | `CST_INDEX_URL` | Ledger JSON-RPC endpoint |
//! | `CST_MODE` | `verify-tree` | `verify-tree`, `scan-group` or `scan-owner` |
//! | `CST_TREE` | | Tree address (verify-tree) |
//! | `CST_GROUP_KEY` | `collection` | Group key (scan-group) |
//! | `CST_GROUP_VALUE` | | Group value (scan-group) |
//! | `CST_OWNER` | | Owner address (scan-owner) |
//! | `CST_CONCURRENCY` | `50` | Requests in flight per batch |
//! | `CST_PARTITIONS` | `20` | Identifier space partitions |
//! | `CST_PAGE_LIMIT` | `1000` | Items per page |
//! | `CST_INCOMPLETE_PROOFS` | `skip` | `skip` or `surface` |
//! | `CST_COMMITMENT` | `confirmed` | Ledger read commitment |
//! | `CST_MAX_RETRIES` | `3` | Retries per request |
//! | `CST_METRICS_FILE` | | Write Prometheus text here at exit instead of logging it |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use cst_proof_sync::{Address, IncompleteProofPolicy, ProofSyncConfig, RpcConfig, TreeAddress};
use thiserror::Error;

/// What one run does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Verify every occupied leaf of a tree.
    VerifyTree {
        /// Tree to verify.
        tree: TreeAddress,
    },
    /// Enumerate one group.
    ScanGroup {
        /// Group key, e.g. `collection`.
        key: String,
        /// Group value.
        value: String,
    },
    /// Enumerate the assets of one owner.
    ScanOwner {
        /// Owner address.
        owner: Address,
    },
}

impl Mode {
    /// Metric and log label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::VerifyTree { .. } => "verify-tree",
            Self::ScanGroup { .. } => "scan-group",
            Self::ScanOwner { .. } => "scan-owner",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VerifyTree { tree } => write!(f, "verify-tree {tree}"),
            Self::ScanGroup { key, value } => write!(f, "scan-group {key}={value}"),
            Self::ScanOwner { owner } => write!(f, "scan-owner {owner}"),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("{0} must be set")]
    Missing(&'static str),

    /// A variable did not parse.
    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        /// Variable name
        name: &'static str,
        /// Raw value
        value: String,
        /// Parser message
        reason: String,
    },
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// What to run.
    pub mode: Mode,
    /// Endpoints and retry policy.
    pub rpc: RpcConfig,
    /// Verification and scan tuning.
    pub sync: ProofSyncConfig,
    /// Prometheus textfile written at exit.
    pub metrics_file: Option<PathBuf>,
}

impl RuntimeConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let index_url = get("CST_INDEX_URL").ok_or(ConfigError::Missing("CST_INDEX_URL"))?;
        let mut rpc = RpcConfig {
            ledger_url: get("CST_LEDGER_URL").unwrap_or_else(|| index_url.clone()),
            index_url,
            ..RpcConfig::default()
        };
        if let Some(commitment) = get("CST_COMMITMENT") {
            rpc.commitment = commitment;
        }
        if let Some(retries) = parse_opt(&get, "CST_MAX_RETRIES")? {
            rpc.retry.max_retries = retries;
        }

        let mut sync = ProofSyncConfig::default();
        if let Some(limit) = parse_opt(&get, "CST_CONCURRENCY")? {
            sync.concurrency_limit = limit;
        }
        if let Some(count) = parse_opt(&get, "CST_PARTITIONS")? {
            sync.partition_count = count;
        }
        if let Some(limit) = parse_opt(&get, "CST_PAGE_LIMIT")? {
            sync.page_limit = limit;
        }
        if let Some(policy) = parse_opt::<IncompleteProofPolicy>(&get, "CST_INCOMPLETE_PROOFS")? {
            sync.incomplete_proof_policy = policy;
        }

        let mode = match get("CST_MODE").as_deref().unwrap_or("verify-tree") {
            "verify-tree" => Mode::VerifyTree {
                tree: parse_opt::<Address>(&get, "CST_TREE")?
                    .ok_or(ConfigError::Missing("CST_TREE"))?,
            },
            "scan-group" => Mode::ScanGroup {
                key: get("CST_GROUP_KEY").unwrap_or_else(|| "collection".to_string()),
                value: get("CST_GROUP_VALUE").ok_or(ConfigError::Missing("CST_GROUP_VALUE"))?,
            },
            "scan-owner" => Mode::ScanOwner {
                owner: parse_opt::<Address>(&get, "CST_OWNER")?
                    .ok_or(ConfigError::Missing("CST_OWNER"))?,
            },
            other => {
                return Err(ConfigError::Invalid {
                    name: "CST_MODE",
                    value: other.to_string(),
                    reason: "expected verify-tree, scan-group or scan-owner".to_string(),
                })
            }
        };
        let metrics_file = get("CST_METRICS_FILE").map(PathBuf::from);

        let config = Self {
            mode,
            rpc,
            sync,
            metrics_file,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.partition_count == 0 {
            return Err(ConfigError::Invalid {
                name: "CST_PARTITIONS",
                value: "0".to_string(),
                reason: "at least one partition is required".to_string(),
            });
        }
        if self.sync.page_limit == 0 {
            return Err(ConfigError::Invalid {
                name: "CST_PAGE_LIMIT",
                value: "0".to_string(),
                reason: "pages must hold at least one item".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_opt<T>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    get(name)
        .map(|value| {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|e| ConfigError::Invalid {
                name,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TREE: &str = "11111111111111111111111111111111";

    fn load(pairs: &[(&str, &str)]) -> Result<RuntimeConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RuntimeConfig::from_lookup(move |key| map.get(key).cloned())
    }

    #[test]
    fn test_verify_tree_defaults() {
        let config = load(&[("CST_INDEX_URL", "http://index"), ("CST_TREE", TREE)]).unwrap();
        assert_eq!(
            config.mode,
            Mode::VerifyTree {
                tree: Address::MIN
            }
        );
        assert_eq!(config.rpc.ledger_url, "http://index");
        assert_eq!(config.sync.concurrency_limit, 50);
        assert_eq!(config.sync.partition_count, 20);
        assert_eq!(config.sync.page_limit, 1000);
        assert_eq!(
            config.sync.incomplete_proof_policy,
            IncompleteProofPolicy::Skip
        );
        assert!(config.metrics_file.is_none());
    }

    #[test]
    fn test_scan_owner_mode() {
        let config = load(&[
            ("CST_INDEX_URL", "http://index"),
            ("CST_MODE", "scan-owner"),
            ("CST_OWNER", TREE),
            ("CST_METRICS_FILE", "/var/lib/node_exporter/cst.prom"),
        ])
        .unwrap();
        assert_eq!(config.mode, Mode::ScanOwner { owner: Address::MIN });
        assert_eq!(config.mode.label(), "scan-owner");
        assert_eq!(
            config.metrics_file,
            Some(PathBuf::from("/var/lib/node_exporter/cst.prom"))
        );

        assert_eq!(
            load(&[("CST_INDEX_URL", "http://index"), ("CST_MODE", "scan-owner")]),
            Err(ConfigError::Missing("CST_OWNER"))
        );
    }

    #[test]
    fn test_scan_group_overrides() {
        let config = load(&[
            ("CST_INDEX_URL", "http://index"),
            ("CST_LEDGER_URL", "http://ledger"),
            ("CST_MODE", "scan-group"),
            ("CST_GROUP_VALUE", "J1S9H3QjnRtBbbuD4HjPV6RpRhwuk4zKbxsnCHuTgh9w"),
            ("CST_CONCURRENCY", "8"),
            ("CST_PARTITIONS", "64"),
            ("CST_PAGE_LIMIT", "500"),
            ("CST_INCOMPLETE_PROOFS", "surface"),
        ])
        .unwrap();
        assert_eq!(config.mode.label(), "scan-group");
        assert_eq!(config.rpc.ledger_url, "http://ledger");
        assert_eq!(config.sync.concurrency_limit, 8);
        assert_eq!(config.sync.partition_count, 64);
        assert_eq!(config.sync.page_limit, 500);
        assert_eq!(
            config.sync.incomplete_proof_policy,
            IncompleteProofPolicy::Surface
        );
        match config.mode {
            Mode::ScanGroup { key, .. } => assert_eq!(key, "collection"),
            other => panic!("unexpected mode {other}"),
        }
    }

    #[test]
    fn test_missing_values() {
        assert_eq!(load(&[]), Err(ConfigError::Missing("CST_INDEX_URL")));
        assert_eq!(
            load(&[("CST_INDEX_URL", "http://index")]),
            Err(ConfigError::Missing("CST_TREE"))
        );
        assert_eq!(
            load(&[("CST_INDEX_URL", "http://index"), ("CST_MODE", "scan-group")]),
            Err(ConfigError::Missing("CST_GROUP_VALUE"))
        );
    }

    #[test]
    fn test_invalid_values() {
        let err = load(&[
            ("CST_INDEX_URL", "http://index"),
            ("CST_TREE", TREE),
            ("CST_PARTITIONS", "many"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "CST_PARTITIONS", .. }));

        let err = load(&[
            ("CST_INDEX_URL", "http://index"),
            ("CST_TREE", TREE),
            ("CST_PARTITIONS", "0"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("at least one partition"));

        let err = load(&[("CST_INDEX_URL", "http://index"), ("CST_MODE", "replay")]).unwrap_err();
        assert!(err.to_string().contains("CST_MODE"));

        let err = load(&[("CST_INDEX_URL", "http://index"), ("CST_TREE", "0OIl")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "CST_TREE", .. }));
    }
}
