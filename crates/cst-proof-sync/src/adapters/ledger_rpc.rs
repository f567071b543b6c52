//! Ledger JSON-RPC adapter.
//!
//! Reads the tree account with `getAccountInfo` and decodes it locally, so
//! root, depth and size always come from the same slot.

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::transport::JsonRpcTransport;
use super::tree_account::TreeAccount;
use crate::config::RpcConfig;
use crate::domain::{
    Hash, ProofSyncError, TreeAddress, TreeSnapshot, ACCOUNT_COMPRESSION_PROGRAM_ID,
};
use crate::ports::outbound::LedgerClient;

#[derive(Debug, Deserialize)]
struct AccountInfoResult {
    value: Option<AccountInfo>,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    /// `[payload, encoding]`
    data: (String, String),
    owner: String,
}

/// Ledger reached over JSON-RPC.
#[derive(Clone, Debug)]
pub struct RpcLedgerClient {
    transport: JsonRpcTransport,
    commitment: String,
}

impl RpcLedgerClient {
    /// Client for the ledger endpoint in `config`.
    pub fn new(config: &RpcConfig) -> Result<Self, ProofSyncError> {
        let transport = JsonRpcTransport::new(
            config.ledger_url.clone(),
            config.request_timeout_ms,
            config.retry.clone(),
        )?;
        Ok(Self {
            transport,
            commitment: config.commitment.clone(),
        })
    }

    /// Fetch and decode the tree account.
    pub async fn tree_account(&self, tree: &TreeAddress) -> Result<TreeAccount, ProofSyncError> {
        let result: AccountInfoResult = self
            .transport
            .call(
                "getAccountInfo",
                json!([
                    tree.to_string(),
                    { "encoding": "base64", "commitment": self.commitment },
                ]),
            )
            .await?;

        let info = result
            .value
            .ok_or_else(|| ProofSyncError::InvalidAccount(format!("{tree} does not exist")))?;

        if info.owner != ACCOUNT_COMPRESSION_PROGRAM_ID {
            return Err(ProofSyncError::InvalidAccount(format!(
                "{tree} is owned by {}",
                info.owner
            )));
        }
        let (payload, encoding) = info.data;
        if encoding != "base64" {
            return Err(ProofSyncError::Decode(format!("account encoding {encoding}")));
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| ProofSyncError::Decode(e.to_string()))?;

        let account = TreeAccount::parse(&bytes)?;
        debug!(
            tree = %tree,
            depth = account.max_depth,
            size = account.rightmost_index,
            sequence = account.sequence_number,
            "[cst] Decoded tree account"
        );
        Ok(account)
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn get_tree_root(&self, tree: &TreeAddress) -> Result<Hash, ProofSyncError> {
        Ok(self.tree_account(tree).await?.root)
    }

    async fn get_tree_depth(&self, tree: &TreeAddress) -> Result<u32, ProofSyncError> {
        Ok(self.tree_account(tree).await?.max_depth)
    }

    async fn get_tree_size(&self, tree: &TreeAddress) -> Result<u64, ProofSyncError> {
        Ok(u64::from(self.tree_account(tree).await?.rightmost_index))
    }

    async fn get_tree_snapshot(&self, tree: &TreeAddress) -> Result<TreeSnapshot, ProofSyncError> {
        Ok(self.tree_account(tree).await?.snapshot(*tree))
    }
}
