//! Index Service JSON-RPC adapter.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::transport::JsonRpcTransport;
use crate::config::RpcConfig;
use crate::domain::{
    AssetPage, AssetRecord, LeafIdentifier, OwnerQuery, ProofSyncError, RawAssetProof,
    SearchQuery,
};
use crate::ports::outbound::IndexService;

/// Index Service reached over JSON-RPC.
#[derive(Clone, Debug)]
pub struct RpcIndexService {
    transport: JsonRpcTransport,
}

impl RpcIndexService {
    /// Client for the index endpoint in `config`.
    pub fn new(config: &RpcConfig) -> Result<Self, ProofSyncError> {
        let transport = JsonRpcTransport::new(
            config.index_url.clone(),
            config.request_timeout_ms,
            config.retry.clone(),
        )?;
        Ok(Self { transport })
    }

    /// Client over an existing transport.
    pub fn with_transport(transport: JsonRpcTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl IndexService for RpcIndexService {
    async fn get_asset_proof(&self, id: &LeafIdentifier) -> Result<RawAssetProof, ProofSyncError> {
        debug!(id = %id, "[cst] get_asset_proof");
        self.transport
            .call("get_asset_proof", json!([id.to_string()]))
            .await
    }

    async fn search_assets(&self, query: &SearchQuery) -> Result<AssetPage, ProofSyncError> {
        let params =
            serde_json::to_value(query).map_err(|e| ProofSyncError::Decode(e.to_string()))?;
        let page: AssetPage = self.transport.call("searchAssets", params).await?;
        debug!(
            after = ?query.after,
            before = ?query.before,
            items = page.items.len(),
            "[cst] searchAssets page"
        );
        Ok(page)
    }

    async fn get_assets_by_owner(&self, query: &OwnerQuery) -> Result<AssetPage, ProofSyncError> {
        let page: AssetPage = self
            .transport
            .call("get_assets_by_owner", query.to_params())
            .await?;
        debug!(
            owner = %query.owner,
            after = ?query.after,
            before = ?query.before,
            items = page.items.len(),
            "[cst] get_assets_by_owner page"
        );
        Ok(page)
    }

    async fn get_asset(&self, id: &LeafIdentifier) -> Result<AssetRecord, ProofSyncError> {
        self.transport.call("get_asset", json!([id.to_string()])).await
    }
}
