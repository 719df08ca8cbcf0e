//! Access to the node's current block number.

use {
    crate::Web3,
    alloy::providers::Provider,
    anyhow::{Context as _, Result},
    async_trait::async_trait,
};

#[async_trait]
pub trait BlockFetching: Send + Sync {
    async fn current_block(&self) -> Result<u64>;
}

pub struct NodeBlockFetcher(Web3);

impl NodeBlockFetcher {
    pub fn new(web3: Web3) -> Self {
        Self(web3)
    }
}

#[async_trait]
impl BlockFetching for NodeBlockFetcher {
    async fn current_block(&self) -> Result<u64> {
        self.0
            .provider
            .get_block_number()
            .await
            .context("failed to fetch current block")
    }
}
