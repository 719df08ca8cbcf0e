//! Gas price estimation, read once per routing invocation.

use {
    alloy::{primitives::U256, providers::Provider},
    anyhow::{Context as _, Result},
    async_trait::async_trait,
    ethrpc::Web3,
    tracing::instrument,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GasPriceEstimating: Send + Sync {
    /// Estimated gas price in wei for a transaction to confirm promptly.
    async fn estimate(&self) -> Result<U256>;
}

/// Estimates the gas price based on the node's EIP-1559 fee suggestion.
pub struct NativeGasPriceEstimator(Web3);

impl NativeGasPriceEstimator {
    pub fn new(web3: Web3) -> Self {
        Self(web3)
    }
}

#[async_trait]
impl GasPriceEstimating for NativeGasPriceEstimator {
    #[instrument(skip(self))]
    async fn estimate(&self) -> Result<U256> {
        let fees = self
            .0
            .provider
            .estimate_eip1559_fees()
            .await
            .context("could not estimate EIP 1559 fees")?;
        // The base fee only actually exists in a mined block; for cost
        // estimation the suggested maximum is the right upper bound.
        Ok(U256::from(fees.max_fee_per_gas))
    }
}
