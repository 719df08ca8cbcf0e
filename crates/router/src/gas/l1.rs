//! Rollup L1 data fee estimation.
//!
//! Optimistic rollups charge every L2 transaction for posting its data to the
//! settlement layer. The fee depends on the calldata size, so the winning
//! plan gets re-adjusted with a fee computed over a representative encoding
//! of its routes.

use {
    crate::plan::RouteWithQuote,
    alloy::{
        eips::BlockId,
        primitives::{Bytes, U256},
    },
    anyhow::{Context as _, Result},
    async_trait::async_trait,
    contracts::{ArbGasInfo, GasPriceOracle},
    ethrpc::Web3,
    model::Chain,
    std::sync::Arc,
};

/// Fixed per-transaction overhead bytes (signature, nonce, gas fields).
const TX_OVERHEAD_BYTES: usize = 140;
/// Calldata bytes per split beyond the packed path (amounts, deadlines).
const BYTES_PER_SPLIT: usize = 96;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait L2GasDataProviding: Send + Sync {
    /// The L1 data fee in wei for posting a transaction with the given
    /// calldata.
    async fn l1_data_fee(&self, calldata: Bytes, block: Option<u64>) -> Result<U256>;
}

/// Reads the fee from the gas price oracle predeploy.
pub struct OptimismGasDataProvider {
    oracle: GasPriceOracle::Instance,
}

#[async_trait]
impl L2GasDataProviding for OptimismGasDataProvider {
    async fn l1_data_fee(&self, calldata: Bytes, block: Option<u64>) -> Result<U256> {
        let call = self.oracle.getL1Fee(calldata);
        let call = match block {
            Some(block) => call.block(BlockId::number(block)),
            None => call,
        };
        call.call().await.context("failed to fetch L1 fee")
    }
}

/// Derives the fee from the per-calldata-byte price of the gas info
/// precompile.
pub struct ArbitrumGasDataProvider {
    info: ArbGasInfo::Instance,
}

#[async_trait]
impl L2GasDataProviding for ArbitrumGasDataProvider {
    async fn l1_data_fee(&self, calldata: Bytes, block: Option<u64>) -> Result<U256> {
        let call = self.info.getPricesInWei();
        let call = match block {
            Some(block) => call.block(BlockId::number(block)),
            None => call,
        };
        let prices = call.call().await.context("failed to fetch gas prices")?;
        Ok(prices.perL1CalldataByte * U256::from(calldata.len() + TX_OVERHEAD_BYTES))
    }
}

/// The L1 data fee provider for the chain, `None` for chains without an L1
/// data fee.
pub fn for_chain(web3: &Web3, chain: Chain) -> Option<Arc<dyn L2GasDataProviding>> {
    if !chain.has_l1_fee() {
        return None;
    }
    match chain {
        Chain::Optimism => Some(Arc::new(OptimismGasDataProvider {
            oracle: GasPriceOracle::deployed(&web3.provider, chain.id()).ok()?,
        })),
        Chain::ArbitrumOne => Some(Arc::new(ArbitrumGasDataProvider {
            info: ArbGasInfo::deployed(&web3.provider, chain.id()).ok()?,
        })),
        _ => None,
    }
}

/// A stand-in for the final transaction calldata, proportional to what the
/// downstream encoder will produce: every split contributes its packed token
/// path plus fixed amount fields.
pub fn representative_calldata(routes: &[RouteWithQuote]) -> Bytes {
    let mut data = vec![0xff; TX_OVERHEAD_BYTES];
    for split in routes {
        for token in split.route.token_path() {
            data.extend_from_slice(token.as_slice());
        }
        data.extend(std::iter::repeat_n(
            0xff,
            3 * split.route.hops() + BYTES_PER_SPLIT,
        ));
    }
    data.into()
}

#[cfg(test)]
mod tests {
    use {super::*, model::Chain};

    #[test]
    fn providers_exist_exactly_for_rollups() {
        let web3 = ethrpc::web3(&"http://localhost:8545".parse().unwrap());
        assert!(for_chain(&web3, Chain::Optimism).is_some());
        assert!(for_chain(&web3, Chain::ArbitrumOne).is_some());
        assert!(for_chain(&web3, Chain::Mainnet).is_none());
        assert!(for_chain(&web3, Chain::Sepolia).is_none());
    }
}
