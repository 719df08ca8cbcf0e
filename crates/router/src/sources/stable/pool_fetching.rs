use {
    crate::{
        pools::{AmplificationParameter, Pool, StablePool, WrapperPool},
        sources::{FetchKey, PoolFetching},
    },
    alloy::{
        eips::BlockId,
        primitives::{Address, B256, Bytes, U256},
        sol_types::SolCall,
    },
    anyhow::{Context as _, Result},
    async_trait::async_trait,
    contracts::{StablePool as StablePoolContract, StableVault, WrapperVault},
    ethrpc::multicall::{Call, CallOutcome, MulticallExecutor},
    model::Chain,
    std::sync::Arc,
    tracing::instrument,
};

/// Identity of a stable pool as reported by the listing source.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StablePoolKey {
    pub id: B256,
    pub address: Address,
    /// Optional share/asset vault wrapping this pool's share token.
    pub wrapper: Option<Address>,
}

impl FetchKey for StablePoolKey {
    fn cache_key(&self, chain: Chain) -> String {
        format!("pool-{}-stable-{:?}", chain.id(), self.id)
    }

    fn matches(&self, pool: &Pool) -> bool {
        match pool {
            Pool::Stable(pool) => pool.id == self.id,
            Pool::StableWrapper(pool) => Some(pool.wrapper) == self.wrapper,
            _ => false,
        }
    }
}

/// Scale applied when probing the wrapper's share/asset conversion rate.
fn rate_unit() -> U256 {
    U256::from(10).pow(U256::from(18))
}

/// Materializes stable pool state through the vault plus the pool contract,
/// and the conversion rate of an attached wrapper vault if any.
pub struct PoolFetcher {
    chain: Chain,
    vault: Address,
    multicall: Arc<MulticallExecutor>,
}

impl PoolFetcher {
    pub fn new(chain: Chain, multicall: Arc<MulticallExecutor>) -> Result<Self> {
        let vault = StableVault::deployment(chain.id()).context("no vault for chain")?;
        Ok(Self {
            chain,
            vault,
            multicall,
        })
    }

    fn calls(&self, key: &StablePoolKey) -> Vec<Call> {
        let mut calls = vec![
            Call {
                target: self.vault,
                calldata: StableVault::getPoolTokensCall { poolId: key.id }
                    .abi_encode()
                    .into(),
            },
            Call {
                target: key.address,
                calldata: StablePoolContract::getAmplificationParameterCall {}
                    .abi_encode()
                    .into(),
            },
            Call {
                target: key.address,
                calldata: StablePoolContract::getSwapFeePercentageCall {}
                    .abi_encode()
                    .into(),
            },
            Call {
                target: key.address,
                calldata: StablePoolContract::getScalingFactorsCall {}
                    .abi_encode()
                    .into(),
            },
            Call {
                target: key.address,
                calldata: StablePoolContract::totalSupplyCall {}.abi_encode().into(),
            },
        ];
        if let Some(wrapper) = key.wrapper {
            calls.push(Call {
                target: wrapper,
                calldata: WrapperVault::convertToAssetsCall { shares: rate_unit() }
                    .abi_encode()
                    .into(),
            });
        }
        calls
    }
}

#[async_trait]
impl PoolFetching<StablePoolKey> for PoolFetcher {
    #[instrument(skip_all)]
    async fn fetch(&self, keys: &[StablePoolKey], block: Option<u64>) -> Result<Vec<Pool>> {
        let calls = keys.iter().flat_map(|key| self.calls(key)).collect();
        let outcomes = self
            .multicall
            .aggregate(calls, block.map(BlockId::number))
            .await;

        let mut pools = Vec::new();
        let mut cursor = 0;
        for key in keys {
            let count = if key.wrapper.is_some() { 6 } else { 5 };
            let outcomes = &outcomes[cursor..cursor + count];
            cursor += count;

            match handle_results(self.chain, key, outcomes) {
                Some(fetched) => pools.extend(fetched),
                None => tracing::debug!(id = ?key.id, "dropping unavailable stable pool"),
            }
        }
        Ok(pools)
    }
}

fn handle_results(
    chain: Chain,
    key: &StablePoolKey,
    outcomes: &[CallOutcome<Bytes>],
) -> Option<Vec<Pool>> {
    let data = |index: usize| match &outcomes[index] {
        CallOutcome::Ok { data, .. } => Some(data),
        _ => None,
    };

    let pool_tokens = StableVault::getPoolTokensCall::abi_decode_returns(data(0)?).ok()?;
    let amplification =
        StablePoolContract::getAmplificationParameterCall::abi_decode_returns(data(1)?).ok()?;
    let swap_fee = StablePoolContract::getSwapFeePercentageCall::abi_decode_returns(data(2)?).ok()?;
    let scaling_factors =
        StablePoolContract::getScalingFactorsCall::abi_decode_returns(data(3)?).ok()?;
    let total_shares = StablePoolContract::totalSupplyCall::abi_decode_returns(data(4)?).ok()?;

    let amplification =
        AmplificationParameter::try_new(amplification.value, amplification.precision).ok()?;

    let mut pools = vec![Pool::Stable(StablePool {
        chain,
        id: key.id,
        address: key.address,
        tokens: pool_tokens.tokens,
        amplification,
        swap_fee,
        total_shares,
        balances: pool_tokens.balances,
        scaling_factors,
    })];

    if let Some(wrapper) = key.wrapper {
        // A wrapper whose rate probe fails is dropped on its own; the stable
        // pool itself stays usable.
        match data(5).and_then(|data| {
            WrapperVault::convertToAssetsCall::abi_decode_returns(data).ok()
        }) {
            Some(rate) if !rate.is_zero() => pools.push(Pool::StableWrapper(WrapperPool {
                chain,
                address: wrapper,
                underlying: key.address,
                wrapper,
                rate,
            })),
            _ => tracing::debug!(?wrapper, "dropping wrapper with unavailable rate"),
        }
    }

    Some(pools)
}
