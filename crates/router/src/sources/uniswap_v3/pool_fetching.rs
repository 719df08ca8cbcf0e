use {
    crate::{
        pools::{FeeTier, Pool, V3Pool},
        sources::{FetchKey, PoolFetching, uniswap_v2::pair_provider::create2_target_address},
    },
    alloy::{
        eips::BlockId,
        primitives::{
            Address, B256, Bytes, U160, U256,
            aliases::I24,
            keccak256,
        },
        sol_types::{SolCall, SolValue},
    },
    anyhow::{Context as _, Result},
    async_trait::async_trait,
    contracts::UniswapV3Pool,
    ethrpc::multicall::{Call, CallOutcome, MulticallExecutor},
    model::{Chain, TokenPair},
    std::sync::Arc,
    tracing::instrument,
};

/// Identity of a concentrated liquidity pool: a token pair plus fee tier.
///
/// The pool address derives deterministically from this key so unknown pools
/// can be probed optimistically; probes of non-existent pools simply revert
/// and get dropped.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct V3PoolKey {
    pub pair: TokenPair,
    pub fee: FeeTier,
}

impl V3PoolKey {
    pub fn pool_address(&self, factory: Address, init_code_digest: B256) -> Address {
        let (token0, token1) = self.pair.get();
        let salt = keccak256(
            (token0, token1, U256::from(self.fee.as_raw())).abi_encode(),
        );
        create2_target_address(factory, &salt, &init_code_digest)
    }
}

impl FetchKey for V3PoolKey {
    fn cache_key(&self, chain: Chain) -> String {
        let (token0, token1) = self.pair.get();
        format!(
            "pool-{}-v3-{token0:?}-{token1:?}-{}",
            chain.id(),
            self.fee.as_raw()
        )
    }

    fn matches(&self, pool: &Pool) -> bool {
        matches!(pool, Pool::V3(pool) if pool.tokens == self.pair && pool.fee == self.fee)
    }
}

pub struct PoolFetcher {
    chain: Chain,
    factory: Address,
    init_code_digest: B256,
    multicall: Arc<MulticallExecutor>,
}

impl PoolFetcher {
    pub fn new(chain: Chain, multicall: Arc<MulticallExecutor>) -> Result<Self> {
        let (factory, init_code_digest) =
            contracts::factories::v3_factory(chain.id()).context("no pool factory for chain")?;
        Ok(Self {
            chain,
            factory,
            init_code_digest,
            multicall,
        })
    }
}

#[async_trait]
impl PoolFetching<V3PoolKey> for PoolFetcher {
    #[instrument(skip_all)]
    async fn fetch(&self, keys: &[V3PoolKey], block: Option<u64>) -> Result<Vec<Pool>> {
        let calls = keys
            .iter()
            .flat_map(|key| {
                let address = key.pool_address(self.factory, self.init_code_digest);
                [
                    Call {
                        target: address,
                        calldata: UniswapV3Pool::liquidityCall {}.abi_encode().into(),
                    },
                    Call {
                        target: address,
                        calldata: UniswapV3Pool::slot0Call {}.abi_encode().into(),
                    },
                ]
            })
            .collect();
        let outcomes = self
            .multicall
            .aggregate(calls, block.map(BlockId::number))
            .await;

        Ok(keys
            .iter()
            .zip(outcomes.chunks(2))
            .filter_map(|(key, outcomes)| {
                let pool = handle_results(
                    self.chain,
                    key.pool_address(self.factory, self.init_code_digest),
                    key,
                    outcomes,
                );
                if pool.is_none() {
                    tracing::debug!(?key, "dropping unavailable pool");
                }
                pool
            })
            .collect())
    }
}

fn handle_results(
    chain: Chain,
    address: Address,
    key: &V3PoolKey,
    outcomes: &[CallOutcome<Bytes>],
) -> Option<Pool> {
    let [liquidity, slot0] = outcomes else {
        return None;
    };
    let CallOutcome::Ok {
        data: liquidity, ..
    } = liquidity
    else {
        return None;
    };
    let CallOutcome::Ok { data: slot0, .. } = slot0 else {
        return None;
    };
    let liquidity = UniswapV3Pool::liquidityCall::abi_decode_returns(liquidity).ok()?;
    let slot0 = UniswapV3Pool::slot0Call::abi_decode_returns(slot0).ok()?;

    let sqrt_price = U256::from(slot0.sqrtPriceX96);
    // An uninitialized pool has no price and cannot be quoted.
    if sqrt_price.is_zero() {
        return None;
    }

    Some(Pool::V3(V3Pool {
        chain,
        address,
        tokens: key.pair,
        fee: key.fee,
        liquidity,
        sqrt_price,
    }))
}

#[cfg(test)]
mod tests {
    use {super::*, alloy::primitives::address};

    #[test]
    fn derives_mainnet_pool_address() {
        // USDC/WETH 0.05%.
        let key = V3PoolKey {
            pair: TokenPair::new(
                address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
                Chain::Mainnet.wrapped_native(),
            )
            .unwrap(),
            fee: FeeTier::Low,
        };
        let (factory, init_code_digest) = contracts::factories::v3_factory(1).unwrap();
        assert_eq!(
            key.pool_address(factory, init_code_digest),
            address!("0x88e6A0c2dDD26FEEb64F039a2c41296FcB3f5640")
        );
    }

    #[test]
    fn drops_uninitialized_pool() {
        let key = V3PoolKey {
            pair: TokenPair::new(Address::with_last_byte(1), Address::with_last_byte(2))
                .unwrap(),
            fee: FeeTier::Medium,
        };
        let liquidity = CallOutcome::Ok {
            data: U256::from(1_000u64).abi_encode().into(),
            gas_used: U256::ZERO,
        };
        let slot0 = CallOutcome::Ok {
            data: UniswapV3Pool::slot0Call::abi_encode_returns(&UniswapV3Pool::slot0Return {
                sqrtPriceX96: U160::ZERO,
                tick: I24::ZERO,
                observationIndex: 0u16,
                observationCardinality: 0u16,
                observationCardinalityNext: 0u16,
                feeProtocol: 0u8,
                unlocked: true,
            })
            .into(),
            gas_used: U256::ZERO,
        };
        assert!(
            handle_results(
                Chain::Mainnet,
                Address::with_last_byte(3),
                &key,
                &[liquidity, slot0]
            )
            .is_none()
        );
    }

    #[test]
    fn decodes_initialized_pool() {
        let key = V3PoolKey {
            pair: TokenPair::new(Address::with_last_byte(1), Address::with_last_byte(2))
                .unwrap(),
            fee: FeeTier::Medium,
        };
        let liquidity = CallOutcome::Ok {
            data: U256::from(1_000u64).abi_encode().into(),
            gas_used: U256::ZERO,
        };
        let slot0 = CallOutcome::Ok {
            data: UniswapV3Pool::slot0Call::abi_encode_returns(&UniswapV3Pool::slot0Return {
                sqrtPriceX96: U160::from(1u8) << 96,
                tick: I24::ZERO,
                observationIndex: 0u16,
                observationCardinality: 0u16,
                observationCardinalityNext: 0u16,
                feeProtocol: 0u8,
                unlocked: true,
            })
            .into(),
            gas_used: U256::ZERO,
        };
        let pool = handle_results(
            Chain::Mainnet,
            Address::with_last_byte(3),
            &key,
            &[liquidity, slot0],
        )
        .unwrap();
        match pool {
            Pool::V3(pool) => {
                assert_eq!(pool.liquidity, 1_000);
                assert_eq!(pool.sqrt_price, U256::ONE << 96);
                assert_eq!(pool.fee, FeeTier::Medium);
            }
            _ => panic!("expected v3 pool"),
        }
    }

    #[test]
    fn reverted_probe_is_dropped() {
        let key = V3PoolKey {
            pair: TokenPair::new(Address::with_last_byte(1), Address::with_last_byte(2))
                .unwrap(),
            fee: FeeTier::High,
        };
        assert!(
            handle_results(
                Chain::Mainnet,
                Address::with_last_byte(3),
                &key,
                &[
                    CallOutcome::Reverted { reason: None },
                    CallOutcome::Reverted { reason: None }
                ]
            )
            .is_none()
        );
    }
}
