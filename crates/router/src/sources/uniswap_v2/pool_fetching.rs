use {
    super::pair_provider::PairProvider,
    crate::sources::{FetchKey, PoolFetching},
    crate::pools::{Pool, V2Pool},
    alloy::{
        eips::BlockId,
        primitives::{Bytes, U256},
        sol_types::SolCall,
    },
    anyhow::{Context as _, Result},
    async_trait::async_trait,
    cached::{Cached, TimedCache},
    contracts::{ERC20, UniswapV2Pair},
    ethrpc::multicall::{Call, CallOutcome, MulticallExecutor},
    model::{Chain, TokenPair},
    std::{sync::{Arc, RwLock}, time::Duration},
    tracing::instrument,
};

impl FetchKey for TokenPair {
    fn cache_key(&self, chain: Chain) -> String {
        let (token0, token1) = self.get();
        format!("pool-{}-v2-{token0:?}-{token1:?}", chain.id())
    }

    fn matches(&self, pool: &Pool) -> bool {
        matches!(pool, Pool::V2(pool) if pool.tokens == *self)
    }
}

/// Materializes constant product pool state by deriving the pair address
/// deterministically and reading reserves plus token balances in one batch.
pub struct PoolFetcher {
    chain: Chain,
    pair_provider: PairProvider,
    multicall: Arc<MulticallExecutor>,
    non_existent_pools: RwLock<TimedCache<TokenPair, ()>>,
}

impl PoolFetcher {
    pub fn new(chain: Chain, multicall: Arc<MulticallExecutor>, cache_time: Duration) -> Result<Self> {
        let pair_provider =
            PairProvider::for_chain(chain).context("no pair factory for chain")?;
        Ok(Self {
            chain,
            pair_provider,
            multicall,
            non_existent_pools: RwLock::new(TimedCache::with_lifespan(cache_time.as_secs())),
        })
    }
}

#[async_trait]
impl PoolFetching<TokenPair> for PoolFetcher {
    #[instrument(skip_all)]
    async fn fetch(&self, keys: &[TokenPair], block: Option<u64>) -> Result<Vec<Pool>> {
        let pairs: Vec<TokenPair> = {
            let mut non_existent_pools = self.non_existent_pools.write().unwrap();
            keys.iter()
                .copied()
                .filter(|pair| non_existent_pools.cache_get(pair).is_none())
                .collect()
        };

        let calls = pairs
            .iter()
            .flat_map(|pair| {
                let address = self.pair_provider.pair_address(pair);
                let (token0, token1) = pair.get();
                [
                    Call {
                        target: address,
                        calldata: UniswapV2Pair::getReservesCall {}.abi_encode().into(),
                    },
                    Call {
                        target: token0,
                        calldata: ERC20::balanceOfCall { owner: address }.abi_encode().into(),
                    },
                    Call {
                        target: token1,
                        calldata: ERC20::balanceOfCall { owner: address }.abi_encode().into(),
                    },
                ]
            })
            .collect();
        let outcomes = self
            .multicall
            .aggregate(calls, block.map(BlockId::number))
            .await;

        let mut pools = Vec::with_capacity(pairs.len());
        let mut new_missing_pairs = vec![];
        for (pair, outcomes) in pairs.iter().zip(outcomes.chunks(3)) {
            match handle_results(self.chain, self.pair_provider.pair_address(pair), *pair, outcomes) {
                Some(pool) => pools.push(pool),
                None => new_missing_pairs.push(*pair),
            }
        }

        if !new_missing_pairs.is_empty() {
            tracing::debug!(token_pairs = ?new_missing_pairs, "stop indexing liquidity");
            let mut non_existent_pools = self.non_existent_pools.write().unwrap();
            for pair in new_missing_pairs {
                non_existent_pools.cache_set(pair, ());
            }
        }
        Ok(pools)
    }
}

fn handle_results(
    chain: Chain,
    address: alloy::primitives::Address,
    pair: TokenPair,
    outcomes: &[CallOutcome<Bytes>],
) -> Option<Pool> {
    let [reserves, balance0, balance1] = outcomes else {
        return None;
    };
    let reserves = decode_reserves(reserves)?;
    let balance0 = decode_balance(balance0)?;
    let balance1 = decode_balance(balance1)?;

    // Some ERC20s have an elastic supply and can reduce the balance of their
    // owners without any transfer ("rebase"). Constant product pools only
    // update their reserves upon swaps, so a negatively rebased pool holds
    // less than its cached reserves and computes the wrong clearing price.
    // Such pools are excluded.
    if U256::from(reserves.0) > balance0 || U256::from(reserves.1) > balance1 {
        tracing::debug!(?pair, "dropping pool with reserves above balances");
        return None;
    }

    Some(Pool::V2(V2Pool {
        chain,
        address,
        tokens: pair,
        reserves,
    }))
}

fn decode_reserves(outcome: &CallOutcome<Bytes>) -> Option<(u128, u128)> {
    let CallOutcome::Ok { data, .. } = outcome else {
        return None;
    };
    let reserves = UniswapV2Pair::getReservesCall::abi_decode_returns(data).ok()?;
    // Reserves are uint112 on-chain so they always fit u128.
    Some((reserves.reserve0.to::<u128>(), reserves.reserve1.to::<u128>()))
}

fn decode_balance(outcome: &CallOutcome<Bytes>) -> Option<U256> {
    let CallOutcome::Ok { data, .. } = outcome else {
        return None;
    };
    ERC20::balanceOfCall::abi_decode_returns(data).ok()
}

#[cfg(test)]
mod tests {
    use {super::*, alloy::primitives::Address, alloy::sol_types::SolValue};

    fn encoded_reserves(reserve0: u128, reserve1: u128) -> CallOutcome<Bytes> {
        CallOutcome::Ok {
            data: (U256::from(reserve0), U256::from(reserve1), 0u32)
                .abi_encode()
                .into(),
            gas_used: U256::ZERO,
        }
    }

    fn encoded_balance(balance: u128) -> CallOutcome<Bytes> {
        CallOutcome::Ok {
            data: U256::from(balance).abi_encode().into(),
            gas_used: U256::ZERO,
        }
    }

    fn pair() -> TokenPair {
        TokenPair::new(Address::with_last_byte(1), Address::with_last_byte(2)).unwrap()
    }

    #[test]
    fn decodes_existing_pool() {
        let pool = handle_results(
            Chain::Mainnet,
            Address::with_last_byte(42),
            pair(),
            &[
                encoded_reserves(100, 200),
                encoded_balance(100),
                encoded_balance(200),
            ],
        )
        .unwrap();
        match pool {
            Pool::V2(pool) => {
                assert_eq!(pool.reserves, (100, 200));
                assert_eq!(pool.address, Address::with_last_byte(42));
            }
            _ => panic!("expected v2 pool"),
        }
    }

    #[test]
    fn drops_pool_on_reverted_call() {
        assert!(
            handle_results(
                Chain::Mainnet,
                Address::with_last_byte(42),
                pair(),
                &[
                    CallOutcome::Reverted { reason: None },
                    encoded_balance(100),
                    encoded_balance(200),
                ],
            )
            .is_none()
        );
    }

    #[test]
    fn drops_pool_with_rebased_balances() {
        assert!(
            handle_results(
                Chain::Mainnet,
                Address::with_last_byte(42),
                pair(),
                &[
                    encoded_reserves(100, 200),
                    encoded_balance(99),
                    encoded_balance(200),
                ],
            )
            .is_none()
        );
    }

    #[test]
    fn cache_key_contains_chain_and_tokens() {
        let key = pair().cache_key(Chain::Mainnet);
        assert!(key.starts_with("pool-1-v2-0x"));
    }
}
