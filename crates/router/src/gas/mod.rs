//! Heuristic gas cost model.
//!
//! Estimates gas per route from per-protocol, per-chain constants plus the
//! tick data reported by the quoter, then converts the native currency cost
//! into the quote token, USD and optionally a caller specified gas token
//! using reference pool mid prices. Conversion never simulates a swap.

pub mod l1;

use {
    crate::{
        pools::{Pool, Protocol},
        quoting::AmountQuote,
        routes::Route,
    },
    alloy::primitives::{Address, U256, address},
    itertools::Itertools,
    model::{Chain, Token, TokenAmount},
    std::collections::HashMap,
    std::sync::LazyLock,
};

fn base_swap_cost_v3(chain: Chain) -> U256 {
    match chain {
        Chain::ArbitrumOne => U256::from(5_000),
        _ => U256::from(2_000),
    }
}

fn cost_per_hop_v3(chain: Chain) -> U256 {
    match chain {
        Chain::ArbitrumOne => U256::from(100_000),
        _ => U256::from(80_000),
    }
}

const COST_PER_INIT_TICK: u64 = 31_000;
// Crossing an uninitialized tick is covered by the hop cost.
const COST_PER_UNINIT_TICK: u64 = 0;

fn base_swap_cost_v2(chain: Chain) -> U256 {
    match chain {
        Chain::ArbitrumOne => U256::from(150_000),
        _ => U256::from(135_000),
    }
}

fn cost_per_extra_hop_v2(_chain: Chain) -> U256 {
    U256::from(50_000)
}

fn base_swap_cost_stable(chain: Chain) -> U256 {
    match chain {
        Chain::ArbitrumOne => U256::from(120_000),
        _ => U256::from(100_000),
    }
}

fn cost_per_hop_stable(_chain: Chain) -> U256 {
    U256::from(60_000)
}

fn base_swap_cost_stable_wrapper(_chain: Chain) -> U256 {
    U256::from(40_000)
}

fn cost_per_hop_stable_wrapper(_chain: Chain) -> U256 {
    U256::from(20_000)
}

/// Additive gas overhead for tokens whose transfers do extra bookkeeping,
/// e.g. snapshotting governance state.
static TOKEN_OVERHEAD: LazyLock<HashMap<(Chain, Address), u64>> = LazyLock::new(|| {
    HashMap::from([
        // stETH rebases balances on transfer.
        (
            (
                Chain::Mainnet,
                address!("0xae7ab96520DE3A18E5e111B5EaAb095312D7fE84"),
            ),
            80_000,
        ),
    ])
});

/// Reference pools located during candidate selection. Any of them may be
/// missing; conversion through a missing pool yields a zero cost so the
/// route still participates, just without that adjustment.
#[derive(Clone, Debug, Default)]
pub struct GasModelPools {
    /// High TVL pool pairing the wrapped native token with a USD stable.
    pub usd_pool: Option<Pool>,
    /// Pool pairing the wrapped native token with the quote token.
    pub native_quote_pool: Option<Pool>,
    /// Pool pairing the wrapped native token with the configured gas token.
    pub native_gas_token_pool: Option<Pool>,
}

/// Per-route gas estimate and its conversions.
#[derive(Clone, Debug)]
pub struct RouteGasEstimate {
    /// Gas units.
    pub gas_estimate: U256,
    /// Cost in wei at the model's gas price.
    pub gas_cost_native: U256,
    pub gas_cost_in_quote_token: TokenAmount,
    pub gas_cost_in_usd: TokenAmount,
    pub gas_cost_in_gas_token: Option<TokenAmount>,
}

pub struct GasModel {
    chain: Chain,
    gas_price_wei: U256,
    quote_token: Token,
    usd_token: Token,
    gas_token: Option<Token>,
    pools: GasModelPools,
    additional_overhead: U256,
}

impl GasModel {
    pub fn new(
        chain: Chain,
        gas_price_wei: U256,
        quote_token: Token,
        usd_token: Token,
        gas_token: Option<Token>,
        pools: GasModelPools,
        additional_overhead: U256,
    ) -> Self {
        Self {
            chain,
            gas_price_wei,
            quote_token,
            usd_token,
            gas_token,
            pools,
            additional_overhead,
        }
    }

    /// Estimates the gas cost of executing one route for one quoted amount.
    pub fn estimate_route(&self, route: &Route, quote: &AmountQuote) -> RouteGasEstimate {
        let gas_estimate = route_gas_units(self.chain, route, quote) + self.additional_overhead;
        self.estimate_with_gas(gas_estimate)
    }

    /// Converts a fixed number of gas units, e.g. after an L1 data fee
    /// correction.
    pub fn estimate_with_gas(&self, gas_estimate: U256) -> RouteGasEstimate {
        let gas_cost_native = gas_estimate * self.gas_price_wei;
        self.convert_cost(gas_estimate, gas_cost_native)
    }

    /// Converts an absolute cost in wei, e.g. an L1 data fee that is not a
    /// multiple of the L2 gas price.
    pub fn convert_native_cost(&self, gas_cost_native: U256) -> RouteGasEstimate {
        self.convert_cost(U256::ZERO, gas_cost_native)
    }

    fn convert_cost(&self, gas_estimate: U256, gas_cost_native: U256) -> RouteGasEstimate {
        RouteGasEstimate {
            gas_estimate,
            gas_cost_native,
            gas_cost_in_quote_token: self.convert(
                gas_cost_native,
                self.pools.native_quote_pool.as_ref(),
                &self.quote_token,
            ),
            gas_cost_in_usd: self.convert(
                gas_cost_native,
                self.pools.usd_pool.as_ref(),
                &self.usd_token,
            ),
            gas_cost_in_gas_token: self.gas_token.as_ref().map(|token| {
                self.convert(
                    gas_cost_native,
                    self.pools.native_gas_token_pool.as_ref(),
                    token,
                )
            }),
        }
    }

    fn convert(&self, cost_wei: U256, pool: Option<&Pool>, token: &Token) -> TokenAmount {
        if token.is_wrapped_native() {
            return TokenAmount::from_raw(token.clone(), cost_wei);
        }
        let wrapped_native = self.chain.wrapped_native();
        match pool.and_then(|pool| pool.mid_price(wrapped_native)) {
            Some(price) => {
                TokenAmount::from_raw(Token::wrapped_native(self.chain), cost_wei)
                    .scale(&price, token.clone())
            }
            None => TokenAmount::zero(token.clone()),
        }
    }
}

/// Gas units for one route: the route's pools are partitioned into maximal
/// same-protocol sections and each section contributes its protocol's base
/// cost plus a per-hop cost; crossed ticks are charged once per route.
fn route_gas_units(chain: Chain, route: &Route, quote: &AmountQuote) -> U256 {
    let mut gas = U256::ZERO;
    for (protocol, section) in &route
        .pools()
        .iter()
        .chunk_by(|pool| pool.protocol())
    {
        let section: Vec<&Pool> = section.collect();
        let hops = U256::from(section.len());
        gas += match protocol {
            Protocol::V3 => base_swap_cost_v3(chain) + cost_per_hop_v3(chain) * hops,
            Protocol::V2 => {
                base_swap_cost_v2(chain) + cost_per_extra_hop_v2(chain) * (hops - U256::ONE)
            }
            Protocol::Stable => {
                let overhead: u64 = section
                    .iter()
                    .flat_map(|pool| pool.tokens())
                    .filter_map(|token| TOKEN_OVERHEAD.get(&(chain, token)))
                    .sum();
                base_swap_cost_stable(chain)
                    + cost_per_hop_stable(chain) * hops
                    + U256::from(overhead)
            }
            Protocol::StableWrapper => {
                base_swap_cost_stable_wrapper(chain) + cost_per_hop_stable_wrapper(chain) * hops
            }
            Protocol::Mixed => unreachable!("pools have concrete protocols"),
        };
    }

    let ticks_crossed: u64 = quote
        .initialized_ticks_crossed
        .iter()
        .map(|ticks| u64::from(*ticks))
        .sum();
    gas + U256::from(ticks_crossed * COST_PER_INIT_TICK + COST_PER_UNINIT_TICK)
}

/// The highest liquidity concentrated liquidity pool pairing the wrapped
/// native token with the given token, used as a conversion reference.
pub fn highest_liquidity_native_pool(
    chain: Chain,
    token: Address,
    pools: &[Pool],
) -> Option<Pool> {
    let wrapped_native = chain.wrapped_native();
    pools
        .iter()
        .filter(|pool| {
            matches!(pool, Pool::V3(_)) && pool.involves(wrapped_native) && pool.involves(token)
        })
        .max_by_key(|pool| match pool {
            Pool::V3(pool) => pool.liquidity,
            _ => 0,
        })
        .cloned()
}
