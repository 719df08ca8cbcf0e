//! Candidate pool selection.
//!
//! From all pools a listing source knows, pick a bounded subset likely to
//! contain the optimal routes. Pools are considered in coarse TVL order and
//! assigned to buckets in a fixed priority; a running set of selected pool
//! ids prevents duplicates across buckets, so every bucket takes the *next*
//! matching pools.

use {
    crate::{
        config::PoolSelection,
        pools::{FeeTier, Protocol},
        sources::{SubgraphPool, SubgraphPoolExtras},
        sources::{uniswap_v2::PairProvider, uniswap_v3::V3PoolKey},
        tokens,
    },
    alloy::primitives::Address,
    model::{Chain, PoolId, TokenPair, TradeType},
    std::collections::HashSet,
    tracing::instrument,
};

/// The pools selected for one protocol, in selection order, together with the
/// per-bucket assignment for diagnostics and reference pool lookup.
#[derive(Clone, Debug, Default)]
pub struct CandidatePools {
    pub pools: Vec<SubgraphPool>,
    pub buckets: Buckets,
}

#[derive(Clone, Debug, Default)]
pub struct Buckets {
    pub top_by_base_with_token_in: Vec<PoolId>,
    pub top_by_base_with_token_out: Vec<PoolId>,
    pub top_by_direct_swap: Vec<PoolId>,
    /// Pool pairing the wrapped native token with the quote side, used to
    /// convert gas into quote token units.
    pub top_by_native_quote_token: Vec<PoolId>,
    pub top_by_tvl: Vec<PoolId>,
    pub top_by_tvl_using_token_in: Vec<PoolId>,
    pub top_by_tvl_using_token_out: Vec<PoolId>,
    pub top_by_tvl_token_in_second_hops: Vec<PoolId>,
    pub top_by_tvl_token_out_second_hops: Vec<PoolId>,
}

struct Selection<'a> {
    universe: Vec<&'a SubgraphPool>,
    selected: Vec<SubgraphPool>,
    ids: HashSet<PoolId>,
}

impl<'a> Selection<'a> {
    /// Adds the next pools matching the predicate, up to `cap`, and returns
    /// the newly added ones.
    fn take(
        &mut self,
        cap: usize,
        predicate: impl Fn(&SubgraphPool) -> bool,
    ) -> Vec<SubgraphPool> {
        let mut taken = Vec::new();
        for pool in &self.universe {
            if taken.len() >= cap {
                break;
            }
            if self.ids.contains(&pool.id) || !predicate(pool) {
                continue;
            }
            self.ids.insert(pool.id);
            self.selected.push((*pool).clone());
            taken.push((*pool).clone());
        }
        taken
    }

    /// Adds a synthetic pool descriptor not present in the universe.
    fn inject(&mut self, pool: SubgraphPool) -> Option<PoolId> {
        if !self.ids.insert(pool.id) {
            return None;
        }
        let id = pool.id;
        self.selected.push(pool);
        Some(id)
    }
}

fn ids(pools: &[SubgraphPool]) -> Vec<PoolId> {
    pools.iter().map(|pool| pool.id).collect()
}

/// Picks the candidate pools of one protocol for a trade between the given
/// (wrapped) tokens.
#[instrument(skip_all, fields(%protocol))]
#[allow(clippy::too_many_arguments)]
pub fn select_candidate_pools(
    chain: Chain,
    token_in: Address,
    token_out: Address,
    trade_type: TradeType,
    protocol: Protocol,
    all_pools: &[SubgraphPool],
    selection: &PoolSelection,
    blocked_tokens: &HashSet<Address>,
) -> CandidatePools {
    let mut universe: Vec<&SubgraphPool> = all_pools
        .iter()
        .filter(|pool| pool.protocol() == protocol)
        .filter(|pool| {
            !pool
                .connected_tokens()
                .iter()
                .any(|token| blocked_tokens.contains(token))
        })
        .collect();
    universe.sort_by(|a, b| {
        b.tvl_usd
            .partial_cmp(&a.tvl_usd)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.tvl_native
                    .partial_cmp(&a.tvl_native)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut state = Selection {
        universe,
        selected: Vec::new(),
        ids: HashSet::new(),
    };
    let mut buckets = Buckets::default();

    // Pools pairing each base token with the traded tokens.
    let bases = tokens::base_tokens(chain);
    for (token, bucket) in [
        (token_in, &mut buckets.top_by_base_with_token_in),
        (token_out, &mut buckets.top_by_base_with_token_out),
    ] {
        let mut total = 0;
        for base in &bases {
            if base.address == token || total >= selection.top_n_with_base_token {
                continue;
            }
            let cap = selection
                .top_n_with_each_base_token
                .min(selection.top_n_with_base_token - total);
            let taken = state.take(cap, |pool| {
                pool.involves(base.address) && pool.involves(token)
            });
            total += taken.len();
            bucket.extend(ids(&taken));
        }
    }

    // Pools connecting the traded tokens directly.
    let direct = state.take(selection.top_n_direct_swaps, |pool| {
        pool.involves(token_in) && pool.involves(token_out)
    });
    buckets.top_by_direct_swap = ids(&direct);
    if buckets.top_by_direct_swap.is_empty() && selection.top_n_direct_swaps > 0 {
        // The listing source may simply not know the direct pools yet. For
        // protocols with deterministic pool addresses we inject optimistic
        // descriptors for every fee tier and let on-chain quoting sort out
        // which of them exist.
        buckets.top_by_direct_swap =
            inject_optimistic_direct_pools(&mut state, chain, protocol, token_in, token_out);
        if !buckets.top_by_direct_swap.is_empty() {
            tracing::debug!(
                pools = buckets.top_by_direct_swap.len(),
                "injected optimistic direct pool descriptors"
            );
        }
    }

    // One pool connecting the wrapped native token with the quote side, so
    // gas costs can be expressed in the quote token.
    let quote_side = match trade_type {
        TradeType::ExactInput => token_out,
        TradeType::ExactOutput => token_in,
    };
    let wrapped_native = chain.wrapped_native();
    if quote_side != wrapped_native {
        let taken = state.take(1, |pool| {
            pool.involves(wrapped_native) && pool.involves(quote_side)
        });
        buckets.top_by_native_quote_token = ids(&taken);
    }

    // The next pools overall.
    buckets.top_by_tvl = ids(&state.take(selection.top_n, |_| true));

    // The next pools using the input respectively output token. For stable
    // pools the wrapper vault token is compared against the *input* token on
    // both sides; the asymmetry is a deliberate inclusion rule that keeps
    // wrapper-reachable pools in the candidate set regardless of direction.
    let using_token_in = state.take(selection.top_n_token_in_out, |pool| {
        pool.tokens.contains(&token_in) || pool.wrapper() == Some(token_in)
    });
    let using_token_out = state.take(selection.top_n_token_in_out, |pool| {
        pool.tokens.contains(&token_out) || pool.wrapper() == Some(token_in)
    });
    buckets.top_by_tvl_using_token_in = ids(&using_token_in);
    buckets.top_by_tvl_using_token_out = ids(&using_token_out);

    // Pools reachable through the tokens the previous two buckets exposed.
    for (bucket_pools, from_token, bucket) in [
        (
            &using_token_in,
            token_in,
            &mut buckets.top_by_tvl_token_in_second_hops,
        ),
        (
            &using_token_out,
            token_out,
            &mut buckets.top_by_tvl_token_out_second_hops,
        ),
    ] {
        for second_hop in second_hop_tokens(bucket_pools, from_token, selection) {
            let cap = selection
                .top_n_second_hop_for_token
                .get(&second_hop)
                .copied()
                .unwrap_or(selection.top_n_second_hop);
            let taken = state.take(cap, |pool| pool.involves(second_hop));
            bucket.extend(ids(&taken));
        }
    }

    tracing::debug!(
        candidates = state.selected.len(),
        universe = state.universe.len(),
        "selected candidate pools"
    );
    CandidatePools {
        pools: state.selected,
        buckets,
    }
}

/// The distinct tokens the given pools expose besides `from_token`, in pool
/// order, minus the configured avoid list.
fn second_hop_tokens(
    pools: &[SubgraphPool],
    from_token: Address,
    selection: &PoolSelection,
) -> Vec<Address> {
    let mut seen = HashSet::new();
    pools
        .iter()
        .flat_map(|pool| pool.connected_tokens())
        .filter(|token| *token != from_token)
        .filter(|token| !selection.tokens_to_avoid_on_second_hops.contains(token))
        .filter(|token| seen.insert(*token))
        .collect()
}

fn inject_optimistic_direct_pools(
    state: &mut Selection,
    chain: Chain,
    protocol: Protocol,
    token_in: Address,
    token_out: Address,
) -> Vec<PoolId> {
    let Some(pair) = TokenPair::new(token_in, token_out) else {
        return Vec::new();
    };
    match protocol {
        Protocol::V3 => {
            let Some((factory, init_code_digest)) = contracts::factories::v3_factory(chain.id())
            else {
                return Vec::new();
            };
            FeeTier::ALL
                .iter()
                .filter_map(|fee| {
                    let key = V3PoolKey { pair, fee: *fee };
                    state.inject(SubgraphPool {
                        id: PoolId::Contract(key.pool_address(factory, init_code_digest)),
                        tokens: pair.into_iter().collect(),
                        tvl_native: 0.0,
                        tvl_usd: 0.0,
                        extras: SubgraphPoolExtras::V3 { fee_tier: *fee },
                    })
                })
                .collect()
        }
        Protocol::V2 => {
            let Some(provider) = PairProvider::for_chain(chain) else {
                return Vec::new();
            };
            state
                .inject(SubgraphPool {
                    id: PoolId::Contract(provider.pair_address(&pair)),
                    tokens: pair.into_iter().collect(),
                    tvl_native: 0.0,
                    tvl_usd: 0.0,
                    extras: SubgraphPoolExtras::V2 { reserve: 0.0 },
                })
                .into_iter()
                .collect()
        }
        // Stable pool ids are not derivable so optimistic probing is not
        // possible.
        _ => Vec::new(),
    }
}
