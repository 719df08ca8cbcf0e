//! Route enumeration over candidate pools.

use {
    crate::pools::{Pool, Protocol},
    alloy::primitives::Address,
    itertools::Itertools,
    model::PoolId,
    std::collections::HashSet,
    tracing::instrument,
};

/// An ordered, non-empty chain of pools where adjacent pools share a token.
/// Immutable once constructed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Route {
    pools: Vec<Pool>,
    /// One more entry than `pools`: starts at the route input, ends at the
    /// route output, and each consecutive pair is connected by the pool at
    /// the same index.
    token_path: Vec<Address>,
}

impl Route {
    pub fn new(pools: Vec<Pool>, token_path: Vec<Address>) -> Self {
        debug_assert!(!pools.is_empty());
        debug_assert_eq!(token_path.len(), pools.len() + 1);
        debug_assert!(
            pools
                .iter()
                .zip(token_path.windows(2))
                .all(|(pool, hop)| pool.involves(hop[0]) && pool.involves(hop[1]))
        );
        Self { pools, token_path }
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    pub fn token_path(&self) -> &[Address] {
        &self.token_path
    }

    pub fn input(&self) -> Address {
        *self.token_path.first().unwrap()
    }

    pub fn output(&self) -> Address {
        *self.token_path.last().unwrap()
    }

    pub fn hops(&self) -> usize {
        self.pools.len()
    }

    /// The route's protocol tag: the single protocol of its pools, or
    /// [`Protocol::Mixed`] when the pools span several.
    pub fn protocol(&self) -> Protocol {
        let mut protocols = self.pools.iter().map(Pool::protocol);
        let first = protocols.next().unwrap();
        if protocols.all(|protocol| protocol == first) {
            first
        } else {
            Protocol::Mixed
        }
    }

    /// Stable textual identity used for deterministic ordering and logging.
    pub fn id(&self) -> String {
        self.pools.iter().map(|pool| pool.id().to_string()).join("/")
    }
}

/// Enumerates every simple path from `token_in` to `token_out` over the given
/// pools with at most `max_hops` pools.
///
/// No pool appears twice within one path (by canonical pool id, so the same
/// stable pool reached through different token pair projections counts as one
/// pool) and no intermediate token is revisited.
#[instrument(skip_all, fields(pools = pools.len()))]
pub fn compute_all_routes(
    token_in: Address,
    token_out: Address,
    pools: &[Pool],
    max_hops: usize,
) -> Vec<Route> {
    if token_in == token_out || max_hops == 0 {
        return Vec::new();
    }

    let mut routes = Vec::new();
    let mut state = Search {
        pools,
        token_out,
        max_hops,
        visited_pools: HashSet::new(),
        visited_tokens: HashSet::from([token_in]),
        current_pools: Vec::new(),
        token_path: vec![token_in],
    };
    state.explore(token_in, &mut routes);
    tracing::debug!(routes = routes.len(), "enumerated routes");
    routes
}

/// Like [`compute_all_routes`] but keeps only routes combining at least two
/// pools of at least two distinct protocols; single protocol routes belong to
/// their per-protocol enumerations.
pub fn compute_all_mixed_routes(
    token_in: Address,
    token_out: Address,
    pools: &[Pool],
    max_hops: usize,
) -> Vec<Route> {
    compute_all_routes(token_in, token_out, pools, max_hops)
        .into_iter()
        .filter(|route| route.protocol() == Protocol::Mixed)
        .collect()
}

struct Search<'a> {
    pools: &'a [Pool],
    token_out: Address,
    max_hops: usize,
    visited_pools: HashSet<PoolId>,
    visited_tokens: HashSet<Address>,
    current_pools: Vec<Pool>,
    token_path: Vec<Address>,
}

impl Search<'_> {
    fn explore(&mut self, current: Address, routes: &mut Vec<Route>) {
        if self.current_pools.len() >= self.max_hops {
            return;
        }
        let pools = self.pools;
        for pool in pools {
            if self.visited_pools.contains(&pool.id()) {
                continue;
            }
            for next in pool.outputs(current) {
                if next == self.token_out {
                    let mut pools = self.current_pools.clone();
                    pools.push(pool.clone());
                    let mut token_path = self.token_path.clone();
                    token_path.push(next);
                    routes.push(Route::new(pools, token_path));
                } else if !self.visited_tokens.contains(&next) {
                    self.visited_pools.insert(pool.id());
                    self.visited_tokens.insert(next);
                    self.current_pools.push(pool.clone());
                    self.token_path.push(next);

                    self.explore(next, routes);

                    self.token_path.pop();
                    self.current_pools.pop();
                    self.visited_tokens.remove(&next);
                    self.visited_pools.remove(&pool.id());
                }
            }
        }
    }
}
