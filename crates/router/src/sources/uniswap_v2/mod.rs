//! Constant product (`V2`) liquidity source.

pub mod graph_api;
pub mod pair_provider;
pub mod pool_fetching;

pub use {
    graph_api::V2SubgraphClient,
    pair_provider::PairProvider,
    pool_fetching::PoolFetcher,
};
