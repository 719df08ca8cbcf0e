//! Concentrated liquidity (`V3`) source.

pub mod graph_api;
pub mod pool_fetching;

pub use {
    graph_api::V3SubgraphClient,
    pool_fetching::{PoolFetcher, V3PoolKey},
};
