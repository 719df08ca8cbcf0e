//! Stable swap source, including share/asset wrapper vaults.

pub mod graph_api;
pub mod pool_fetching;

pub use {
    graph_api::StableSubgraphClient,
    pool_fetching::{PoolFetcher, StablePoolKey},
};
