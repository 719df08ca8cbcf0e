//! Smart order routing over heterogeneous on-chain liquidity.
//!
//! The entry point is [`router::Router`] which, given an input currency, an
//! output currency and a fixed amount on one side, finds the highest value
//! route (possibly split across several sub-routes) through the supported
//! liquidity sources and returns a gas adjusted quote.

pub mod config;
pub mod error;
pub mod gas;
pub mod gas_price;
pub mod plan;
pub mod pool_cache;
pub mod pools;
pub mod quoting;
pub mod retry;
pub mod router;
pub mod routes;
pub mod selection;
pub mod sources;
pub mod split;
pub mod subgraph;
pub mod token_info;
pub mod tokens;

pub use {
    config::{RoutingConfig, SwapConfig},
    error::RouterError,
    plan::Plan,
    router::{Providers, Router, SubgraphUrls, supported_chain},
};
