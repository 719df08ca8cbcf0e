//! Typed configuration for the routing entry point.

use {
    crate::pools::Protocol,
    alloy::primitives::{Address, Bytes, U256},
    std::{
        collections::{HashMap, HashSet},
        time::Duration,
    },
};

/// Per-protocol bucket caps for candidate pool selection.
#[derive(Clone, Debug)]
pub struct PoolSelection {
    /// Overall top pools by TVL.
    pub top_n: usize,
    /// Pools containing both traded tokens.
    pub top_n_direct_swaps: usize,
    /// Top pools containing the input respectively output token.
    pub top_n_token_in_out: usize,
    /// Pools added per second hop token.
    pub top_n_second_hop: usize,
    /// Per-token overrides of `top_n_second_hop`.
    pub top_n_second_hop_for_token: HashMap<Address, usize>,
    /// Pools pairing one base token with a traded token, per base token.
    pub top_n_with_each_base_token: usize,
    /// Total cap across all base token buckets.
    pub top_n_with_base_token: usize,
    /// Tokens never used as second hops.
    pub tokens_to_avoid_on_second_hops: HashSet<Address>,
}

impl Default for PoolSelection {
    fn default() -> Self {
        Self {
            top_n: 10,
            top_n_direct_swaps: 2,
            top_n_token_in_out: 3,
            top_n_second_hop: 1,
            top_n_second_hop_for_token: HashMap::new(),
            top_n_with_each_base_token: 3,
            top_n_with_base_token: 5,
            tokens_to_avoid_on_second_hops: HashSet::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RoutingConfig {
    /// Pin all chain reads to this block; latest when omitted.
    pub block_number: Option<u64>,
    pub v2_pool_selection: PoolSelection,
    pub v3_pool_selection: PoolSelection,
    pub stable_pool_selection: PoolSelection,
    /// Hop limit for route enumeration.
    pub max_swaps_per_path: usize,
    pub min_splits: usize,
    pub max_splits: usize,
    /// Granularity of the trade fractions, an integer percentage that evenly
    /// divides 100.
    pub distribution_percent: u32,
    /// Reject plans drawing from a single protocol.
    pub force_cross_protocol: bool,
    /// The protocols to consider.
    pub protocols: Vec<Protocol>,
    /// Extra gas added to every route, e.g. for permits or wrapping.
    pub additional_gas_overhead: U256,
    /// Additionally express gas costs in this token.
    pub gas_token: Option<Address>,
    /// Tokens whose pools are never considered.
    pub blocked_tokens: HashSet<Address>,
    /// Overall routing deadline.
    pub deadline: Option<Duration>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            block_number: None,
            v2_pool_selection: PoolSelection::default(),
            v3_pool_selection: PoolSelection::default(),
            stable_pool_selection: PoolSelection::default(),
            max_swaps_per_path: 5,
            min_splits: 1,
            max_splits: 7,
            distribution_percent: 5,
            force_cross_protocol: false,
            protocols: vec![
                Protocol::V2,
                Protocol::V3,
                Protocol::Stable,
                Protocol::StableWrapper,
                Protocol::Mixed,
            ],
            additional_gas_overhead: U256::ZERO,
            gas_token: None,
            blocked_tokens: HashSet::new(),
            deadline: Some(Duration::from_secs(30)),
        }
    }
}

impl RoutingConfig {
    pub fn selection_for(&self, protocol: Protocol) -> &PoolSelection {
        match protocol {
            Protocol::V2 => &self.v2_pool_selection,
            Protocol::V3 => &self.v3_pool_selection,
            _ => &self.stable_pool_selection,
        }
    }

    pub fn considers(&self, protocol: Protocol) -> bool {
        self.protocols.contains(&protocol)
    }
}

/// Parameters consumed by the downstream call data encoder; opaque to the
/// route search itself.
#[derive(Clone, Debug)]
pub struct SwapConfig {
    pub recipient: Address,
    /// Slippage tolerance in basis points.
    pub slippage_bps: u32,
    /// Unix timestamp after which the swap transaction must not execute.
    pub deadline: u64,
    pub router_version: SwapRouterVersion,
    /// Pre-signed permit payload, when the caller uses one.
    pub permit: Option<Bytes>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SwapRouterVersion {
    V1,
    V2,
}
