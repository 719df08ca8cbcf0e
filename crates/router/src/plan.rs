//! The routing result types.

use {
    crate::{config::SwapConfig, gas::RouteGasEstimate, routes::Route},
    alloy::primitives::{Address, Bytes, U256},
    anyhow::Result,
    model::{TokenAmount, TradeType},
};

/// One sub-route of a plan, carrying a fraction of the whole trade.
#[derive(Clone, Debug)]
pub struct RouteWithQuote {
    pub route: Route,
    /// Integer percentage of the whole trade, a multiple of the configured
    /// distribution percent.
    pub percent: u32,
    /// The fixed-side amount this route carries.
    pub amount: TokenAmount,
    /// The raw on-chain quote for that amount.
    pub quote: TokenAmount,
    /// The quote adjusted by this route's gas cost: reduced for exact input
    /// (output received after gas), increased for exact output (input needed
    /// including gas).
    pub quote_adjusted: TokenAmount,
    pub gas: RouteGasEstimate,
}

impl RouteWithQuote {
    pub fn new(
        route: Route,
        percent: u32,
        amount: TokenAmount,
        quote: TokenAmount,
        gas: RouteGasEstimate,
        trade_type: TradeType,
    ) -> Self {
        let quote_adjusted = match trade_type {
            TradeType::ExactInput => quote.checked_sub(&gas.gas_cost_in_quote_token),
            TradeType::ExactOutput => quote.checked_add(&gas.gas_cost_in_quote_token),
        }
        .expect("quote and gas cost are denominated in the same token");
        Self {
            route,
            percent,
            amount,
            quote,
            quote_adjusted,
            gas,
        }
    }
}

/// Call parameters for submitting the plan to the on-chain router contract.
#[derive(Clone, Debug)]
pub struct MethodParameters {
    pub to: Address,
    pub calldata: Bytes,
    pub value: U256,
}

/// Assembles submittable call data for a plan. Implemented by the downstream
/// SDK; the route search itself never encodes call data.
pub trait SwapEncoding: Send + Sync {
    fn encode(&self, plan: &Plan, config: &SwapConfig) -> Result<MethodParameters>;
}

/// The final routing result: an ordered list of sub-routes whose fractions
/// sum to exactly 100.
#[derive(Clone, Debug)]
pub struct Plan {
    pub routes: Vec<RouteWithQuote>,
    pub trade_type: TradeType,
    /// Aggregate raw quote.
    pub quote: TokenAmount,
    /// Aggregate gas adjusted quote.
    pub quote_gas_adjusted: TokenAmount,
    /// Aggregate gas units.
    pub gas_estimate: U256,
    pub gas_cost_native: U256,
    pub gas_cost_in_quote_token: TokenAmount,
    pub gas_cost_in_usd: TokenAmount,
    pub gas_cost_in_gas_token: Option<TokenAmount>,
    /// The block the chain reads were pinned to.
    pub block_number: u64,
    /// Whether the caller has to wrap native currency before the swap.
    pub wrap_native_input: bool,
    /// Whether the output is unwrapped back to native currency.
    pub unwrap_native_output: bool,
    /// Present when a call data encoder is configured.
    pub method_parameters: Option<MethodParameters>,
}

impl Plan {
    /// Aggregates the selected sub-routes into a plan. Panics on an empty
    /// route list, which the split optimizer never produces.
    pub fn assemble(
        routes: Vec<RouteWithQuote>,
        trade_type: TradeType,
        block_number: u64,
        wrap_native_input: bool,
        unwrap_native_output: bool,
    ) -> Self {
        assert!(!routes.is_empty(), "plan needs at least one route");
        let sum = |amounts: &mut dyn Iterator<Item = TokenAmount>| {
            amounts
                .reduce(|total, amount| {
                    total
                        .checked_add(&amount)
                        .expect("plan amounts share a token")
                })
                .unwrap()
        };
        let quote = sum(&mut routes.iter().map(|route| route.quote.clone()));
        let quote_gas_adjusted =
            sum(&mut routes.iter().map(|route| route.quote_adjusted.clone()));
        let gas_cost_in_quote_token = sum(&mut routes
            .iter()
            .map(|route| route.gas.gas_cost_in_quote_token.clone()));
        let gas_cost_in_usd =
            sum(&mut routes.iter().map(|route| route.gas.gas_cost_in_usd.clone()));
        let gas_cost_in_gas_token = routes
            .iter()
            .map(|route| route.gas.gas_cost_in_gas_token.clone())
            .collect::<Option<Vec<_>>>()
            .map(|amounts| sum(&mut amounts.into_iter()));
        Self {
            gas_estimate: routes
                .iter()
                .fold(U256::ZERO, |total, route| total + route.gas.gas_estimate),
            gas_cost_native: routes
                .iter()
                .fold(U256::ZERO, |total, route| total + route.gas.gas_cost_native),
            routes,
            trade_type,
            quote,
            quote_gas_adjusted,
            gas_cost_in_quote_token,
            gas_cost_in_usd,
            gas_cost_in_gas_token,
            block_number,
            wrap_native_input,
            unwrap_native_output,
            method_parameters: None,
        }
    }

    /// The protocols the plan draws liquidity from.
    pub fn protocols(&self) -> std::collections::HashSet<crate::pools::Protocol> {
        self.routes
            .iter()
            .map(|route| route.route.protocol())
            .collect()
    }
}
