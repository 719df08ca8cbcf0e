//! On-chain quoting of (route, amount) pairs.
//!
//! Quoting delegates to quoter contracts simulating the swaps so the
//! per-protocol pricing math is never re-implemented off-chain. Many quotes
//! are packed into few RPC round trips through the multicall; individual
//! reverts simply yield no quote for that route and amount.

use {
    crate::{
        pools::{Pool, Protocol},
        routes::Route,
    },
    alloy::{
        eips::BlockId,
        primitives::{Address, Bytes, U256},
        sol_types::SolCall,
    },
    anyhow::{Context as _, Result},
    async_trait::async_trait,
    contracts::{MixedRouteQuoter, QuoterV2, UniswapV2Router},
    ethrpc::multicall::{BatchExecuting, Call, CallOutcome, ContractExecutor, MulticallExecutor},
    model::{Chain, TokenAmount, TradeType},
    thiserror::Error,
    tracing::instrument,
};

/// Flags stored in the fee slot of a mixed route path for hops that are not
/// concentrated liquidity pools. The high bit distinguishes them from any
/// valid fee tier.
const V2_HOP_FLAG: u32 = 0x800000;
const STABLE_HOP_FLAG: u32 = 0x800001;
const WRAPPER_HOP_FLAG: u32 = 0x800002;

/// The quote for one fractional amount of one route.
#[derive(Clone, Debug)]
pub struct AmountQuote {
    pub amount: TokenAmount,
    /// The raw on-chain quote, `None` when the quoter reverted for this
    /// amount.
    pub quote: Option<U256>,
    /// Gas use reported by the quoter; zero for protocols whose quoter does
    /// not report one.
    pub gas_estimate: U256,
    /// Concentrated liquidity only: price after the swap, per hop.
    pub sqrt_price_after: Vec<U256>,
    /// Concentrated liquidity only: initialized ticks crossed, per hop.
    pub initialized_ticks_crossed: Vec<u32>,
}

#[derive(Clone, Debug)]
pub struct RouteWithQuotes {
    pub route: Route,
    pub quotes: Vec<AmountQuote>,
}

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("trade type not supported for this protocol")]
    UnsupportedTradeType,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait QuoteFetching: Send + Sync {
    /// Quotes every route for every amount. The result preserves route order
    /// and contains one entry per amount for each route.
    async fn quotes(
        &self,
        routes: &[Route],
        amounts: &[TokenAmount],
        trade_type: TradeType,
        block: Option<u64>,
    ) -> Result<Vec<RouteWithQuotes>, QuoteError>;
}

pub struct OnChainQuoteFetcher<E = ContractExecutor> {
    multicall: MulticallExecutor<E>,
    quoter: Address,
    mixed_quoter: Address,
    v2_router: Address,
}

impl OnChainQuoteFetcher<ContractExecutor> {
    pub fn new(web3: &ethrpc::Web3, chain: Chain, config: ethrpc::multicall::Config) -> Result<Self> {
        Ok(Self {
            multicall: MulticallExecutor::new(web3, chain.id(), config)?,
            quoter: QuoterV2::deployment(chain.id())?,
            mixed_quoter: MixedRouteQuoter::deployment(chain.id())?,
            v2_router: UniswapV2Router::deployment(chain.id())?,
        })
    }
}

impl<E> OnChainQuoteFetcher<E>
where
    E: BatchExecuting,
{
    pub fn with_executor(
        multicall: MulticallExecutor<E>,
        quoter: Address,
        mixed_quoter: Address,
        v2_router: Address,
    ) -> Self {
        Self {
            multicall,
            quoter,
            mixed_quoter,
            v2_router,
        }
    }

    fn encode(
        &self,
        route: &Route,
        amount: U256,
        trade_type: TradeType,
    ) -> Result<(Call, Decoder), QuoteError> {
        let (target, calldata, decoder) = match (route.protocol(), trade_type) {
            (Protocol::V3, TradeType::ExactInput) => (
                self.quoter,
                QuoterV2::quoteExactInputCall {
                    path: encode_v3_path(route, false),
                    amountIn: amount,
                }
                .abi_encode(),
                Decoder::V3Input,
            ),
            (Protocol::V3, TradeType::ExactOutput) => (
                self.quoter,
                QuoterV2::quoteExactOutputCall {
                    // The path of an exact output quote runs from the output
                    // token back to the input token.
                    path: encode_v3_path(route, true),
                    amountOut: amount,
                }
                .abi_encode(),
                Decoder::V3Output,
            ),
            (Protocol::V2, TradeType::ExactInput) => (
                self.v2_router,
                UniswapV2Router::getAmountsOutCall {
                    amountIn: amount,
                    path: route.token_path().to_vec(),
                }
                .abi_encode(),
                Decoder::V2Input,
            ),
            (Protocol::V2, TradeType::ExactOutput) => (
                self.v2_router,
                UniswapV2Router::getAmountsInCall {
                    amountOut: amount,
                    path: route.token_path().to_vec(),
                }
                .abi_encode(),
                Decoder::V2Output,
            ),
            (_, TradeType::ExactInput) => (
                self.mixed_quoter,
                MixedRouteQuoter::quoteExactInputCall {
                    path: encode_mixed_path(route),
                    amountIn: amount,
                }
                .abi_encode(),
                Decoder::Mixed,
            ),
            // The mixed route quoter cannot run swaps backwards.
            (_, TradeType::ExactOutput) => return Err(QuoteError::UnsupportedTradeType),
        };
        Ok((
            Call {
                target,
                calldata: calldata.into(),
            },
            decoder,
        ))
    }
}

#[async_trait]
impl<E> QuoteFetching for OnChainQuoteFetcher<E>
where
    E: BatchExecuting,
{
    #[instrument(skip_all, fields(routes = routes.len(), amounts = amounts.len()))]
    async fn quotes(
        &self,
        routes: &[Route],
        amounts: &[TokenAmount],
        trade_type: TradeType,
        block: Option<u64>,
    ) -> Result<Vec<RouteWithQuotes>, QuoteError> {
        let mut calls = Vec::with_capacity(routes.len() * amounts.len());
        let mut decoders = Vec::with_capacity(calls.capacity());
        for route in routes {
            for amount in amounts {
                let raw = amount
                    .as_raw()
                    .context("fractional amount out of range")?;
                let (call, decoder) = self.encode(route, raw, trade_type)?;
                calls.push(call);
                decoders.push(decoder);
            }
        }

        let outcomes = self
            .multicall
            .aggregate(calls, block.map(BlockId::number))
            .await;

        let mut quoted = outcomes
            .into_iter()
            .zip(decoders)
            .map(|(outcome, decoder)| decoder.decode(outcome));
        Ok(routes
            .iter()
            .map(|route| RouteWithQuotes {
                route: route.clone(),
                quotes: amounts
                    .iter()
                    .map(|amount| {
                        let (quote, gas_estimate, sqrt_price_after, ticks) =
                            quoted.next().expect("one outcome per route and amount");
                        if quote.is_none() {
                            tracing::trace!(route = route.id(), "skipping reverted quote");
                        }
                        AmountQuote {
                            amount: amount.clone(),
                            quote,
                            gas_estimate,
                            sqrt_price_after,
                            initialized_ticks_crossed: ticks,
                        }
                    })
                    .collect(),
            })
            .collect())
    }
}

#[derive(Clone, Copy, Debug)]
enum Decoder {
    V3Input,
    V3Output,
    V2Input,
    V2Output,
    Mixed,
}

type DecodedQuote = (Option<U256>, U256, Vec<U256>, Vec<u32>);

impl Decoder {
    fn decode(self, outcome: CallOutcome<Bytes>) -> DecodedQuote {
        let none = (None, U256::ZERO, Vec::new(), Vec::new());
        let CallOutcome::Ok { data, .. } = outcome else {
            return none;
        };
        match self {
            Self::V3Input => match QuoterV2::quoteExactInputCall::abi_decode_returns(&data) {
                Ok(returns) => (
                    Some(returns.amountOut),
                    returns.gasEstimate,
                    returns
                        .sqrtPriceX96AfterList
                        .into_iter()
                        .map(U256::from)
                        .collect(),
                    returns.initializedTicksCrossedList,
                ),
                Err(_) => none,
            },
            Self::V3Output => match QuoterV2::quoteExactOutputCall::abi_decode_returns(&data) {
                Ok(returns) => (
                    Some(returns.amountIn),
                    returns.gasEstimate,
                    returns
                        .sqrtPriceX96AfterList
                        .into_iter()
                        .map(U256::from)
                        .collect(),
                    returns.initializedTicksCrossedList,
                ),
                Err(_) => none,
            },
            Self::V2Input => match UniswapV2Router::getAmountsOutCall::abi_decode_returns(&data) {
                Ok(amounts) => (
                    amounts.last().copied(),
                    U256::ZERO,
                    Vec::new(),
                    Vec::new(),
                ),
                Err(_) => none,
            },
            Self::V2Output => match UniswapV2Router::getAmountsInCall::abi_decode_returns(&data) {
                Ok(amounts) => (
                    amounts.first().copied(),
                    U256::ZERO,
                    Vec::new(),
                    Vec::new(),
                ),
                Err(_) => none,
            },
            Self::Mixed => match MixedRouteQuoter::quoteExactInputCall::abi_decode_returns(&data) {
                Ok(returns) => (
                    Some(returns.amountOut),
                    returns.v3SwapGasEstimate,
                    returns
                        .v3SqrtPriceX96AfterList
                        .into_iter()
                        .map(U256::from)
                        .collect(),
                    returns.v3InitializedTicksCrossedList,
                ),
                Err(_) => none,
            },
        }
    }
}

/// Packed path encoding of a concentrated liquidity route: 20 byte token,
/// 3 byte fee, 20 byte token, and so on. Exact output paths run backwards.
fn encode_v3_path(route: &Route, reverse: bool) -> Bytes {
    let mut tokens: Vec<Address> = route.token_path().to_vec();
    let mut fees: Vec<u32> = route
        .pools()
        .iter()
        .map(|pool| match pool {
            Pool::V3(pool) => pool.fee.as_raw(),
            _ => unreachable!("v3 path over non-v3 pool"),
        })
        .collect();
    if reverse {
        tokens.reverse();
        fees.reverse();
    }
    encode_packed_path(&tokens, &fees)
}

/// Packed path of a mixed route. Hops through pools without fee tiers carry a
/// protocol flag in the fee slot instead.
fn encode_mixed_path(route: &Route) -> Bytes {
    let fees: Vec<u32> = route
        .pools()
        .iter()
        .map(|pool| match pool {
            Pool::V3(pool) => pool.fee.as_raw(),
            Pool::V2(_) => V2_HOP_FLAG,
            Pool::Stable(_) => STABLE_HOP_FLAG,
            Pool::StableWrapper(_) => WRAPPER_HOP_FLAG,
        })
        .collect();
    encode_packed_path(route.token_path(), &fees)
}

fn encode_packed_path(tokens: &[Address], fees: &[u32]) -> Bytes {
    let mut path = Vec::with_capacity(tokens.len() * 20 + fees.len() * 3);
    path.extend_from_slice(tokens[0].as_slice());
    for (fee, token) in fees.iter().zip(&tokens[1..]) {
        path.extend_from_slice(&fee.to_be_bytes()[1..]);
        path.extend_from_slice(token.as_slice());
    }
    path.into()
}
