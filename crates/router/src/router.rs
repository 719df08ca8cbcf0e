//! The routing entry point, driving candidate selection, route enumeration,
//! quoting, gas modeling and split optimization.

use {
    crate::{
        config::{RoutingConfig, SwapConfig},
        error::RouterError,
        gas::{self, GasModel, GasModelPools, RouteGasEstimate, l1},
        gas_price::GasPriceEstimating,
        plan::{Plan, RouteWithQuote, SwapEncoding},
        pools::{Pool, Protocol},
        quoting::{QuoteError, QuoteFetching, RouteWithQuotes},
        routes::{Route, compute_all_mixed_routes, compute_all_routes},
        selection::select_candidate_pools,
        sources::{
            PoolFetching,
            PoolListing,
            SubgraphPool,
            SubgraphPoolExtras,
            stable::StablePoolKey,
            uniswap_v3::V3PoolKey,
        },
        token_info::TokenInfoFetching,
        tokens,
    },
    alloy::primitives::{Address, U256},
    anyhow::{Context as _, Result},
    ethrpc::current_block::BlockFetching,
    model::{
        Chain,
        Currency,
        CurrencyAmount,
        PoolId,
        Token,
        TokenAmount,
        TokenPair,
        TradeType,
    },
    std::sync::Arc,
    tracing::instrument,
};

/// The collaborating providers the router drives. Per-protocol sources are
/// optional; protocols without a source are simply not routed through.
pub struct Providers {
    pub v2_listing: Option<Arc<dyn PoolListing>>,
    pub v2_fetcher: Option<Arc<dyn PoolFetching<TokenPair>>>,
    pub v3_listing: Option<Arc<dyn PoolListing>>,
    pub v3_fetcher: Option<Arc<dyn PoolFetching<V3PoolKey>>>,
    pub stable_listing: Option<Arc<dyn PoolListing>>,
    pub stable_fetcher: Option<Arc<dyn PoolFetching<StablePoolKey>>>,
    pub token_info: Arc<dyn TokenInfoFetching>,
    pub quote_fetcher: Arc<dyn QuoteFetching>,
    pub gas_price: Arc<dyn GasPriceEstimating>,
    pub block: Option<Arc<dyn BlockFetching>>,
    pub l2_gas_data: Option<Arc<dyn l1::L2GasDataProviding>>,
    pub swap_encoder: Option<Arc<dyn SwapEncoding>>,
}

pub struct Router {
    chain: Chain,
    providers: Providers,
}

/// Resolves a raw chain id into a supported chain.
pub fn supported_chain(chain_id: u64) -> Result<Chain, RouterError> {
    Chain::from_chain_id(chain_id).ok_or(RouterError::UnsupportedChain(chain_id))
}

/// Per-chain subgraph endpoints for the remote listing providers.
#[derive(Clone, Debug, Default)]
pub struct SubgraphUrls {
    pub v2: Option<url::Url>,
    pub v3: Option<url::Url>,
    pub stable: Option<url::Url>,
}

impl SubgraphUrls {
    /// Reads `SUBGRAPH_URL_{V2,V3,STABLE}_{chain_id}` from the environment;
    /// unset sources are simply not routed through.
    pub fn from_env(chain: Chain) -> Self {
        let url = |source: &str| {
            std::env::var(format!("SUBGRAPH_URL_{source}_{}", chain.id()))
                .ok()
                .and_then(|url| url.parse().ok())
        };
        Self {
            v2: url("V2"),
            v3: url("V3"),
            stable: url("STABLE"),
        }
    }
}

impl Router {
    pub fn new(chain: Chain, providers: Providers) -> Self {
        Self { chain, providers }
    }

    /// Wires a router against a node with the default provider stack: remote
    /// pool listings (with a static seed fallback on mainnet), cached
    /// on-chain pool fetchers, the on-chain quoters, and the chain's gas and
    /// L1 fee oracles.
    pub fn with_node(
        web3: &ethrpc::Web3,
        chain_id: u64,
        subgraphs: SubgraphUrls,
    ) -> Result<Self, RouterError> {
        use {
            crate::{
                pool_cache::{CacheConfig, CachedPoolFetcher},
                quoting::OnChainQuoteFetcher,
                sources::{
                    FallbackPoolProvider,
                    StaticPoolProvider,
                    mainnet_seed_pools,
                    stable,
                    uniswap_v2,
                    uniswap_v3,
                },
                token_info::{CachedTokenInfoFetcher, TokenInfoFetcher},
            },
            ethrpc::{current_block::NodeBlockFetcher, multicall::MulticallExecutor},
            std::time::Duration,
        };

        let chain = supported_chain(chain_id)?;
        let multicall = Arc::new(MulticallExecutor::new(web3, chain.id(), Default::default())?);
        let client = reqwest::Client::new();
        let cache = CacheConfig::default();
        let negative_cache_time = Duration::from_secs(600);

        let v2_listing: Option<Arc<dyn PoolListing>> = subgraphs.v2.map(|url| {
            Arc::new(FallbackPoolProvider::new(vec![Arc::new(
                uniswap_v2::V2SubgraphClient::new(url, client.clone()),
            ) as _])) as _
        });
        let v2_fetcher: Option<Arc<dyn PoolFetching<TokenPair>>> = v2_listing
            .is_some()
            .then(|| -> Result<_> {
                Ok(Arc::new(CachedPoolFetcher::new(
                    Arc::new(uniswap_v2::PoolFetcher::new(
                        chain,
                        multicall.clone(),
                        negative_cache_time,
                    )?),
                    chain,
                    cache,
                )) as _)
            })
            .transpose()?;

        let v3_listing: Option<Arc<dyn PoolListing>> = subgraphs.v3.map(|url| {
            let mut providers: Vec<Arc<dyn PoolListing>> = vec![Arc::new(
                uniswap_v3::V3SubgraphClient::new(url, client.clone()),
            )];
            if chain == Chain::Mainnet {
                providers.push(Arc::new(StaticPoolProvider::new(mainnet_seed_pools())));
            }
            Arc::new(FallbackPoolProvider::new(providers)) as _
        });
        let v3_fetcher: Option<Arc<dyn PoolFetching<V3PoolKey>>> =
            Some(Arc::new(CachedPoolFetcher::new(
                Arc::new(uniswap_v3::PoolFetcher::new(chain, multicall.clone())?),
                chain,
                cache,
            )) as _);

        let stable_listing: Option<Arc<dyn PoolListing>> = subgraphs.stable.map(|url| {
            Arc::new(FallbackPoolProvider::new(vec![Arc::new(
                stable::StableSubgraphClient::new(url, client.clone()),
            ) as _])) as _
        });
        let stable_fetcher: Option<Arc<dyn PoolFetching<StablePoolKey>>> = stable_listing
            .is_some()
            .then(|| -> Result<_> {
                Ok(Arc::new(CachedPoolFetcher::new(
                    Arc::new(stable::PoolFetcher::new(chain, multicall.clone())?),
                    chain,
                    cache,
                )) as _)
            })
            .transpose()?;

        let token_info = Arc::new(
            CachedTokenInfoFetcher::new(
                Arc::new(TokenInfoFetcher { web3: web3.clone() }),
                None,
            )
            .with_seed_tokens(chain),
        );

        Ok(Self::new(
            chain,
            Providers {
                v2_listing,
                v2_fetcher,
                v3_listing,
                v3_fetcher,
                stable_listing,
                stable_fetcher,
                token_info,
                quote_fetcher: Arc::new(OnChainQuoteFetcher::new(
                    web3,
                    chain,
                    Default::default(),
                )?),
                gas_price: Arc::new(crate::gas_price::NativeGasPriceEstimator::new(web3.clone())),
                block: Some(Arc::new(NodeBlockFetcher::new(web3.clone()))),
                l2_gas_data: l1::for_chain(web3, chain),
                swap_encoder: None,
            },
        ))
    }

    /// Finds the highest value plan for the trade, or `None` when the
    /// constraints cannot be satisfied (e.g. a forced cross protocol plan
    /// does not exist).
    #[instrument(skip_all, fields(chain = %self.chain, ?trade_type))]
    pub async fn route(
        &self,
        amount: CurrencyAmount,
        quote_currency: Currency,
        trade_type: TradeType,
        swap_config: Option<&SwapConfig>,
        config: Option<RoutingConfig>,
    ) -> Result<Option<Plan>, RouterError> {
        let config = config.unwrap_or_default();
        self.validate(&amount, &quote_currency, trade_type, &config)?;

        let search = self.route_inner(&amount, &quote_currency, trade_type, swap_config, &config);
        match config.deadline {
            Some(deadline) => tokio::time::timeout(deadline, search)
                .await
                .map_err(|_| RouterError::Timeout)?,
            None => search.await,
        }
    }

    fn validate(
        &self,
        amount: &CurrencyAmount,
        quote_currency: &Currency,
        trade_type: TradeType,
        config: &RoutingConfig,
    ) -> Result<(), RouterError> {
        for currency in [&amount.currency, quote_currency] {
            if currency.chain() != self.chain {
                return Err(RouterError::InvalidInput(format!(
                    "currency on {} but router serves {}",
                    currency.chain(),
                    self.chain
                )));
            }
        }
        if amount.currency.wrapped() == quote_currency.wrapped() {
            return Err(RouterError::InvalidInput(
                "cannot trade a token against itself".to_string(),
            ));
        }
        if amount.amount.is_zero() {
            return Err(RouterError::InvalidInput("zero trade amount".to_string()));
        }
        if config.distribution_percent == 0 || 100 % config.distribution_percent != 0 {
            return Err(RouterError::InvalidInput(
                "distribution percent must evenly divide 100".to_string(),
            ));
        }
        if config.min_splits == 0 || config.min_splits > config.max_splits {
            return Err(RouterError::InvalidInput(
                "invalid split window".to_string(),
            ));
        }
        if config.protocols.is_empty() {
            return Err(RouterError::InvalidInput(
                "no protocols requested".to_string(),
            ));
        }
        // Exact output quoting only exists for constant product and
        // concentrated liquidity pools; refuse rather than silently degrade
        // when nothing else was requested.
        if trade_type == TradeType::ExactOutput
            && !config.considers(Protocol::V2)
            && !config.considers(Protocol::V3)
        {
            return Err(RouterError::UnsupportedTradeType);
        }
        Ok(())
    }

    async fn route_inner(
        &self,
        amount: &CurrencyAmount,
        quote_currency: &Currency,
        trade_type: TradeType,
        swap_config: Option<&SwapConfig>,
        config: &RoutingConfig,
    ) -> Result<Option<Plan>, RouterError> {
        // Wrap native currencies for internal math; the plan records the
        // caller's wrap and unwrap duties.
        let (input_currency, output_currency) = match trade_type {
            TradeType::ExactInput => (&amount.currency, quote_currency),
            TradeType::ExactOutput => (quote_currency, &amount.currency),
        };
        let token_in = input_currency.wrapped();
        let token_out = output_currency.wrapped();
        let quote_token = quote_currency.wrapped();
        let wrap_native_input = input_currency.is_native();
        let unwrap_native_output = output_currency.is_native();
        let block = config.block_number;

        let gas_price = self.providers.gas_price.estimate().await?;

        // Load candidate pools for every enabled protocol concurrently.
        let (v2, v3, stable) = futures::join!(
            self.load_v2_pools(token_in.address, token_out.address, trade_type, config),
            self.load_v3_pools(token_in.address, token_out.address, trade_type, config),
            self.load_stable_pools(token_in.address, token_out.address, trade_type, config),
        );
        let mut failures = Vec::new();
        let mut unpack = |result: Result<Option<Vec<Pool>>>, protocol: Protocol| match result {
            Ok(pools) => pools.unwrap_or_default(),
            Err(err) => {
                tracing::warn!(?err, %protocol, "pool loading failed; continuing without");
                failures.push(err);
                Vec::new()
            }
        };
        let v2_pools = unpack(v2, Protocol::V2);
        let v3_pools = unpack(v3, Protocol::V3);
        let stable_all = unpack(stable, Protocol::Stable);
        if v2_pools.is_empty() && v3_pools.is_empty() && stable_all.is_empty() {
            if let Some(err) = failures.pop() {
                return Err(RouterError::RpcFailure(err));
            }
            return Err(RouterError::NoRouteFound);
        }
        let (stable_pools, wrapper_pools): (Vec<Pool>, Vec<Pool>) = stable_all
            .into_iter()
            .partition(|pool| matches!(pool, Pool::Stable(_)));

        // Enumerate per protocol, short-circuiting empty ones.
        let mut route_sets: Vec<Vec<Route>> = Vec::new();
        let supports_trade = |protocol: Protocol| {
            trade_type == TradeType::ExactInput
                || matches!(protocol, Protocol::V2 | Protocol::V3)
        };
        if config.considers(Protocol::V2) && supports_trade(Protocol::V2) {
            route_sets.push(compute_all_routes(
                token_in.address,
                token_out.address,
                &v2_pools,
                config.max_swaps_per_path,
            ));
        }
        if config.considers(Protocol::V3) && supports_trade(Protocol::V3) {
            route_sets.push(compute_all_routes(
                token_in.address,
                token_out.address,
                &v3_pools,
                config.max_swaps_per_path,
            ));
        }
        if config.considers(Protocol::Stable) && supports_trade(Protocol::Stable) {
            route_sets.push(compute_all_routes(
                token_in.address,
                token_out.address,
                &stable_pools,
                config.max_swaps_per_path,
            ));
        }
        if config.considers(Protocol::StableWrapper) && supports_trade(Protocol::StableWrapper) {
            route_sets.push(compute_all_routes(
                token_in.address,
                token_out.address,
                &wrapper_pools,
                config.max_swaps_per_path,
            ));
        }
        if config.considers(Protocol::Mixed) && supports_trade(Protocol::Mixed) {
            // Mixed routes draw from the union of the concentrated liquidity
            // and stable candidate pools.
            let union: Vec<Pool> = v3_pools
                .iter()
                .chain(&stable_pools)
                .chain(&wrapper_pools)
                .cloned()
                .collect();
            route_sets.push(compute_all_mixed_routes(
                token_in.address,
                token_out.address,
                &union,
                config.max_swaps_per_path,
            ));
        }
        if route_sets.iter().all(Vec::is_empty) {
            return Err(RouterError::NoRouteFound);
        }

        // One amount per fraction step.
        let trade_amount = amount.wrapped();
        let percents: Vec<u32> = (1..=(100 / config.distribution_percent))
            .map(|step| step * config.distribution_percent)
            .collect();
        let amounts: Vec<TokenAmount> = percents
            .iter()
            .map(|percent| trade_amount.percent(*percent))
            .collect();

        // Quote all routes of all protocols concurrently.
        let quoted = futures::future::join_all(route_sets.iter().filter(|routes| !routes.is_empty()).map(
            |routes| {
                self.providers
                    .quote_fetcher
                    .quotes(routes, &amounts, trade_type, block)
            },
        ))
        .await;
        let mut routes_with_quotes: Vec<RouteWithQuotes> = Vec::new();
        for result in quoted {
            match result {
                Ok(quotes) => routes_with_quotes.extend(quotes),
                Err(QuoteError::UnsupportedTradeType) => {
                    return Err(RouterError::UnsupportedTradeType);
                }
                Err(QuoteError::Other(err)) => {
                    tracing::warn!(?err, "quoting failed; continuing without");
                }
            }
        }

        // Locate the gas reference pools among everything materialized.
        let all_pools: Vec<Pool> = v3_pools
            .iter()
            .chain(&v2_pools)
            .chain(&stable_pools)
            .chain(&wrapper_pools)
            .cloned()
            .collect();
        let (usd_token, gas_model_pools, gas_token) = self
            .gas_references(&all_pools, &quote_token, config, block)
            .await?;
        let gas_model = GasModel::new(
            self.chain,
            gas_price,
            quote_token.clone(),
            usd_token,
            gas_token,
            gas_model_pools,
            config.additional_gas_overhead,
        );

        // Convert quotes into gas adjusted candidates for the split search.
        let mut candidates = Vec::new();
        for RouteWithQuotes { route, quotes } in routes_with_quotes {
            for (index, quote) in quotes.into_iter().enumerate() {
                let Some(quoted_amount) = quote.quote else {
                    continue;
                };
                let gas_estimate = gas_model.estimate_route(&route, &quote);
                candidates.push(RouteWithQuote::new(
                    route.clone(),
                    percents[index],
                    quote.amount.clone(),
                    TokenAmount::from_raw(quote_token.clone(), quoted_amount),
                    gas_estimate,
                    trade_type,
                ));
            }
        }
        if candidates.is_empty() {
            return Err(RouterError::NoRouteFound);
        }

        let split_config = crate::split::SplitConfig {
            distribution_percent: config.distribution_percent,
            min_splits: config.min_splits,
            max_splits: config.max_splits,
            force_cross_protocol: config.force_cross_protocol,
        };
        let Some(mut winning_routes) =
            crate::split::best_swap_route(&candidates, trade_type, &split_config)
        else {
            return Ok(None);
        };

        // On rollups the winning plan additionally pays for posting its
        // calldata to the settlement layer.
        if let Some(l2_gas_data) = &self.providers.l2_gas_data {
            winning_routes = self
                .apply_l1_fees(winning_routes, &gas_model, l2_gas_data.as_ref(), trade_type, block)
                .await;
        }

        let block_number = match block {
            Some(block) => block,
            None => match &self.providers.block {
                Some(fetcher) => fetcher.current_block().await.unwrap_or_default(),
                None => 0,
            },
        };
        let mut plan = Plan::assemble(
            winning_routes,
            trade_type,
            block_number,
            wrap_native_input,
            unwrap_native_output,
        );

        if let (Some(encoder), Some(swap_config)) = (&self.providers.swap_encoder, swap_config) {
            plan.method_parameters = Some(
                encoder
                    .encode(&plan, swap_config)
                    .context("failed to encode call data")?,
            );
        }

        tracing::debug!(
            splits = plan.routes.len(),
            quote = ?plan.quote_gas_adjusted,
            "routing finished"
        );
        Ok(Some(plan))
    }

    async fn load_v2_pools(
        &self,
        token_in: Address,
        token_out: Address,
        trade_type: TradeType,
        config: &RoutingConfig,
    ) -> Result<Option<Vec<Pool>>> {
        let (Some(listing), Some(fetcher)) =
            (&self.providers.v2_listing, &self.providers.v2_fetcher)
        else {
            return Ok(None);
        };
        if !config.considers(Protocol::V2) {
            return Ok(None);
        }
        let all = listing
            .list_pools(Some(token_in), Some(token_out), config.block_number)
            .await?;
        let candidates = select_candidate_pools(
            self.chain,
            token_in,
            token_out,
            trade_type,
            Protocol::V2,
            &all,
            config.selection_for(Protocol::V2),
            &config.blocked_tokens,
        );
        let keys = v2_keys(&candidates.pools);
        Ok(Some(fetcher.fetch(&keys, config.block_number).await?))
    }

    async fn load_v3_pools(
        &self,
        token_in: Address,
        token_out: Address,
        trade_type: TradeType,
        config: &RoutingConfig,
    ) -> Result<Option<Vec<Pool>>> {
        let (Some(listing), Some(fetcher)) =
            (&self.providers.v3_listing, &self.providers.v3_fetcher)
        else {
            return Ok(None);
        };
        if !config.considers(Protocol::V3) && !config.considers(Protocol::Mixed) {
            return Ok(None);
        }
        let all = listing
            .list_pools(Some(token_in), Some(token_out), config.block_number)
            .await?;
        let candidates = select_candidate_pools(
            self.chain,
            token_in,
            token_out,
            trade_type,
            Protocol::V3,
            &all,
            config.selection_for(Protocol::V3),
            &config.blocked_tokens,
        );
        let keys = v3_keys(&candidates.pools);
        Ok(Some(fetcher.fetch(&keys, config.block_number).await?))
    }

    async fn load_stable_pools(
        &self,
        token_in: Address,
        token_out: Address,
        trade_type: TradeType,
        config: &RoutingConfig,
    ) -> Result<Option<Vec<Pool>>> {
        let (Some(listing), Some(fetcher)) =
            (&self.providers.stable_listing, &self.providers.stable_fetcher)
        else {
            return Ok(None);
        };
        if !config.considers(Protocol::Stable)
            && !config.considers(Protocol::StableWrapper)
            && !config.considers(Protocol::Mixed)
        {
            return Ok(None);
        }
        let all = listing
            .list_pools(Some(token_in), Some(token_out), config.block_number)
            .await?;
        let candidates = select_candidate_pools(
            self.chain,
            token_in,
            token_out,
            trade_type,
            Protocol::Stable,
            &all,
            config.selection_for(Protocol::Stable),
            &config.blocked_tokens,
        );
        let keys = stable_keys(&candidates.pools);
        Ok(Some(fetcher.fetch(&keys, config.block_number).await?))
    }

    /// Locates the native/USD and native/quote reference pools, probing the
    /// concentrated liquidity fetcher for them when selection did not
    /// surface any, and resolves the optional gas token.
    async fn gas_references(
        &self,
        pools: &[Pool],
        quote_token: &Token,
        config: &RoutingConfig,
        block: Option<u64>,
    ) -> Result<(Token, GasModelPools, Option<Token>), RouterError> {
        let mut probe_keys = Vec::new();
        let wrapped_native = self.chain.wrapped_native();
        let usd_candidates = tokens::usd_tokens(self.chain);

        let mut usd_pool = None;
        let mut usd_token = usd_candidates.first().cloned();
        for usd in &usd_candidates {
            if let Some(pool) =
                gas::highest_liquidity_native_pool(self.chain, usd.address, pools)
            {
                usd_pool = Some(pool);
                usd_token = Some(usd.clone());
                break;
            }
        }
        if usd_pool.is_none() {
            if let Some(usd) = usd_candidates.first() {
                probe_keys.extend(v3_probe_keys(wrapped_native, usd.address));
            }
        }

        let mut native_quote_pool = if quote_token.is_wrapped_native() {
            None
        } else {
            gas::highest_liquidity_native_pool(self.chain, quote_token.address, pools)
        };
        if native_quote_pool.is_none() && !quote_token.is_wrapped_native() {
            probe_keys.extend(v3_probe_keys(wrapped_native, quote_token.address));
        }

        let gas_token = match config.gas_token {
            Some(address) => {
                let info = self
                    .providers
                    .token_info
                    .get_token_info(address)
                    .await
                    .map_err(|err| RouterError::InvalidInput(err.to_string()))?;
                Some(Token::new(
                    self.chain,
                    address,
                    info.decimals.unwrap_or(18),
                    info.symbol,
                ))
            }
            None => None,
        };
        let mut native_gas_token_pool = None;
        if let Some(gas_token) = &gas_token {
            if !gas_token.is_wrapped_native() {
                native_gas_token_pool =
                    gas::highest_liquidity_native_pool(self.chain, gas_token.address, pools);
                if native_gas_token_pool.is_none() {
                    probe_keys.extend(v3_probe_keys(wrapped_native, gas_token.address));
                }
            }
        }

        if !probe_keys.is_empty() {
            if let Some(fetcher) = &self.providers.v3_fetcher {
                match fetcher.fetch(&probe_keys, block).await {
                    Ok(probed) => {
                        if usd_pool.is_none() {
                            for usd in &usd_candidates {
                                if let Some(pool) = gas::highest_liquidity_native_pool(
                                    self.chain,
                                    usd.address,
                                    &probed,
                                ) {
                                    usd_pool = Some(pool);
                                    usd_token = Some(usd.clone());
                                    break;
                                }
                            }
                        }
                        if native_quote_pool.is_none() {
                            native_quote_pool = gas::highest_liquidity_native_pool(
                                self.chain,
                                quote_token.address,
                                &probed,
                            );
                        }
                        if let Some(gas_token) = &gas_token {
                            if native_gas_token_pool.is_none() {
                                native_gas_token_pool = gas::highest_liquidity_native_pool(
                                    self.chain,
                                    gas_token.address,
                                    &probed,
                                );
                            }
                        }
                    }
                    Err(err) => {
                        tracing::debug!(?err, "reference pool probing failed");
                    }
                }
            }
        }

        let usd_token = usd_token.unwrap_or_else(|| Token::wrapped_native(self.chain));
        Ok((
            usd_token,
            GasModelPools {
                usd_pool,
                native_quote_pool,
                native_gas_token_pool,
            },
            gas_token,
        ))
    }

    /// Re-adjusts each winning route by its L1 data posting fee.
    async fn apply_l1_fees(
        &self,
        routes: Vec<RouteWithQuote>,
        gas_model: &GasModel,
        l2_gas_data: &dyn l1::L2GasDataProviding,
        trade_type: TradeType,
        block: Option<u64>,
    ) -> Vec<RouteWithQuote> {
        let mut adjusted = Vec::with_capacity(routes.len());
        for route in routes {
            let calldata = l1::representative_calldata(std::slice::from_ref(&route));
            match l2_gas_data.l1_data_fee(calldata, block).await {
                Ok(fee) => {
                    let extra = gas_model.convert_native_cost(fee);
                    let gas = combine_gas(&route.gas, &extra, fee);
                    adjusted.push(RouteWithQuote::new(
                        route.route,
                        route.percent,
                        route.amount,
                        route.quote,
                        gas,
                        trade_type,
                    ));
                }
                Err(err) => {
                    tracing::warn!(?err, "L1 fee estimation failed; keeping route unadjusted");
                    adjusted.push(route);
                }
            }
        }
        adjusted
    }
}

fn combine_gas(
    base: &RouteGasEstimate,
    extra: &RouteGasEstimate,
    fee: U256,
) -> RouteGasEstimate {
    RouteGasEstimate {
        gas_estimate: base.gas_estimate,
        gas_cost_native: base.gas_cost_native + fee,
        gas_cost_in_quote_token: base
            .gas_cost_in_quote_token
            .checked_add(&extra.gas_cost_in_quote_token)
            .expect("gas costs share the quote token"),
        gas_cost_in_usd: base
            .gas_cost_in_usd
            .checked_add(&extra.gas_cost_in_usd)
            .expect("gas costs share the usd token"),
        gas_cost_in_gas_token: match (&base.gas_cost_in_gas_token, &extra.gas_cost_in_gas_token) {
            (Some(base), Some(extra)) => base.checked_add(extra),
            _ => None,
        },
    }
}

fn v2_keys(pools: &[SubgraphPool]) -> Vec<TokenPair> {
    pools
        .iter()
        .filter(|pool| matches!(pool.extras, SubgraphPoolExtras::V2 { .. }))
        .filter_map(|pool| TokenPair::new(*pool.tokens.first()?, *pool.tokens.get(1)?))
        .collect()
}

fn v3_keys(pools: &[SubgraphPool]) -> Vec<V3PoolKey> {
    pools
        .iter()
        .filter_map(|pool| match pool.extras {
            SubgraphPoolExtras::V3 { fee_tier } => Some(V3PoolKey {
                pair: TokenPair::new(*pool.tokens.first()?, *pool.tokens.get(1)?)?,
                fee: fee_tier,
            }),
            _ => None,
        })
        .collect()
}

fn stable_keys(pools: &[SubgraphPool]) -> Vec<StablePoolKey> {
    pools
        .iter()
        .filter_map(|pool| match pool.id {
            // By convention the pool contract address is the first 20 bytes
            // of the pool id.
            PoolId::Stable(id) => Some(StablePoolKey {
                id,
                address: Address::from_slice(&id.as_slice()[..20]),
                wrapper: pool.wrapper(),
            }),
            _ => None,
        })
        .collect()
}

/// Keys probing every fee tier of the pair.
fn v3_probe_keys(token_a: Address, token_b: Address) -> Vec<V3PoolKey> {
    let Some(pair) = TokenPair::new(token_a, token_b) else {
        return Vec::new();
    };
    crate::pools::FeeTier::ALL
        .iter()
        .map(|fee| V3PoolKey { pair, fee: *fee })
        .collect()
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            pools::{FeeTier, V2Pool, V3Pool},
            quoting::AmountQuote,
            sources::test_util::{FakePoolFetcher, FakePoolListing},
            token_info::MockTokenInfoFetching,
        },
        async_trait::async_trait,
        std::{collections::HashMap, time::Duration},
    };

    fn address(byte: u8) -> Address {
        Address::with_last_byte(byte)
    }

    fn erc20(chain: Chain, byte: u8) -> Currency {
        Currency::Erc20(Token::new(chain, address(byte), 18, None))
    }

    fn v3_subgraph_pool(id: u8, a: Address, b: Address, tvl: f64) -> SubgraphPool {
        SubgraphPool {
            id: PoolId::Contract(address(id)),
            tokens: vec![a, b],
            tvl_native: tvl,
            tvl_usd: tvl,
            extras: SubgraphPoolExtras::V3 {
                fee_tier: FeeTier::Medium,
            },
        }
    }

    fn v2_subgraph_pool(id: u8, a: Address, b: Address, tvl: f64) -> SubgraphPool {
        SubgraphPool {
            id: PoolId::Contract(address(id)),
            tokens: vec![a, b],
            tvl_native: tvl,
            tvl_usd: tvl,
            extras: SubgraphPoolExtras::V2 { reserve: tvl },
        }
    }

    fn v3_pool(chain: Chain, id: u8, a: Address, b: Address) -> Pool {
        Pool::V3(V3Pool {
            chain,
            address: address(id),
            tokens: TokenPair::new(a, b).unwrap(),
            fee: FeeTier::Medium,
            liquidity: 1_000,
            sqrt_price: U256::ONE << 96,
        })
    }

    fn v2_pool(chain: Chain, id: u8, a: Address, b: Address) -> Pool {
        Pool::V2(V2Pool {
            chain,
            address: address(id),
            tokens: TokenPair::new(a, b).unwrap(),
            reserves: (1_000_000, 1_000_000),
        })
    }

    /// Quotes routes with a fixed rate in basis points per pool; pools
    /// without a rate behave like reverting quoter calls.
    struct FakeQuoteFetcher {
        rates: HashMap<Address, u64>,
    }

    #[async_trait]
    impl QuoteFetching for FakeQuoteFetcher {
        async fn quotes(
            &self,
            routes: &[Route],
            amounts: &[TokenAmount],
            trade_type: TradeType,
            _block: Option<u64>,
        ) -> Result<Vec<RouteWithQuotes>, QuoteError> {
            if trade_type == TradeType::ExactOutput
                && routes
                    .iter()
                    .any(|route| !matches!(route.protocol(), Protocol::V2 | Protocol::V3))
            {
                return Err(QuoteError::UnsupportedTradeType);
            }
            Ok(routes
                .iter()
                .map(|route| RouteWithQuotes {
                    route: route.clone(),
                    quotes: amounts
                        .iter()
                        .map(|amount| {
                            let mut value = Some(amount.as_raw().unwrap());
                            for pool in route.pools() {
                                value = match (value, self.rates.get(&pool.address())) {
                                    (Some(value), Some(bps)) => match trade_type {
                                        TradeType::ExactInput => {
                                            Some(value * U256::from(*bps) / U256::from(10_000))
                                        }
                                        TradeType::ExactOutput => {
                                            Some(value * U256::from(10_000) / U256::from(*bps))
                                        }
                                    },
                                    _ => None,
                                };
                            }
                            AmountQuote {
                                amount: amount.clone(),
                                quote: value,
                                gas_estimate: U256::ZERO,
                                sqrt_price_after: vec![],
                                initialized_ticks_crossed: vec![],
                            }
                        })
                        .collect(),
                })
                .collect())
        }
    }

    struct SleepyQuoteFetcher(Duration);

    #[async_trait]
    impl QuoteFetching for SleepyQuoteFetcher {
        async fn quotes(
            &self,
            _: &[Route],
            _: &[TokenAmount],
            _: TradeType,
            _: Option<u64>,
        ) -> Result<Vec<RouteWithQuotes>, QuoteError> {
            tokio::time::sleep(self.0).await;
            Ok(Vec::new())
        }
    }

    struct FixedGasPrice(u64);

    #[async_trait]
    impl GasPriceEstimating for FixedGasPrice {
        async fn estimate(&self) -> Result<U256> {
            Ok(U256::from(self.0))
        }
    }

    fn providers(quote_rates: HashMap<Address, u64>) -> Providers {
        Providers {
            v2_listing: None,
            v2_fetcher: None,
            v3_listing: None,
            v3_fetcher: None,
            stable_listing: None,
            stable_fetcher: None,
            token_info: Arc::new(MockTokenInfoFetching::new()),
            quote_fetcher: Arc::new(FakeQuoteFetcher { rates: quote_rates }),
            gas_price: Arc::new(FixedGasPrice(10)),
            block: None,
            l2_gas_data: None,
            swap_encoder: None,
        }
    }

    fn config(protocols: Vec<Protocol>) -> RoutingConfig {
        RoutingConfig {
            protocols,
            distribution_percent: 25,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn direct_swap_over_a_single_protocol() {
        let chain = Chain::ArbitrumOne;
        let (token_in, token_out) = (address(1), address(2));
        let mut providers = providers(HashMap::from([(address(10), 9_900)]));
        providers.v3_listing = Some(Arc::new(FakePoolListing(Ok(vec![v3_subgraph_pool(
            10, token_in, token_out, 100.0,
        )]))));
        providers.v3_fetcher = Some(Arc::new(FakePoolFetcher::new(vec![v3_pool(
            chain, 10, token_in, token_out,
        )])));
        let router = Router::new(chain, providers);

        let plan = router
            .route(
                CurrencyAmount::new(erc20(chain, 1), U256::from(1_000_000)),
                erc20(chain, 2),
                TradeType::ExactInput,
                None,
                Some(config(vec![Protocol::V3])),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(plan.protocols(), std::collections::HashSet::from([Protocol::V3]));
        assert!(plan.routes.len() <= 3);
        assert!(plan.quote_gas_adjusted.is_positive());
        assert_eq!(plan.quote.as_raw().unwrap(), U256::from(990_000));
        let total: u32 = plan.routes.iter().map(|route| route.percent).sum();
        assert_eq!(total, 100);
    }

    #[tokio::test]
    async fn unknown_tokens_yield_no_route_found() {
        let chain = Chain::Sepolia;
        let mut providers = providers(HashMap::new());
        providers.v3_listing = Some(Arc::new(FakePoolListing(Ok(vec![]))));
        providers.v3_fetcher = Some(Arc::new(FakePoolFetcher::new(vec![])));
        let router = Router::new(chain, providers);

        let result = router
            .route(
                CurrencyAmount::new(erc20(chain, 101), U256::from(1_000)),
                erc20(chain, 102),
                TradeType::ExactInput,
                None,
                Some(config(vec![Protocol::V3])),
            )
            .await;
        assert!(matches!(result, Err(RouterError::NoRouteFound)));
    }

    #[tokio::test]
    async fn forced_cross_protocol_plan_draws_from_both_protocols() {
        let chain = Chain::Mainnet;
        let (token_in, token_out) = (address(1), address(2));
        let mut providers = providers(HashMap::from([
            (address(10), 9_900),
            (address(11), 9_800),
        ]));
        providers.v3_listing = Some(Arc::new(FakePoolListing(Ok(vec![v3_subgraph_pool(
            10, token_in, token_out, 100.0,
        )]))));
        providers.v3_fetcher = Some(Arc::new(FakePoolFetcher::new(vec![v3_pool(
            chain, 10, token_in, token_out,
        )])));
        providers.v2_listing = Some(Arc::new(FakePoolListing(Ok(vec![v2_subgraph_pool(
            11, token_in, token_out, 90.0,
        )]))));
        providers.v2_fetcher = Some(Arc::new(FakePoolFetcher::new(vec![v2_pool(
            chain, 11, token_in, token_out,
        )])));
        let router = Router::new(chain, providers);

        let routing_config = RoutingConfig {
            force_cross_protocol: true,
            ..config(vec![Protocol::V2, Protocol::V3])
        };
        let plan = router
            .route(
                CurrencyAmount::new(erc20(chain, 1), U256::from(1_000_000)),
                erc20(chain, 2),
                TradeType::ExactInput,
                None,
                Some(routing_config),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            plan.protocols(),
            std::collections::HashSet::from([Protocol::V2, Protocol::V3])
        );
    }

    #[tokio::test]
    async fn optimistic_direct_pools_are_probed_and_quoted() {
        let chain = Chain::Mainnet;
        let (token_in, token_out) = (address(1), address(2));
        // The listing has never heard of the pair, but on-chain probing of
        // the synthetic descriptors finds one pool.
        let mut providers = providers(HashMap::from([(address(10), 9_900)]));
        providers.v3_listing = Some(Arc::new(FakePoolListing(Ok(vec![]))));
        providers.v3_fetcher = Some(Arc::new(FakePoolFetcher::new(vec![v3_pool(
            chain, 10, token_in, token_out,
        )])));
        let router = Router::new(chain, providers);

        let plan = router
            .route(
                CurrencyAmount::new(erc20(chain, 1), U256::from(1_000_000)),
                erc20(chain, 2),
                TradeType::ExactInput,
                None,
                Some(config(vec![Protocol::V3])),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(plan.quote.as_raw().unwrap(), U256::from(990_000));
    }

    #[tokio::test]
    async fn exact_output_via_v2() {
        let chain = Chain::Mainnet;
        let (token_in, token_out) = (address(1), address(2));
        let mut providers = providers(HashMap::from([(address(11), 9_900)]));
        providers.v2_listing = Some(Arc::new(FakePoolListing(Ok(vec![v2_subgraph_pool(
            11, token_in, token_out, 90.0,
        )]))));
        providers.v2_fetcher = Some(Arc::new(FakePoolFetcher::new(vec![v2_pool(
            chain, 11, token_in, token_out,
        )])));
        let router = Router::new(chain, providers);

        let plan = router
            .route(
                CurrencyAmount::new(erc20(chain, 2), U256::from(500_000)),
                erc20(chain, 1),
                TradeType::ExactOutput,
                None,
                Some(config(vec![Protocol::V2])),
            )
            .await
            .unwrap()
            .unwrap();
        // The required input including gas can never be below the nominal
        // quote.
        assert!(plan.quote_gas_adjusted >= plan.quote);
        assert_eq!(plan.quote.as_raw().unwrap(), U256::from(505_050));
    }

    #[tokio::test]
    async fn exact_output_for_stable_only_protocols_is_refused() {
        let chain = Chain::Mainnet;
        let router = Router::new(chain, providers(HashMap::new()));
        let result = router
            .route(
                CurrencyAmount::new(erc20(chain, 1), U256::from(1_000)),
                erc20(chain, 2),
                TradeType::ExactOutput,
                None,
                Some(config(vec![Protocol::Stable, Protocol::Mixed])),
            )
            .await;
        assert!(matches!(result, Err(RouterError::UnsupportedTradeType)));
    }

    #[tokio::test]
    async fn partial_protocol_failure_degrades_gracefully() {
        let chain = Chain::Mainnet;
        let (token_in, token_out) = (address(1), address(2));
        let mut providers = providers(HashMap::from([(address(11), 9_900)]));
        providers.v3_listing = Some(Arc::new(FakePoolListing(Err("subgraph down".to_string()))));
        providers.v3_fetcher = Some(Arc::new(FakePoolFetcher::new(vec![])));
        providers.v2_listing = Some(Arc::new(FakePoolListing(Ok(vec![v2_subgraph_pool(
            11, token_in, token_out, 90.0,
        )]))));
        providers.v2_fetcher = Some(Arc::new(FakePoolFetcher::new(vec![v2_pool(
            chain, 11, token_in, token_out,
        )])));
        let router = Router::new(chain, providers);

        let plan = router
            .route(
                CurrencyAmount::new(erc20(chain, 1), U256::from(1_000_000)),
                erc20(chain, 2),
                TradeType::ExactInput,
                None,
                Some(config(vec![Protocol::V2, Protocol::V3])),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            plan.protocols(),
            std::collections::HashSet::from([Protocol::V2])
        );
    }

    #[tokio::test]
    async fn failure_of_every_protocol_is_an_rpc_failure() {
        let chain = Chain::Mainnet;
        let mut providers = providers(HashMap::new());
        providers.v3_listing = Some(Arc::new(FakePoolListing(Err("down".to_string()))));
        providers.v3_fetcher = Some(Arc::new(FakePoolFetcher::new(vec![])));
        let router = Router::new(chain, providers);

        let result = router
            .route(
                CurrencyAmount::new(erc20(chain, 1), U256::from(1_000)),
                erc20(chain, 2),
                TradeType::ExactInput,
                None,
                Some(config(vec![Protocol::V3])),
            )
            .await;
        assert!(matches!(result, Err(RouterError::RpcFailure(_))));
    }

    #[tokio::test]
    async fn deadline_expiry_returns_timeout() {
        let chain = Chain::Mainnet;
        let (token_in, token_out) = (address(1), address(2));
        let mut providers = providers(HashMap::new());
        providers.v3_listing = Some(Arc::new(FakePoolListing(Ok(vec![v3_subgraph_pool(
            10, token_in, token_out, 100.0,
        )]))));
        providers.v3_fetcher = Some(Arc::new(FakePoolFetcher::new(vec![v3_pool(
            chain, 10, token_in, token_out,
        )])));
        providers.quote_fetcher = Arc::new(SleepyQuoteFetcher(Duration::from_millis(500)));
        let router = Router::new(chain, providers);

        let routing_config = RoutingConfig {
            deadline: Some(Duration::from_millis(20)),
            ..config(vec![Protocol::V3])
        };
        let result = router
            .route(
                CurrencyAmount::new(erc20(chain, 1), U256::from(1_000)),
                erc20(chain, 2),
                TradeType::ExactInput,
                None,
                Some(routing_config),
            )
            .await;
        assert!(matches!(result, Err(RouterError::Timeout)));
    }

    #[tokio::test]
    async fn l1_data_fee_adjusts_the_winning_plan() {
        let chain = Chain::Optimism;
        let (token_in, wrapped_native) = (address(1), chain.wrapped_native());
        let mut providers = providers(HashMap::from([(address(10), 9_900)]));
        providers.v3_listing = Some(Arc::new(FakePoolListing(Ok(vec![v3_subgraph_pool(
            10,
            token_in,
            wrapped_native,
            100.0,
        )]))));
        providers.v3_fetcher = Some(Arc::new(FakePoolFetcher::new(vec![v3_pool(
            chain,
            10,
            token_in,
            wrapped_native,
        )])));
        let mut l2_gas_data = l1::MockL2GasDataProviding::new();
        l2_gas_data
            .expect_l1_data_fee()
            .returning(|_, _| Ok(U256::from(1_000)));
        providers.l2_gas_data = Some(Arc::new(l2_gas_data));
        let router = Router::new(chain, providers);

        let plan = router
            .route(
                CurrencyAmount::new(erc20(chain, 1), U256::from(10).pow(U256::from(18))),
                Currency::Native(chain),
                TradeType::ExactInput,
                None,
                Some(config(vec![Protocol::V3])),
            )
            .await
            .unwrap()
            .unwrap();
        // One hop of concentrated liquidity costs 2_000 + 80_000 gas at a
        // gas price of 10 wei, plus the 1_000 wei data fee.
        assert_eq!(plan.gas_cost_native, U256::from(821_000));
        assert!(plan.unwrap_native_output);
        assert!(!plan.wrap_native_input);
    }

    #[tokio::test]
    async fn rejects_nonsense_inputs() {
        let chain = Chain::Mainnet;
        let router = Router::new(chain, providers(HashMap::new()));

        let same_token = router
            .route(
                CurrencyAmount::new(erc20(chain, 1), U256::from(1_000)),
                erc20(chain, 1),
                TradeType::ExactInput,
                None,
                None,
            )
            .await;
        assert!(matches!(same_token, Err(RouterError::InvalidInput(_))));

        let zero_amount = router
            .route(
                CurrencyAmount::new(erc20(chain, 1), U256::ZERO),
                erc20(chain, 2),
                TradeType::ExactInput,
                None,
                None,
            )
            .await;
        assert!(matches!(zero_amount, Err(RouterError::InvalidInput(_))));

        let bad_distribution = router
            .route(
                CurrencyAmount::new(erc20(chain, 1), U256::from(1_000)),
                erc20(chain, 2),
                TradeType::ExactInput,
                None,
                Some(RoutingConfig {
                    distribution_percent: 7,
                    ..Default::default()
                }),
            )
            .await;
        assert!(matches!(bad_distribution, Err(RouterError::InvalidInput(_))));
    }

    #[test]
    fn unsupported_chain_ids_are_refused() {
        assert!(matches!(
            supported_chain(100),
            Err(RouterError::UnsupportedChain(100))
        ));
        assert!(supported_chain(10).is_ok());
    }
}
