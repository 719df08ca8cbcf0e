//! Liquidity sources, by protocol.
//!
//! Each source exposes two independent views: a *listing* of all known pools
//! with coarse TVL (backed by a subgraph and used only for candidate
//! selection) and an on-chain *fetcher* materializing pool state for selected
//! pools.

pub mod stable;
pub mod uniswap_v2;
pub mod uniswap_v3;

use {
    crate::pools::{FeeTier, Pool, Protocol},
    alloy::primitives::Address,
    anyhow::Result,
    async_trait::async_trait,
    model::{Chain, PoolId},
    serde::de::DeserializeOwned,
    std::sync::Arc,
};

/// A pool as reported by a listing source. Carries just enough data for
/// candidate selection; never used for value math.
#[derive(Clone, Debug, PartialEq)]
pub struct SubgraphPool {
    pub id: PoolId,
    pub tokens: Vec<Address>,
    /// Total value locked denominated in the chain's native currency.
    pub tvl_native: f64,
    pub tvl_usd: f64,
    pub extras: SubgraphPoolExtras,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SubgraphPoolExtras {
    V2 {
        reserve: f64,
    },
    V3 {
        fee_tier: FeeTier,
    },
    Stable {
        total_shares: f64,
        /// Optional share/asset vault wrapping this pool's share token.
        wrapper: Option<Address>,
    },
}

impl SubgraphPool {
    pub fn protocol(&self) -> Protocol {
        match self.extras {
            SubgraphPoolExtras::V2 { .. } => Protocol::V2,
            SubgraphPoolExtras::V3 { .. } => Protocol::V3,
            SubgraphPoolExtras::Stable { .. } => Protocol::Stable,
        }
    }

    /// The wrapper vault token, for stable pools that have one.
    pub fn wrapper(&self) -> Option<Address> {
        match self.extras {
            SubgraphPoolExtras::Stable { wrapper, .. } => wrapper,
            _ => None,
        }
    }

    /// Whether the pool exposes the token, counting a stable pool's wrapper
    /// token as part of the pool's token set.
    pub fn involves(&self, token: Address) -> bool {
        self.tokens.contains(&token) || self.wrapper() == Some(token)
    }

    /// All tokens the pool connects, including the wrapper token if any.
    pub fn connected_tokens(&self) -> Vec<Address> {
        let mut tokens = self.tokens.clone();
        tokens.extend(self.wrapper());
        tokens
    }
}

/// Lists all pools known to a source.
///
/// The token filters are advisory: a provider may return a superset (the
/// remote providers do); selection filters precisely.
#[async_trait]
pub trait PoolListing: Send + Sync {
    async fn list_pools(
        &self,
        token_in: Option<Address>,
        token_out: Option<Address>,
        block: Option<u64>,
    ) -> Result<Vec<SubgraphPool>>;
}

/// Tries each provider in order, returning the first success.
pub struct FallbackPoolProvider {
    providers: Vec<Arc<dyn PoolListing>>,
}

impl FallbackPoolProvider {
    pub fn new(providers: Vec<Arc<dyn PoolListing>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl PoolListing for FallbackPoolProvider {
    async fn list_pools(
        &self,
        token_in: Option<Address>,
        token_out: Option<Address>,
        block: Option<u64>,
    ) -> Result<Vec<SubgraphPool>> {
        let mut last_error = anyhow::anyhow!("no pool providers configured");
        for (index, provider) in self.providers.iter().enumerate() {
            match provider.list_pools(token_in, token_out, block).await {
                Ok(pools) => return Ok(pools),
                Err(err) => {
                    tracing::warn!(?err, index, "pool provider failed; trying next");
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }
}

/// A hardcoded seed set of well known pools, used as the last fallback when
/// every remote listing fails.
pub struct StaticPoolProvider {
    pools: Vec<SubgraphPool>,
}

impl StaticPoolProvider {
    pub fn new(pools: Vec<SubgraphPool>) -> Self {
        Self { pools }
    }
}

#[async_trait]
impl PoolListing for StaticPoolProvider {
    async fn list_pools(
        &self,
        token_in: Option<Address>,
        token_out: Option<Address>,
        _block: Option<u64>,
    ) -> Result<Vec<SubgraphPool>> {
        Ok(self
            .pools
            .iter()
            .filter(|pool| {
                token_in.is_none_or(|token| pool.involves(token))
                    && token_out.is_none_or(|token| pool.involves(token))
            })
            .cloned()
            .collect())
    }
}

/// Pulls a pre-built pool snapshot from a URI. The snapshot uses the same
/// shape as the corresponding subgraph response.
pub struct UriPoolProvider<T> {
    client: reqwest::Client,
    url: url::Url,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> UriPoolProvider<T> {
    pub fn new(client: reqwest::Client, url: url::Url) -> Self {
        Self {
            client,
            url,
            _marker: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<T> PoolListing for UriPoolProvider<T>
where
    T: DeserializeOwned + TryInto<SubgraphPool> + Send + Sync + 'static,
{
    async fn list_pools(
        &self,
        _token_in: Option<Address>,
        _token_out: Option<Address>,
        _block: Option<u64>,
    ) -> Result<Vec<SubgraphPool>> {
        let snapshot: Vec<T> = self
            .client
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(snapshot
            .into_iter()
            .filter_map(|pool| pool.try_into().ok())
            .collect())
    }
}

/// Well known mainnet pools seeding the static fallback provider.
pub fn mainnet_seed_pools() -> Vec<SubgraphPool> {
    use alloy::primitives::address;
    let pool = |id, token0, token1, fee_tier, tvl_native, tvl_usd| SubgraphPool {
        id: PoolId::Contract(id),
        tokens: vec![token0, token1],
        tvl_native,
        tvl_usd,
        extras: SubgraphPoolExtras::V3 { fee_tier },
    };
    vec![
        // USDC/WETH 0.05%.
        pool(
            address!("0x88e6A0c2dDD26FEEb64F039a2c41296FcB3f5640"),
            address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            address!("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            FeeTier::Low,
            100_000.0,
            250_000_000.0,
        ),
        // WETH/USDT 0.3%.
        pool(
            address!("0x4e68Ccd3E89f51C3074ca5072bbAC773960dFa36"),
            address!("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            address!("0xdAC17F958D2ee523a2206206994597C13D831ec7"),
            FeeTier::Medium,
            40_000.0,
            100_000_000.0,
        ),
        // DAI/USDC 0.01%.
        pool(
            address!("0x5777d92f208679DB4b9778590Fa3CAB3aC9e2168"),
            address!("0x6B175474E89094C44Da98b954EedeAC495271d0F"),
            address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            FeeTier::Lowest,
            30_000.0,
            75_000_000.0,
        ),
    ]
}

/// A key identifying one pool to materialize from chain state. Doubles as the
/// caching identity.
pub trait FetchKey: Clone + Eq + std::hash::Hash + Send + Sync + 'static {
    /// Stable textual form used in cache keys: `pool-{chain}-{key}`.
    fn cache_key(&self, chain: Chain) -> String;

    /// Whether a fetched pool is the one this key refers to.
    fn matches(&self, pool: &Pool) -> bool;
}

/// On-chain pool state access for one protocol.
#[async_trait]
pub trait PoolFetching<K>: Send + Sync
where
    K: FetchKey,
{
    /// Materializes pool state for the given keys. Keys whose pools do not
    /// exist or whose metadata calls fail are dropped from the result.
    async fn fetch(&self, keys: &[K], block: Option<u64>) -> Result<Vec<Pool>>;
}

pub mod test_util {
    use {super::*, std::collections::HashMap};

    /// Fake listing provider returning a fixed pool set, or an error.
    pub struct FakePoolListing(pub Result<Vec<SubgraphPool>, String>);

    #[async_trait]
    impl PoolListing for FakePoolListing {
        async fn list_pools(
            &self,
            _: Option<Address>,
            _: Option<Address>,
            _: Option<u64>,
        ) -> Result<Vec<SubgraphPool>> {
            match &self.0 {
                Ok(pools) => Ok(pools.clone()),
                Err(message) => Err(anyhow::anyhow!("{message}")),
            }
        }
    }

    /// Fake fetcher returning pre-baked pools per key and counting fetches.
    pub struct FakePoolFetcher<K> {
        pub pools: Vec<Pool>,
        pub fetches: std::sync::Mutex<HashMap<String, usize>>,
        pub _marker: std::marker::PhantomData<fn() -> K>,
    }

    impl<K> FakePoolFetcher<K> {
        pub fn new(pools: Vec<Pool>) -> Self {
            Self {
                pools,
                fetches: Default::default(),
                _marker: std::marker::PhantomData,
            }
        }
    }

    #[async_trait]
    impl<K> PoolFetching<K> for FakePoolFetcher<K>
    where
        K: FetchKey,
    {
        async fn fetch(&self, keys: &[K], _block: Option<u64>) -> Result<Vec<Pool>> {
            let mut fetches = self.fetches.lock().unwrap();
            for key in keys {
                *fetches
                    .entry(key.cache_key(Chain::Mainnet))
                    .or_default() += 1;
            }
            Ok(self
                .pools
                .iter()
                .filter(|pool| keys.iter().any(|key| key.matches(pool)))
                .cloned()
                .collect())
        }
    }
}
