//! The Graph API client listing stable pools with coarse TVL.

use {
    crate::{
        sources::{PoolListing, SubgraphPool, SubgraphPoolExtras},
        subgraph::{ContainsId, SubgraphClient},
    },
    alloy::primitives::{Address, B256},
    anyhow::Result,
    async_trait::async_trait,
    model::PoolId,
    reqwest::Client,
    serde::Deserialize,
    serde_with::{DisplayFromStr, serde_as},
    url::Url,
};

const ALL_POOLS_QUERY: &str = r#"
    query Pools($block: Int, $pageSize: Int, $lastId: ID) {
        pools(
            block: { number: $block }
            first: $pageSize
            where: {
                id_gt: $lastId
                totalShares_gt: 0
            }
        ) {
            id
            address
            tokens {
                address
            }
            totalShares
            totalLiquidity
            wrapper {
                id
            }
        }
    }
"#;

pub struct StableSubgraphClient(SubgraphClient);

impl StableSubgraphClient {
    pub fn new(subgraph_url: Url, client: Client) -> Self {
        Self(SubgraphClient::new(subgraph_url, client))
    }

    /// Retrieves the list of registered pools from the subgraph.
    pub async fn registered_pools(&self, block: Option<u64>) -> Result<Vec<SubgraphPool>> {
        let block = match block {
            Some(block) => block,
            None => self.0.safe_block().await?,
        };
        let pools: Vec<PoolData> = self.0.paginated_query(block, ALL_POOLS_QUERY).await?;
        Ok(pools.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl PoolListing for StableSubgraphClient {
    async fn list_pools(
        &self,
        _token_in: Option<Address>,
        _token_out: Option<Address>,
        block: Option<u64>,
    ) -> Result<Vec<SubgraphPool>> {
        self.registered_pools(block).await
    }
}

/// Pool data from the subgraph.
#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolData {
    pub id: B256,
    pub address: Address,
    pub tokens: Vec<Token>,
    #[serde_as(as = "DisplayFromStr")]
    pub total_shares: f64,
    /// TVL in USD.
    #[serde_as(as = "DisplayFromStr")]
    pub total_liquidity: f64,
    #[serde(default)]
    pub wrapper: Option<Wrapper>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Token {
    pub address: Address,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Wrapper {
    pub id: Address,
}

impl ContainsId for PoolData {
    fn get_id(&self) -> String {
        self.id.to_string()
    }
}

impl From<PoolData> for SubgraphPool {
    fn from(pool: PoolData) -> Self {
        Self {
            id: PoolId::Stable(pool.id),
            tokens: pool.tokens.into_iter().map(|token| token.address).collect(),
            // The stable subgraph only reports TVL in USD.
            tvl_native: 0.0,
            tvl_usd: pool.total_liquidity,
            extras: SubgraphPoolExtras::Stable {
                total_shares: pool.total_shares,
                wrapper: pool.wrapper.map(|wrapper| wrapper.id),
            },
        }
    }
}
