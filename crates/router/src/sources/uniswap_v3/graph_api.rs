//! The Graph API client listing concentrated liquidity pools with coarse TVL.

use {
    crate::{
        pools::FeeTier,
        sources::{PoolListing, SubgraphPool, SubgraphPoolExtras},
        subgraph::{ContainsId, SubgraphClient},
    },
    alloy::primitives::Address,
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
                liquidity_gt: 0
            }
        ) {
            id
            token0 {
                id
            }
            token1 {
                id
            }
            feeTier
            totalValueLockedETH
            totalValueLockedUSD
        }
    }
"#;

pub struct V3SubgraphClient(SubgraphClient);

impl V3SubgraphClient {
    pub fn new(subgraph_url: Url, client: Client) -> Self {
        Self(SubgraphClient::new(subgraph_url, client))
    }

    /// Retrieves the list of registered pools from the subgraph. Pools with a
    /// fee tier the router does not know are skipped.
    pub async fn registered_pools(&self, block: Option<u64>) -> Result<Vec<SubgraphPool>> {
        let block = match block {
            Some(block) => block,
            None => self.0.safe_block().await?,
        };
        let pools: Vec<PoolData> = self.0.paginated_query(block, ALL_POOLS_QUERY).await?;
        Ok(pools
            .into_iter()
            .filter_map(|pool| match SubgraphPool::try_from(pool) {
                Ok(pool) => Some(pool),
                Err(fee_tier) => {
                    tracing::debug!(fee_tier, "skipping pool with unknown fee tier");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl PoolListing for V3SubgraphClient {
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
    pub id: Address,
    pub token0: Token,
    pub token1: Token,
    #[serde_as(as = "DisplayFromStr")]
    pub fee_tier: u32,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "totalValueLockedETH")]
    pub total_value_locked_eth: f64,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "totalValueLockedUSD")]
    pub total_value_locked_usd: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Token {
    pub id: Address,
}

impl ContainsId for PoolData {
    fn get_id(&self) -> String {
        self.id.to_string()
    }
}

impl TryFrom<PoolData> for SubgraphPool {
    /// The unsupported raw fee tier.
    type Error = u32;

    fn try_from(pool: PoolData) -> Result<Self, u32> {
        let fee_tier = FeeTier::from_raw(pool.fee_tier).ok_or(pool.fee_tier)?;
        Ok(Self {
            id: PoolId::Contract(pool.id),
            tokens: vec![pool.token0.id, pool.token1.id],
            tvl_native: pool.total_value_locked_eth,
            tvl_usd: pool.total_value_locked_usd,
            extras: SubgraphPoolExtras::V3 { fee_tier },
        })
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::subgraph::Data, alloy::primitives::address, serde_json::json};

    #[test]
    fn decode_pools_data() {
        let data = serde_json::from_value::<Data<PoolData>>(json!({
            "pools": [
                {
                    "id": "0x88e6a0c2ddd26feeb64f039a2c41296fcb3f5640",
                    "token0": { "id": "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48" },
                    "token1": { "id": "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2" },
                    "feeTier": "500",
                    "totalValueLockedETH": "101467.5",
                    "totalValueLockedUSD": "237505000.0"
                },
            ],
        }))
        .unwrap();
        assert_eq!(
            data.inner,
            vec![PoolData {
                id: address!("0x88e6a0c2ddd26feeb64f039a2c41296fcb3f5640"),
                token0: Token {
                    id: address!("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"),
                },
                token1: Token {
                    id: address!("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"),
                },
                fee_tier: 500,
                total_value_locked_eth: 101467.5,
                total_value_locked_usd: 237505000.0,
            }]
        );
    }

    #[test]
    fn unknown_fee_tier_is_rejected() {
        let pool = PoolData {
            id: Address::with_last_byte(1),
            token0: Token {
                id: Address::with_last_byte(2),
            },
            token1: Token {
                id: Address::with_last_byte(3),
            },
            fee_tier: 123,
            total_value_locked_eth: 1.0,
            total_value_locked_usd: 1.0,
        };
        assert_eq!(SubgraphPool::try_from(pool), Err(123));
    }
}
