//! The Graph API client listing constant product pairs with coarse TVL.

use {
    crate::{
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

const ALL_PAIRS_QUERY: &str = r#"
    query Pairs($block: Int, $pageSize: Int, $lastId: ID) {
        pairs(
            block: { number: $block }
            first: $pageSize
            where: {
                id_gt: $lastId
                trackedReserveETH_gt: 0
            }
        ) {
            id
            token0 {
                id
            }
            token1 {
                id
            }
            trackedReserveETH
            reserveUSD
        }
    }
"#;

pub struct V2SubgraphClient(SubgraphClient);

impl V2SubgraphClient {
    pub fn new(subgraph_url: Url, client: Client) -> Self {
        Self(SubgraphClient::new(subgraph_url, client))
    }

    /// Retrieves the list of registered pairs from the subgraph.
    pub async fn registered_pools(&self, block: Option<u64>) -> Result<Vec<SubgraphPool>> {
        let block = match block {
            Some(block) => block,
            None => self.0.safe_block().await?,
        };
        let pairs: Vec<PairData> = self.0.paginated_query(block, ALL_PAIRS_QUERY).await?;
        Ok(pairs.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl PoolListing for V2SubgraphClient {
    async fn list_pools(
        &self,
        _token_in: Option<Address>,
        _token_out: Option<Address>,
        block: Option<u64>,
    ) -> Result<Vec<SubgraphPool>> {
        self.registered_pools(block).await
    }
}

/// Pair data from the subgraph.
#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PairData {
    pub id: Address,
    pub token0: Token,
    pub token1: Token,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "trackedReserveETH")]
    pub tracked_reserve_eth: f64,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "reserveUSD")]
    pub reserve_usd: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Token {
    pub id: Address,
}

impl ContainsId for PairData {
    fn get_id(&self) -> String {
        self.id.to_string()
    }
}

impl From<PairData> for SubgraphPool {
    fn from(pair: PairData) -> Self {
        Self {
            id: PoolId::Contract(pair.id),
            tokens: vec![pair.token0.id, pair.token1.id],
            tvl_native: pair.tracked_reserve_eth,
            tvl_usd: pair.reserve_usd,
            extras: SubgraphPoolExtras::V2 {
                reserve: pair.tracked_reserve_eth,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::subgraph::Data, alloy::primitives::address, serde_json::json};

    #[test]
    fn decode_pairs_data() {
        let data = serde_json::from_value::<Data<PairData>>(json!({
            "pairs": [
                {
                    "id": "0x3e8468f66d30fc99f745481d4b383f89861702c6",
                    "token0": { "id": "0x6810e776880c02933d47db1b9fc05908e5386b96" },
                    "token1": { "id": "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2" },
                    "trackedReserveETH": "1234.5",
                    "reserveUSD": "2469000.25"
                },
            ],
        }))
        .unwrap();
        assert_eq!(
            data.inner,
            vec![PairData {
                id: address!("0x3e8468f66d30fc99f745481d4b383f89861702c6"),
                token0: Token {
                    id: address!("0x6810e776880c02933d47db1b9fc05908e5386b96"),
                },
                token1: Token {
                    id: address!("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"),
                },
                tracked_reserve_eth: 1234.5,
                reserve_usd: 2469000.25,
            }]
        );

        let pool = SubgraphPool::from(data.inner[0].clone());
        assert_eq!(pool.tvl_native, 1234.5);
        assert_eq!(
            pool.extras,
            SubgraphPoolExtras::V2 { reserve: 1234.5 }
        );
    }
}
