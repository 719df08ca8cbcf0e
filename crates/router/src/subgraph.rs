//! A module implementing a client for querying subgraphs.

use {
    crate::retry::{self, RetryConfig},
    anyhow::{Context as _, Result, bail},
    reqwest::{Client, Url},
    serde::{Deserialize, Deserializer, de::DeserializeOwned},
    serde_json::{Map, Value, json},
    std::time::Duration,
    thiserror::Error,
};

/// The page size when paging through pool lists.
#[cfg(not(test))]
const QUERY_PAGE_SIZE: usize = 1000;
#[cfg(test)]
const QUERY_PAGE_SIZE: usize = 10;

/// Distance to the chain head below which data may still get reorged away.
pub const MAX_REORG_BLOCK_COUNT: u64 = 25;

/// How far the requested block is rolled back when the indexer reports that it
/// has not caught up to it yet.
const INDEXER_LAG_ROLLBACK: u64 = 10;

/// How often a query is re-attempted with a rolled back block before giving
/// up on a lagging indexer.
const MAX_INDEXER_LAG_RETRIES: u32 = 5;

/// Hard timeout for a single GraphQL request.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// A general client for querying subgraphs.
pub struct SubgraphClient {
    client: Client,
    subgraph_url: Url,
    retry: RetryConfig,
}

impl SubgraphClient {
    pub fn new(subgraph_url: Url, client: Client) -> Self {
        Self {
            client,
            subgraph_url,
            retry: RetryConfig::default(),
        }
    }

    /// Performs the specified GraphQL query on the current subgraph.
    /// Network errors are retried with backoff.
    pub async fn query<T>(&self, query: &str, variables: Option<Map<String, Value>>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        retry::with_back_off(&self.retry, "subgraph query", || async {
            self.query_once(query, variables.clone()).await
        })
        .await
    }

    async fn query_once<T>(&self, query: &str, variables: Option<Map<String, Value>>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.client
            .post(self.subgraph_url.clone())
            .timeout(QUERY_TIMEOUT)
            .json(&Query { query, variables })
            .send()
            .await
            .context("failed to send subgraph query")?
            .json::<QueryResponse<T>>()
            .await
            .context("failed to decode subgraph response")?
            .into_result()
    }

    /// Performs a paginated query for the given block, paging by `id_gt` as
    /// suggested by The Graph for best performance.
    ///
    /// When the indexer reports that it has only indexed up to an earlier
    /// block the requested block is rolled back by [`INDEXER_LAG_ROLLBACK`]
    /// and the query retried.
    pub async fn paginated_query<T>(&self, mut block: u64, query: &str) -> Result<Vec<T>>
    where
        T: ContainsId + DeserializeOwned,
    {
        let mut lag_retries = 0;
        loop {
            match self.paginated_query_at(block, query).await {
                Ok(results) => return Ok(results),
                Err(err) if is_indexer_lag_error(&err) && lag_retries < MAX_INDEXER_LAG_RETRIES => {
                    let rolled_back = block.saturating_sub(INDEXER_LAG_ROLLBACK);
                    tracing::debug!(block, rolled_back, "indexer lagging; rolling back block");
                    block = rolled_back;
                    lag_retries += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn paginated_query_at<T>(&self, block: u64, query: &str) -> Result<Vec<T>>
    where
        T: ContainsId + DeserializeOwned,
    {
        let mut results = Vec::new();
        let mut last_id = String::default();

        loop {
            let page = self
                .query::<Data<T>>(
                    query,
                    Some(json_map(
                        [
                            ("block", json!(block)),
                            ("pageSize", json!(QUERY_PAGE_SIZE)),
                            ("lastId", json!(last_id)),
                        ]
                        .into_iter(),
                    )),
                )
                .await?
                .inner;
            let no_more_pages = page.len() != QUERY_PAGE_SIZE;
            if let Some(last) = page.last() {
                last_id = last.get_id();
            }

            results.extend(page);

            if no_more_pages {
                return Ok(results);
            }
        }
    }

    /// Retrieves a recent block number for which it is safe to assume no
    /// reorgs will happen.
    pub async fn safe_block(&self) -> Result<u64> {
        // Ideally we would want to use block hash here so that we can check
        // that there indeed is no reorg. However, it does not seem possible to
        // retrieve historic block hashes just from the subgraph (it always
        // returns `null`).
        Ok(self
            .query::<block_number_query::Data>(block_number_query::QUERY, None)
            .await?
            .meta
            .block
            .number
            .saturating_sub(MAX_REORG_BLOCK_COUNT))
    }
}

/// Entities that can be paged by id.
pub trait ContainsId {
    fn get_id(&self) -> String;
}

/// The result of a query that returns one list of entities under an arbitrary
/// field name, e.g. `{"pools": [...]}`.
#[derive(Debug, PartialEq)]
pub struct Data<T> {
    pub inner: Vec<T>,
}

impl<'de, T> Deserialize<'de> for Data<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut map = <Map<String, Value>>::deserialize(deserializer)?;
        let (_, value) = map
            .iter_mut()
            .next()
            .ok_or_else(|| serde::de::Error::custom("empty data"))?;
        let inner =
            Deserialize::deserialize(value.take()).map_err(serde::de::Error::custom)?;
        Ok(Self { inner })
    }
}

fn json_map(entries: impl Iterator<Item = (&'static str, Value)>) -> Map<String, Value> {
    entries
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn is_indexer_lag_error(err: &anyhow::Error) -> bool {
    err.to_string().contains("indexed up to block number")
}

/// A GraphQL query.
#[derive(serde::Serialize)]
struct Query<'a> {
    query: &'a str,
    variables: Option<Map<String, Value>>,
}

/// A GraphQL query response.
///
/// This type gets converted into a Rust `Result` type, while handling invalid
/// responses (with missing data and errors).
#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    #[serde(default = "empty_data")]
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<QueryError>>,
}

impl<T> QueryResponse<T> {
    fn into_result(self) -> Result<T> {
        match self {
            Self {
                data: Some(data),
                errors: None,
            } => Ok(data),
            Self {
                errors: Some(errors),
                data: None,
            } if !errors.is_empty() => {
                // Make sure to log additional errors if there are more than
                // one, and just bubble up the first error.
                for error in &errors[1..] {
                    tracing::warn!("additional GraphQL error: {}", error.message);
                }
                bail!("{}", errors[0])
            }
            _ => bail!("invalid GraphQL response"),
        }
    }
}

#[derive(Debug, Deserialize, Error)]
#[error("{}", .message)]
struct QueryError {
    message: String,
}

/// Function to work around the fact that `#[serde(default)]` on an `Option<T>`
/// requires `T: Default`.
fn empty_data<T>() -> Option<T> {
    None
}

mod block_number_query {
    use serde::Deserialize;

    pub const QUERY: &str = r#"{
        _meta {
            block { number }
        }
    }"#;

    #[derive(Debug, Deserialize, Eq, PartialEq)]
    pub struct Data {
        #[serde(rename = "_meta")]
        pub meta: Meta,
    }

    #[derive(Debug, Deserialize, Eq, PartialEq)]
    pub struct Meta {
        pub block: Block,
    }

    #[derive(Debug, Deserialize, Eq, PartialEq)]
    pub struct Block {
        pub number: u64,
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn response_from_json<T>(value: Value) -> Result<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_value::<QueryResponse<T>>(value)
            .unwrap()
            .into_result()
    }

    #[test]
    fn deserialize_successful_response() {
        assert!(response_from_json::<bool>(json!({ "data": true })).unwrap());
    }

    #[test]
    fn deserialize_error_response() {
        assert_eq!(
            response_from_json::<bool>(json!({
                "data": null,
                "errors": [{"message": "foo"}],
            }))
            .unwrap_err()
            .to_string(),
            "foo",
        );
        assert_eq!(
            response_from_json::<bool>(json!({
                "errors": [{"message": "bar"}],
            }))
            .unwrap_err()
            .to_string(),
            "bar",
        );
    }

    #[test]
    fn deserialize_multi_error_response() {
        assert_eq!(
            response_from_json::<bool>(json!({
                "data": null,
                "errors": [
                    {"message": "foo"},
                    {"message": "bar"},
                ],
            }))
            .unwrap_err()
            .to_string(),
            "foo",
        );
    }

    #[test]
    fn deserialize_invalid_response() {
        assert!(
            response_from_json::<bool>(json!({
                "data": null,
                "errors": null,
            }))
            .is_err()
        );
        assert!(
            response_from_json::<bool>(json!({
                "data": null,
                "errors": [],
            }))
            .is_err()
        );
        assert!(
            response_from_json::<bool>(json!({
                "data": true,
                "errors": [],
            }))
            .is_err()
        );
        assert!(
            response_from_json::<bool>(json!({
                "data": true,
                "errors": [{"message":"bad"}],
            }))
            .is_err()
        );
    }

    #[derive(Debug, Deserialize, Eq, PartialEq)]
    struct Entity {
        id: String,
    }

    impl ContainsId for Entity {
        fn get_id(&self) -> String {
            self.id.clone()
        }
    }

    #[test]
    fn deserialize_data_under_any_field_name() {
        let data = serde_json::from_value::<Data<Entity>>(json!({
            "pools": [{"id": "0x01"}, {"id": "0x02"}],
        }))
        .unwrap();
        assert_eq!(
            data.inner,
            vec![
                Entity {
                    id: "0x01".to_string()
                },
                Entity {
                    id: "0x02".to_string()
                },
            ]
        );
    }

    #[test]
    fn detects_indexer_lag_errors() {
        let err = anyhow::anyhow!(
            "Failed to decode `block.number` value: `subgraph QmFoo has only indexed up to block \
             number 1234 and data for block number 1245 is therefore not yet available`"
        );
        assert!(is_indexer_lag_error(&err));
        assert!(!is_indexer_lag_error(&anyhow::anyhow!("timeout")));
    }
}
