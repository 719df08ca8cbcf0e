//! Resolving token metadata (decimals and symbol) from chain state.

use {
    alloy::primitives::Address,
    anyhow::Result,
    async_trait::async_trait,
    contracts::{ERC20, ERC20SymbolBytes},
    ethrpc::Web3,
    futures::{
        FutureExt,
        future::{BoxFuture, Shared},
    },
    model::Chain,
    std::{
        collections::HashMap,
        future::IntoFuture,
        sync::{Arc, Mutex},
    },
    thiserror::Error,
};

#[cfg_attr(test, derive(Eq, PartialEq))]
#[derive(Clone, Debug, Default)]
pub struct TokenInfo {
    pub decimals: Option<u8>,
    pub symbol: Option<String>,
}

#[derive(Clone, Debug, Error)]
#[error("error fetching token info: {0}")]
pub struct Error(pub String);

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenInfoFetching: Send + Sync {
    /// Retrieves information for a token.
    async fn get_token_info(&self, address: Address) -> Result<TokenInfo, Error>;

    /// Retrieves information for several tokens at once. Tokens for which
    /// neither decimals nor symbol could be resolved are dropped from the
    /// result.
    async fn get_token_infos(&self, addresses: &[Address]) -> HashMap<Address, TokenInfo>;
}

pub struct TokenInfoFetcher {
    pub web3: Web3,
}

impl TokenInfoFetcher {
    async fn fetch_token(&self, address: Address) -> Result<TokenInfo, Error> {
        let erc20 = ERC20::Instance::new(address, self.web3.provider.clone());
        let (decimals, symbol) = {
            let decimals = erc20.decimals();
            let symbol = erc20.symbol();
            futures::join!(decimals.call().into_future(), symbol.call().into_future())
        };

        let symbol = match symbol {
            Ok(symbol) => Some(symbol),
            // Some older tokens return their symbol as a fixed `bytes32`.
            Err(_) => self.fetch_symbol_bytes(address).await,
        };
        let decimals = decimals.ok();

        if decimals.is_none() && symbol.is_none() {
            return Err(Error(format!("token {address:?} exposes no metadata")));
        }
        Ok(TokenInfo { decimals, symbol })
    }

    async fn fetch_symbol_bytes(&self, address: Address) -> Option<String> {
        let erc20 = ERC20SymbolBytes::Instance::new(address, self.web3.provider.clone());
        let bytes = erc20.symbol().call().await.ok()?;
        decode_symbol_bytes(bytes.as_slice())
    }
}

/// Decodes a `bytes32` symbol as UTF-8 up to the first NUL byte.
fn decode_symbol_bytes(bytes: &[u8]) -> Option<String> {
    let length = bytes.iter().position(|byte| *byte == 0).unwrap_or(bytes.len());
    let symbol = std::str::from_utf8(&bytes[..length]).ok()?;
    (!symbol.is_empty()).then(|| symbol.to_string())
}

#[async_trait]
impl TokenInfoFetching for TokenInfoFetcher {
    async fn get_token_info(&self, address: Address) -> Result<TokenInfo, Error> {
        let info = self.fetch_token(address).await;
        if let Err(err) = &info {
            tracing::debug!(?err, token = ?address, "failed to fetch token info");
        }

        info
    }

    async fn get_token_infos(&self, addresses: &[Address]) -> HashMap<Address, TokenInfo> {
        let addresses = dedup(addresses);
        futures::future::join_all(addresses.into_iter().map(|address| async move {
            let info = self.fetch_token(address).await;
            if let Err(err) = &info {
                tracing::debug!(?err, token = ?address, "failed to fetch token info");
            }

            (address, info)
        }))
        .await
        .into_iter()
        .filter_map(|(address, info)| Some((address, info.ok()?)))
        .collect()
    }
}

fn dedup(addresses: &[Address]) -> Vec<Address> {
    let mut seen = std::collections::HashSet::new();
    addresses
        .iter()
        .copied()
        .filter(|address| seen.insert(*address))
        .collect()
}

type SharedTokenInfo = Shared<BoxFuture<'static, Result<TokenInfo, Error>>>;

/// Memoizes token info indefinitely, deduplicates in-flight requests and
/// optionally falls back to a secondary fetcher when the primary fails.
pub struct CachedTokenInfoFetcher {
    inner: Arc<dyn TokenInfoFetching>,
    fallback: Option<Arc<dyn TokenInfoFetching>>,
    cache: Arc<Mutex<HashMap<Address, SharedTokenInfo>>>,
}

impl CachedTokenInfoFetcher {
    pub fn new(
        inner: Arc<dyn TokenInfoFetching>,
        fallback: Option<Arc<dyn TokenInfoFetching>>,
    ) -> Self {
        Self {
            inner,
            fallback,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Seeds the cache with the well known tokens of the chain so they never
    /// cost a node round trip.
    pub fn with_seed_tokens(self, chain: Chain) -> Self {
        {
            let mut cache = self.cache.lock().unwrap();
            for token in crate::tokens::base_tokens(chain) {
                let info = TokenInfo {
                    decimals: Some(token.decimals),
                    symbol: token.symbol.clone(),
                };
                cache.insert(
                    token.address,
                    futures::future::ready(Ok(info)).boxed().shared(),
                );
            }
        }
        self
    }

    async fn fetch_token(&self, address: Address) -> Result<TokenInfo, Error> {
        let fetch = {
            let mut cache = self.cache.lock().unwrap();
            cache
                .entry(address)
                .or_insert({
                    let inner = self.inner.clone();
                    let fallback = self.fallback.clone();
                    async move {
                        match inner.get_token_info(address).await {
                            Ok(info) => Ok(info),
                            Err(err) => match &fallback {
                                Some(fallback) => fallback.get_token_info(address).await,
                                None => Err(err),
                            },
                        }
                    }
                    .boxed()
                    .shared()
                })
                .clone()
        };

        let info = fetch.await;
        if info.is_err() {
            // Errors are not memoized so a temporarily failing token gets
            // another chance on the next invocation.
            let mut cache = self.cache.lock().unwrap();
            if let Some(Err(_)) = cache.get(&address).and_then(|fetch| fetch.peek()) {
                cache.remove(&address);
            }
        }

        info
    }
}

#[async_trait]
impl TokenInfoFetching for CachedTokenInfoFetcher {
    async fn get_token_info(&self, address: Address) -> Result<TokenInfo, Error> {
        self.fetch_token(address).await
    }

    async fn get_token_infos(&self, addresses: &[Address]) -> HashMap<Address, TokenInfo> {
        let addresses = dedup(addresses);
        futures::future::join_all(addresses.into_iter().map(|address| async move {
            (address, self.get_token_info(address).await)
        }))
        .await
        .into_iter()
        .filter_map(|(address, info)| Some((address, info.ok()?)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, maplit::hashmap, mockall::predicate::*};

    #[test]
    fn decodes_symbol_bytes() {
        let mut bytes = [0u8; 32];
        bytes[..3].copy_from_slice(b"MKR");
        assert_eq!(decode_symbol_bytes(&bytes), Some("MKR".to_string()));
        assert_eq!(decode_symbol_bytes(&[0u8; 32]), None);
        let mut invalid = [0u8; 32];
        invalid[..2].copy_from_slice(&[0xff, 0xfe]);
        assert_eq!(decode_symbol_bytes(&invalid), None);
    }

    #[tokio::test]
    async fn cached_token_info_fetcher() {
        let mut mock = MockTokenInfoFetching::new();
        mock.expect_get_token_info()
            .with(eq(Address::with_last_byte(0)))
            .times(1)
            .return_once(move |_| {
                Ok(TokenInfo {
                    decimals: Some(18),
                    symbol: Some("CAT".to_string()),
                })
            });
        mock.expect_get_token_info()
            .with(eq(Address::with_last_byte(1)))
            .times(2)
            .returning(|_| Err(Error("some error".to_string())));

        let cached = CachedTokenInfoFetcher::new(Arc::new(mock), None);

        let addresses = [Address::with_last_byte(0), Address::with_last_byte(1)];
        let infos = cached.get_token_infos(&addresses).await;
        // The failing token is dropped rather than surfaced with empty
        // metadata.
        assert_eq!(
            infos,
            hashmap! {
                Address::with_last_byte(0) => TokenInfo {
                    decimals: Some(18),
                    symbol: Some("CAT".to_string()),
                },
            }
        );

        // Fetch again. If token 0 was fetched again the `times(1)` constraint
        // on the mock would fail; token 1 is retried because errors are not
        // memoized.
        let cached_infos = cached.get_token_infos(&addresses).await;
        assert_eq!(infos, cached_infos);
    }

    #[tokio::test]
    async fn falls_back_to_secondary_fetcher() {
        let mut primary = MockTokenInfoFetching::new();
        primary
            .expect_get_token_info()
            .returning(|_| Err(Error("primary down".to_string())));
        let mut secondary = MockTokenInfoFetching::new();
        secondary.expect_get_token_info().returning(|_| {
            Ok(TokenInfo {
                decimals: Some(6),
                symbol: Some("USDC".to_string()),
            })
        });

        let cached = CachedTokenInfoFetcher::new(Arc::new(primary), Some(Arc::new(secondary)));
        let info = cached
            .get_token_info(Address::with_last_byte(7))
            .await
            .unwrap();
        assert_eq!(info.decimals, Some(6));
    }

    #[tokio::test]
    async fn seeded_tokens_need_no_fetch() {
        let mut mock = MockTokenInfoFetching::new();
        mock.expect_get_token_info().never();

        let cached =
            CachedTokenInfoFetcher::new(Arc::new(mock), None).with_seed_tokens(Chain::Mainnet);
        let weth = cached
            .get_token_info(Chain::Mainnet.wrapped_native())
            .await
            .unwrap();
        assert_eq!(weth.decimals, Some(18));
        assert_eq!(weth.symbol, Some("WETH".to_string()));
    }
}
