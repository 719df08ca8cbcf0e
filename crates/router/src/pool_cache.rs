//! Caching wrapper around the on-chain pool fetchers.
//!
//! Entries are keyed `pool-{chain}-{key}[-{block}]` where the block is only
//! part of the key when the caller pins one, so state pinned to different
//! blocks can never be confused. Hits are never revalidated; staleness is
//! bounded by the cache lifespan.

use {
    crate::{
        pools::Pool,
        sources::{FetchKey, PoolFetching},
    },
    anyhow::Result,
    async_trait::async_trait,
    cached::{Cached, TimedSizedCache},
    model::Chain,
    std::{sync::{Arc, Mutex}, time::Duration},
};

#[derive(Clone, Copy, Debug)]
pub struct CacheConfig {
    pub lifespan: Duration,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lifespan: Duration::from_secs(30),
            max_entries: 10_000,
        }
    }
}

pub struct CachedPoolFetcher<K> {
    inner: Arc<dyn PoolFetching<K>>,
    chain: Chain,
    cache: Mutex<TimedSizedCache<String, Vec<Pool>>>,
}

impl<K> CachedPoolFetcher<K>
where
    K: FetchKey,
{
    pub fn new(inner: Arc<dyn PoolFetching<K>>, chain: Chain, config: CacheConfig) -> Self {
        Self {
            inner,
            chain,
            cache: Mutex::new(TimedSizedCache::with_size_and_lifespan(
                config.max_entries,
                config.lifespan.as_secs(),
            )),
        }
    }

    fn cache_key(&self, key: &K, block: Option<u64>) -> String {
        match block {
            Some(block) => format!("{}-{block}", key.cache_key(self.chain)),
            None => key.cache_key(self.chain),
        }
    }
}

#[async_trait]
impl<K> PoolFetching<K> for CachedPoolFetcher<K>
where
    K: FetchKey,
{
    async fn fetch(&self, keys: &[K], block: Option<u64>) -> Result<Vec<Pool>> {
        let mut pools = Vec::new();
        let mut misses = Vec::new();
        {
            let mut cache = self.cache.lock().unwrap();
            for key in keys {
                match cache.cache_get(&self.cache_key(key, block)) {
                    Some(hit) => pools.extend(hit.iter().cloned()),
                    None => misses.push(key.clone()),
                }
            }
        }
        tracing::debug!(
            hits = keys.len() - misses.len(),
            misses = misses.len(),
            "pool cache lookup"
        );

        if !misses.is_empty() {
            let fetched = self.inner.fetch(&misses, block).await?;
            let mut cache = self.cache.lock().unwrap();
            for key in &misses {
                let group: Vec<Pool> = fetched
                    .iter()
                    .filter(|pool| key.matches(pool))
                    .cloned()
                    .collect();
                // Empty groups are cached too; they are the negative cache
                // for pools that do not exist.
                cache.cache_set(self.cache_key(key, block), group.clone());
                pools.extend(group);
            }
        }
        Ok(pools)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            pools::V2Pool,
            sources::test_util::FakePoolFetcher,
        },
        alloy::primitives::Address,
        model::TokenPair,
    };

    fn pair(a: u8, b: u8) -> TokenPair {
        TokenPair::new(Address::with_last_byte(a), Address::with_last_byte(b)).unwrap()
    }

    fn pool(a: u8, b: u8) -> Pool {
        Pool::V2(V2Pool {
            chain: Chain::Mainnet,
            address: Address::with_last_byte(a),
            tokens: pair(a, b),
            reserves: (1, 1),
        })
    }

    fn fetch_count(fetcher: &FakePoolFetcher<TokenPair>, key: &TokenPair) -> usize {
        *fetcher
            .fetches
            .lock()
            .unwrap()
            .get(&key.cache_key(Chain::Mainnet))
            .unwrap_or(&0)
    }

    #[tokio::test]
    async fn second_fetch_hits_cache() {
        let inner = Arc::new(FakePoolFetcher::new(vec![pool(1, 2)]));
        let cached = CachedPoolFetcher::new(inner.clone(), Chain::Mainnet, CacheConfig::default());

        let first = cached.fetch(&[pair(1, 2)], None).await.unwrap();
        let second = cached.fetch(&[pair(1, 2)], None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fetch_count(&inner, &pair(1, 2)), 1);
    }

    #[tokio::test]
    async fn entries_pinned_to_different_blocks_are_disjoint() {
        let inner = Arc::new(FakePoolFetcher::new(vec![pool(1, 2)]));
        let cached = CachedPoolFetcher::new(inner.clone(), Chain::Mainnet, CacheConfig::default());

        cached.fetch(&[pair(1, 2)], Some(100)).await.unwrap();
        cached.fetch(&[pair(1, 2)], Some(101)).await.unwrap();
        assert_eq!(fetch_count(&inner, &pair(1, 2)), 2);
        // The pinned entries are reused per block.
        cached.fetch(&[pair(1, 2)], Some(100)).await.unwrap();
        assert_eq!(fetch_count(&inner, &pair(1, 2)), 2);
    }

    #[tokio::test]
    async fn missing_pools_are_cached_negatively() {
        let inner = Arc::new(FakePoolFetcher::new(vec![]));
        let cached = CachedPoolFetcher::new(inner.clone(), Chain::Mainnet, CacheConfig::default());

        assert!(cached.fetch(&[pair(1, 2)], None).await.unwrap().is_empty());
        assert!(cached.fetch(&[pair(1, 2)], None).await.unwrap().is_empty());
        assert_eq!(fetch_count(&inner, &pair(1, 2)), 1);
    }

    #[tokio::test]
    async fn only_misses_hit_the_inner_fetcher() {
        let inner = Arc::new(FakePoolFetcher::new(vec![pool(1, 2), pool(3, 4)]));
        let cached = CachedPoolFetcher::new(inner.clone(), Chain::Mainnet, CacheConfig::default());

        cached.fetch(&[pair(1, 2)], None).await.unwrap();
        let pools = cached.fetch(&[pair(1, 2), pair(3, 4)], None).await.unwrap();
        assert_eq!(pools.len(), 2);
        assert_eq!(fetch_count(&inner, &pair(1, 2)), 1);
        assert_eq!(fetch_count(&inner, &pair(3, 4)), 1);
    }
}
