//! Last-traded-price cache, rebuilt once per tick

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::common::errors::{EngineError, Result};
use crate::common::traits::PriceProvider;

/// Immutable view of prices for one tick
#[derive(Debug, Clone, Default)]
pub struct PriceSnapshot {
    prices: HashMap<String, Decimal>,
    requested: usize,
    taken_at: Option<DateTime<Utc>>,
}

impl PriceSnapshot {
    /// Build a snapshot directly from known prices
    pub fn from_prices<I, K>(prices: I) -> Self
    where
        I: IntoIterator<Item = (K, Decimal)>,
        K: Into<String>,
    {
        let prices: HashMap<String, Decimal> =
            prices.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self {
            requested: prices.len(),
            prices,
            taken_at: None,
        }
    }

    pub fn get(&self, instrument_key: &str) -> Option<Decimal> {
        self.prices.get(instrument_key).copied()
    }

    /// Price for `instrument_key`, or `MissingPriceData`
    pub fn require(&self, instrument_key: &str) -> Result<Decimal> {
        self.get(instrument_key)
            .ok_or_else(|| EngineError::missing_price(instrument_key))
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Number of distinct keys that were asked for
    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn taken_at(&self) -> Option<DateTime<Utc>> {
        self.taken_at
    }
}

/// Process-local price cache
///
/// Each refresh replaces the whole snapshot, so readers within a tick see
/// one consistent view. Keys are deduplicated and fetched in batches; a
/// failed batch leaves its keys unknown for the tick.
pub struct PriceCache {
    provider: Arc<dyn PriceProvider>,
    batch_size: usize,
    max_in_flight: usize,
    current: RwLock<Arc<PriceSnapshot>>,
}

impl PriceCache {
    pub fn new(provider: Arc<dyn PriceProvider>, batch_size: usize, max_in_flight: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            max_in_flight: max_in_flight.max(1),
            current: RwLock::new(Arc::new(PriceSnapshot::default())),
        }
    }

    /// Rebuild the snapshot from the given instrument keys
    #[instrument(skip(self, keys))]
    pub async fn refresh<I, K>(&self, keys: I, now: DateTime<Utc>) -> Arc<PriceSnapshot>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let unique: BTreeSet<String> = keys
            .into_iter()
            .map(Into::<String>::into)
            .filter(|k| !k.trim().is_empty())
            .collect();
        let requested = unique.len();
        let keys: Vec<String> = unique.into_iter().collect();
        let batches: Vec<Vec<String>> = keys.chunks(self.batch_size).map(<[String]>::to_vec).collect();

        let provider = Arc::clone(&self.provider);
        let results: Vec<(usize, Result<HashMap<String, Decimal>>)> = stream::iter(batches)
            .map(|batch| {
                let provider = Arc::clone(&provider);
                async move {
                    let size = batch.len();
                    (size, provider.batch_last_price(&batch).await)
                }
            })
            .buffer_unordered(self.max_in_flight)
            .collect()
            .await;

        let mut prices = HashMap::with_capacity(requested);
        for (size, result) in results {
            match result {
                Ok(batch) => {
                    for (key, price) in batch {
                        if price > Decimal::ZERO {
                            prices.insert(key, price);
                        } else {
                            debug!(instrument_key = %key, %price, "Ignoring non-positive quote");
                        }
                    }
                }
                Err(e) => warn!(batch_size = size, error = %e, "Price batch failed, keys unknown this tick"),
            }
        }

        debug!(requested, priced = prices.len(), "Price cache refreshed");

        let snapshot = Arc::new(PriceSnapshot {
            prices,
            requested,
            taken_at: Some(now),
        });
        *self.current.write().await = Arc::clone(&snapshot);
        snapshot
    }

    /// Snapshot built by the last refresh
    pub async fn snapshot(&self) -> Arc<PriceSnapshot> {
        Arc::clone(&*self.current.read().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::StaticPriceProvider;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        max_keys: AtomicUsize,
    }

    #[async_trait]
    impl PriceProvider for CountingProvider {
        async fn batch_last_price(&self, keys: &[String]) -> Result<HashMap<String, Decimal>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.max_keys.fetch_max(keys.len(), Ordering::SeqCst);
            if keys.iter().any(|k| k == "BROKEN") {
                return Err(EngineError::InvalidResponse("bad batch".into()));
            }
            Ok(keys.iter().map(|k| (k.clone(), dec!(10))).collect())
        }
    }

    #[tokio::test]
    async fn test_refresh_dedupes_and_batches() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            max_keys: AtomicUsize::new(0),
        });
        let cache = PriceCache::new(provider.clone(), 2, 1);
        let keys = vec!["A", "B", "A", "C", "B", "D", "E"];

        let snapshot = cache.refresh(keys, Utc::now()).await;

        assert_eq!(snapshot.requested(), 5);
        assert_eq!(snapshot.len(), 5);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(provider.max_keys.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_keys_unknown() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            max_keys: AtomicUsize::new(0),
        });
        let cache = PriceCache::new(provider, 1, 1);

        let snapshot = cache.refresh(vec!["A", "BROKEN"], Utc::now()).await;

        assert_eq!(snapshot.get("A"), Some(dec!(10)));
        assert!(snapshot.get("BROKEN").is_none());
        assert!(matches!(
            snapshot.require("BROKEN"),
            Err(EngineError::MissingPriceData { .. })
        ));
    }

    #[tokio::test]
    async fn test_refresh_replaces_snapshot() {
        let provider = Arc::new(StaticPriceProvider::new());
        provider.set_price("X", dec!(100));
        let cache = PriceCache::new(provider.clone(), 50, 1);

        let first = cache.refresh(vec!["X"], Utc::now()).await;
        provider.set_price("X", dec!(105));
        let second = cache.refresh(vec!["X"], Utc::now()).await;

        // Earlier readers keep their own consistent view
        assert_eq!(first.get("X"), Some(dec!(100)));
        assert_eq!(second.get("X"), Some(dec!(105)));
        assert_eq!(cache.snapshot().await.get("X"), Some(dec!(105)));
    }

    #[tokio::test]
    async fn test_zero_quotes_are_unknown() {
        let provider = Arc::new(StaticPriceProvider::new());
        provider.set_price("Z", Decimal::ZERO);
        let cache = PriceCache::new(provider, 50, 1);

        let snapshot = cache.refresh(vec!["Z"], Utc::now()).await;
        assert!(snapshot.get("Z").is_none());
    }
}
