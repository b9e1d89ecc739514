use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::common::errors::Result;
use crate::common::traits::PriceProvider;

/// Price provider backed by a settable in-memory table.
///
/// Unknown keys are left out of the result, like a real feed that has no
/// quote for an instrument.
#[derive(Debug, Default)]
pub struct StaticPriceProvider {
    prices: RwLock<HashMap<String, Decimal>>,
}

impl StaticPriceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices<I, K>(prices: I) -> Self
    where
        I: IntoIterator<Item = (K, Decimal)>,
        K: Into<String>,
    {
        let provider = Self::new();
        for (key, price) in prices {
            provider.set_price(key, price);
        }
        provider
    }

    pub fn set_price(&self, instrument_key: impl Into<String>, price: Decimal) {
        let mut prices = self.prices.write().unwrap_or_else(|e| e.into_inner());
        prices.insert(instrument_key.into(), price);
    }

    pub fn remove_price(&self, instrument_key: &str) {
        let mut prices = self.prices.write().unwrap_or_else(|e| e.into_inner());
        prices.remove(instrument_key);
    }
}

#[async_trait]
impl PriceProvider for StaticPriceProvider {
    async fn batch_last_price(&self, instrument_keys: &[String]) -> Result<HashMap<String, Decimal>> {
        let prices = self.prices.read().unwrap_or_else(|e| e.into_inner());
        Ok(instrument_keys
            .iter()
            .filter_map(|k| prices.get(k).map(|p| (k.clone(), *p)))
            .collect())
    }
}
