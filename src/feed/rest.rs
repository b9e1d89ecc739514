//! REST client for batch last-traded-price lookups

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use super::messages::{ErrorResponse, LtpResponse};
use crate::common::errors::{EngineError, Result};
use crate::common::traits::PriceProvider;
use crate::config::types::PriceFeedConfig;

const LTP_PATH: &str = "market-quote/ltp";

/// Last-traded-price client
#[derive(Debug, Clone)]
pub struct RestPriceProvider {
    /// HTTP client
    client: Client,
    /// Base URL of the quote API
    base_url: String,
    /// Bearer token, sent when set
    access_token: Option<String>,
}

impl RestPriceProvider {
    /// Create a new client (unauthenticated)
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(10))
    }

    /// Create a new client with custom timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: None,
        })
    }

    pub fn from_config(cfg: &PriceFeedConfig) -> Result<Self> {
        let provider = Self::with_timeout(
            &cfg.base_url,
            Duration::from_secs(cfg.request_timeout_seconds),
        )?;
        Ok(match cfg.access_token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => provider.with_access_token(token),
            None => provider,
        })
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn ltp_url(&self, instrument_keys: &[String]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, LTP_PATH))
            .map_err(|e| EngineError::Configuration(format!("Invalid price feed URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("instrument_key", &instrument_keys.join(","));
        Ok(url)
    }
}

#[async_trait]
impl PriceProvider for RestPriceProvider {
    #[instrument(skip(self, instrument_keys), fields(keys = instrument_keys.len()))]
    async fn batch_last_price(&self, instrument_keys: &[String]) -> Result<HashMap<String, Decimal>> {
        if instrument_keys.is_empty() {
            return Ok(HashMap::new());
        }

        let url = self.ltp_url(instrument_keys)?;
        debug!("Fetching last prices from: {}", url);

        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/json");
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|e| e.errors.into_iter().find_map(|d| d.message))
                .unwrap_or(body);
            return Err(EngineError::InvalidResponse(format!(
                "Server returned status {}: {}",
                status, detail
            )));
        }

        let body: LtpResponse = response.json().await?;
        if !body.is_success() {
            return Err(EngineError::InvalidResponse(format!(
                "Quote request not successful: {}",
                body.status
            )));
        }

        let mut prices = HashMap::with_capacity(body.data.len());
        for (symbol, quote) in body.data {
            let key = quote.instrument_token.unwrap_or(symbol);
            if instrument_keys.contains(&key) {
                prices.insert(key, quote.last_price);
            } else {
                warn!(instrument_key = %key, "Quote for instrument that was not requested");
            }
        }

        debug!(requested = instrument_keys.len(), returned = prices.len(), "Last prices fetched");
        Ok(prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ltp_url_encodes_keys() {
        let provider = RestPriceProvider::new("https://api.example.com/v2/").unwrap();
        let url = provider
            .ltp_url(&["NSE_FO|43885".to_string(), "NSE_FO|43886".to_string()])
            .unwrap();

        assert_eq!(url.path(), "/v2/market-quote/ltp");
        let (name, value) = url.query_pairs().next().unwrap();
        assert_eq!(name, "instrument_key");
        assert_eq!(value, "NSE_FO|43885,NSE_FO|43886");
    }

    #[test]
    fn test_blank_token_is_ignored() {
        let cfg = PriceFeedConfig {
            access_token: Some(String::new()),
            ..PriceFeedConfig::default()
        };
        let provider = RestPriceProvider::from_config(&cfg).unwrap();
        assert!(provider.access_token.is_none());
    }
}
