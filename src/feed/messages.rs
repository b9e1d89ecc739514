//! Wire types for the last-traded-price endpoint

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Envelope of `GET /market-quote/ltp`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LtpResponse {
    pub status: String,
    /// Keyed by the broker's display symbol; the instrument key is inside
    #[serde(default)]
    pub data: HashMap<String, LtpQuote>,
}

impl LtpResponse {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LtpQuote {
    #[serde(default)]
    pub instrument_token: Option<String>,
    pub last_price: Decimal,
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default, rename = "errorCode")]
    pub error_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
