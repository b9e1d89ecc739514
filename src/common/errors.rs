//! Error types for the lifecycle engine

use thiserror::Error;
use tracing::Level;

/// Result type alias using our EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for lifecycle operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Instrument key absent from the price snapshot for this tick
    #[error("No price data for instrument: {instrument_key}")]
    MissingPriceData { instrument_key: String },

    /// Leg descriptor could not be split into usable legs
    #[error("Malformed leg descriptor: {0}")]
    MalformedLegDescriptor(String),

    /// Persistence call failed
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A plan value could not be parsed to a number
    #[error("Invalid price string for {field}: {value:?}")]
    InvalidPriceString { field: String, value: String },

    /// Requested state change is not allowed by the lifecycle
    #[error("Invalid transition for {record_id}: {from} -> {to}")]
    InvalidTransition {
        record_id: String,
        from: String,
        to: String,
    },

    /// Record or strategy not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Invalid API response
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn missing_price(instrument_key: impl Into<String>) -> Self {
        Self::MissingPriceData {
            instrument_key: instrument_key.into(),
        }
    }

    pub fn invalid_price(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidPriceString {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether the error ends the current tick for the affected processor.
    ///
    /// Only persistence failures do; everything else is scoped to one record.
    pub fn aborts_tick(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Level at which a per-record failure is logged
    pub fn severity(&self) -> Level {
        match self {
            Self::MissingPriceData { .. } => Level::DEBUG,
            Self::MalformedLegDescriptor(_)
            | Self::InvalidPriceString { .. }
            | Self::InvalidTransition { .. }
            | Self::NotFound(_) => Level::WARN,
            _ => Level::ERROR,
        }
    }

    /// Short machine-readable tag used in tick reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingPriceData { .. } => "missing_price_data",
            Self::MalformedLegDescriptor(_) => "malformed_leg_descriptor",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::InvalidPriceString { .. } => "invalid_price_string",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::NotFound(_) => "not_found",
            Self::Configuration(_) => "configuration",
            Self::HttpRequest(_) => "http_request",
            Self::JsonParse(_) => "json_parse",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Internal(_) => "internal",
        }
    }
}

/// Log a per-record failure at the severity its kind calls for
pub fn log_record_error(record_id: &str, err: &EngineError) {
    match err.severity() {
        Level::DEBUG => tracing::debug!(record_id, error = %err, "Skipping record this tick"),
        Level::WARN => tracing::warn!(record_id, error = %err, "Record skipped"),
        _ => tracing::error!(record_id, error = %err, "Record failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_errors_abort_tick() {
        assert!(EngineError::StoreUnavailable("down".into()).aborts_tick());
        assert!(!EngineError::missing_price("NSE_FO|1").aborts_tick());
        assert!(!EngineError::invalid_price("entry", "abc").aborts_tick());
        assert!(!EngineError::MalformedLegDescriptor("x".into()).aborts_tick());
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(EngineError::missing_price("k").severity(), Level::DEBUG);
        assert_eq!(EngineError::invalid_price("target", "n/a").severity(), Level::WARN);
        assert_eq!(
            EngineError::StoreUnavailable("timeout".into()).severity(),
            Level::ERROR
        );
    }
}
