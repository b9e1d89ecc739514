//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::AppConfig;
use crate::common::errors::{EngineError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with TRADE__, e.g. `TRADE__CHARGES__STT_RATE`)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("TRADE")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| EngineError::Configuration(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| EngineError::Configuration(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_without_file() {
        let cfg = load_config(Some("does-not-exist.toml")).expect("defaults should load");
        assert_eq!(cfg.engine.buy_entry_tolerance_pct, dec!(2));
        assert_eq!(cfg.engine.sell_entry_tolerance_pct, dec!(5));
        assert_eq!(cfg.engine.lot_sizes.get("NIFTY"), Some(&75));
        assert_eq!(cfg.market.timezone, "Asia/Kolkata");
        assert_eq!(cfg.price_feed.max_in_flight, 1);
    }

    #[test]
    fn test_sell_tolerance_is_wider_by_default() {
        let cfg = AppConfig::default();
        assert!(cfg.engine.sell_entry_tolerance_pct > cfg.engine.buy_entry_tolerance_pct);
    }
}
