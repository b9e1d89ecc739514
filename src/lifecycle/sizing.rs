use std::collections::BTreeMap;

use crate::config::types::EngineConfig;

/// Quantity assignment per instrument class
///
/// Derivatives trade in exchange-defined lots; the underlying symbol picks
/// the lot, matched on the longest configured prefix so `BANKNIFTY...` is
/// never sized as `NIFTY`.
#[derive(Debug, Clone)]
pub struct LotSizePolicy {
    lots: BTreeMap<String, u32>,
    default_lot: u32,
}

impl LotSizePolicy {
    pub fn new(lots: BTreeMap<String, u32>, default_lot: u32) -> Self {
        Self {
            lots: lots
                .into_iter()
                .map(|(symbol, lot)| (symbol.to_uppercase(), lot))
                .collect(),
            default_lot: default_lot.max(1),
        }
    }

    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self::new(cfg.lot_sizes.clone(), cfg.default_lot_size)
    }

    /// Lot size for an underlying or trading symbol
    pub fn lot_size(&self, symbol: &str) -> u32 {
        let symbol = symbol.trim().to_uppercase();
        self.lots
            .iter()
            .filter(|(prefix, _)| symbol.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, lot)| *lot)
            .unwrap_or(self.default_lot)
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }
}

impl Default for LotSizePolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
