use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::common::types::{ChargeBreakdown, PnlOutcome, Side};
use crate::config::types::ChargeConfig;

/// How the per-unit P&L sign is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PnlConvention {
    /// `exit - entry` whatever the sentiment.
    ///
    /// Single-leg ideas are all implemented by buying an option premium:
    /// sentiment picks the contract (call or put), not the arithmetic sign.
    /// Flipping this for bearish records would invert their P&L.
    LongPremium,
    /// `exit - entry` for BUY legs, `entry - exit` for SELL legs
    Directional(Side),
}

impl PnlConvention {
    pub fn raw_pnl(&self, entry: Decimal, exit: Decimal) -> Decimal {
        match self {
            PnlConvention::LongPremium | PnlConvention::Directional(Side::Buy) => exit - entry,
            PnlConvention::Directional(Side::Sell) => entry - exit,
        }
    }
}

/// Charge and P&L calculation
///
/// Pure functions of the charge schedule and the trade; every component is
/// rounded to paise so results are reproducible.
#[derive(Debug, Clone)]
pub struct ChargeCalculator {
    schedule: ChargeConfig,
}

impl ChargeCalculator {
    pub fn new(schedule: ChargeConfig) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &ChargeConfig {
        &self.schedule
    }

    /// Charges for one round trip
    ///
    /// - brokerage: flat
    /// - STT: `exit * quantity * stt_rate`
    /// - regulatory: `(entry + exit) * quantity * regulatory_rate`
    /// - GST: `brokerage * gst_rate`
    pub fn charges(&self, entry: Decimal, exit: Decimal, quantity: u32) -> ChargeBreakdown {
        let qty = Decimal::from(quantity);
        let brokerage = money(self.schedule.brokerage_flat);
        let stt = money(exit * qty * self.schedule.stt_rate);
        let regulatory_fee = money((entry + exit) * qty * self.schedule.regulatory_rate);
        let gst = money(brokerage * self.schedule.gst_rate);

        ChargeBreakdown {
            brokerage,
            stt,
            regulatory_fee,
            gst,
            total: brokerage + stt + regulatory_fee + gst,
        }
    }

    /// Full P&L for an exit
    pub fn outcome(
        &self,
        convention: PnlConvention,
        entry: Decimal,
        exit: Decimal,
        quantity: u32,
    ) -> PnlOutcome {
        let raw_pnl = convention.raw_pnl(entry, exit);
        let gross_pnl = raw_pnl * Decimal::from(quantity);
        let charges = self.charges(entry, exit, quantity);
        let pnl_percent = if entry.is_zero() {
            Decimal::ZERO
        } else {
            money(raw_pnl / entry * dec!(100))
        };

        PnlOutcome {
            raw_pnl,
            gross_pnl,
            charges,
            net_pnl: gross_pnl - charges.total,
            pnl_percent,
        }
    }
}

impl Default for ChargeCalculator {
    fn default() -> Self {
        Self::new(ChargeConfig::default())
    }
}

pub(crate) fn money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_schedule() {
        let calc = ChargeCalculator::default();
        assert_eq!(calc.schedule().brokerage_flat, dec!(40));
        assert_eq!(calc.schedule().gst_rate, dec!(0.18));
    }

    #[test]
    fn test_charge_breakdown() {
        // Entry 54, exit 82, qty 75
        // STT = 82 * 75 * 0.001 = 6.15
        // Regulatory = (54 + 82) * 75 * 0.0005 = 5.10
        // GST = 40 * 0.18 = 7.20
        let charges = ChargeCalculator::default().charges(dec!(54), dec!(82), 75);
        assert_eq!(charges.brokerage, dec!(40));
        assert_eq!(charges.stt, dec!(6.15));
        assert_eq!(charges.regulatory_fee, dec!(5.10));
        assert_eq!(charges.gst, dec!(7.20));
        assert_eq!(charges.total, dec!(58.45));
    }

    #[test]
    fn test_buy_target_outcome() {
        let out = ChargeCalculator::default().outcome(PnlConvention::LongPremium, dec!(54), dec!(82), 75);
        assert_eq!(out.raw_pnl, dec!(28));
        assert_eq!(out.gross_pnl, dec!(2100));
        assert_eq!(out.net_pnl, dec!(2100) - out.charges.total);
        assert_eq!(out.net_pnl, dec!(2041.55));
        assert_eq!(out.pnl_percent, dec!(51.85));
    }

    #[test]
    fn test_long_premium_ignores_bearish_view() {
        // A bearish idea bought as a put still makes money when the premium rises
        let out = ChargeCalculator::default().outcome(PnlConvention::LongPremium, dec!(100), dec!(130), 35);
        assert_eq!(out.raw_pnl, dec!(30));
        let out = ChargeCalculator::default().outcome(PnlConvention::LongPremium, dec!(100), dec!(70), 35);
        assert_eq!(out.raw_pnl, dec!(-30));
    }

    #[test]
    fn test_sell_leg_sign() {
        let out = ChargeCalculator::default().outcome(
            PnlConvention::Directional(Side::Sell),
            dec!(120),
            dec!(55),
            75,
        );
        assert_eq!(out.raw_pnl, dec!(65));
        assert_eq!(out.gross_pnl, dec!(4875));
    }

    #[test]
    fn test_deterministic() {
        let calc = ChargeCalculator::default();
        let a = calc.outcome(PnlConvention::LongPremium, dec!(123.45), dec!(98.7), 65);
        let b = calc.outcome(PnlConvention::LongPremium, dec!(123.45), dec!(98.7), 65);
        assert_eq!(a, b);
        assert_eq!(a.charges.total.to_string(), b.charges.total.to_string());
    }

    #[test]
    fn test_zero_entry_has_zero_percent() {
        let out = ChargeCalculator::default().outcome(PnlConvention::LongPremium, dec!(0), dec!(5), 1);
        assert_eq!(out.pnl_percent, Decimal::ZERO);
    }
}
