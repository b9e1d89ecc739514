//! Lifecycle state machine shared by single-leg suggestions and strategy legs
//!
//! ```text
//! suggested ──► active ──► target_hit | stoploss_hit | active_expired
//!     │            │       strategy_exit | cancelled
//!     └────────────┴─────► expired (from suggested) | cancelled
//! ```
//!
//! Terminal states are absorbing. Entry and exit rules are direction aware:
//! a SELL position profits when price falls, so its target sits below the
//! entry and its stop-loss above it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::common::errors::{EngineError, Result};
use crate::common::types::{Lifecycle, PnlOutcome, PriceLevels, Side, SuggestionStatus};

/// Whether the lifecycle allows moving from `from` to `to`
pub fn can_transition(from: SuggestionStatus, to: SuggestionStatus) -> bool {
    use SuggestionStatus::*;
    match (from, to) {
        (Suggested, Active | Expired | Cancelled) => true,
        (
            Active,
            TargetHit | StoplossHit | ActiveExpired | Cancelled | StrategyExit,
        ) => true,
        _ => false,
    }
}

/// Entry tolerance band, as a percentage of the planned entry price.
///
/// SELL positions get the wider band since premium-selling fills vary more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryTolerance {
    pub buy_pct: Decimal,
    pub sell_pct: Decimal,
}

impl EntryTolerance {
    pub fn new(buy_pct: Decimal, sell_pct: Decimal) -> Self {
        Self { buy_pct, sell_pct }
    }

    pub fn pct_for(&self, side: Side) -> Decimal {
        match side {
            Side::Buy => self.buy_pct,
            Side::Sell => self.sell_pct,
        }
    }

    /// Absolute half-width of the band around `entry`
    pub fn band(&self, side: Side, entry: Decimal) -> Decimal {
        entry.abs() * self.pct_for(side) / dec!(100)
    }

    pub fn contains(&self, side: Side, entry: Decimal, price: Decimal) -> bool {
        (price - entry).abs() <= self.band(side, entry)
    }
}

impl Default for EntryTolerance {
    fn default() -> Self {
        Self::new(dec!(2), dec!(5))
    }
}

/// Why a record qualifies for activation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySignal {
    /// Price is inside the tolerance band
    AtEntry,
    /// Price already moved past entry toward target, without reaching it
    FavorableMove,
    /// A sibling leg of the same strategy activated
    SiblingActivated,
}

impl std::fmt::Display for EntrySignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntrySignal::AtEntry => write!(f, "price at entry"),
            EntrySignal::FavorableMove => write!(f, "favorable move past entry"),
            EntrySignal::SiblingActivated => write!(f, "sibling leg activated"),
        }
    }
}

/// Evaluate the entry condition for one instrument
pub fn evaluate_entry(
    side: Side,
    levels: &PriceLevels,
    price: Decimal,
    tolerance: &EntryTolerance,
) -> Option<EntrySignal> {
    if tolerance.contains(side, levels.entry, price) {
        return Some(EntrySignal::AtEntry);
    }

    let favorable = match side {
        Side::Buy => price > levels.entry && price < levels.target,
        Side::Sell => price < levels.entry && price > levels.target,
    };
    favorable.then_some(EntrySignal::FavorableMove)
}

/// Evaluate target and stop-loss for an active position.
///
/// BUY: target when `price >= target`, stop-loss when `price <= stop_loss`.
/// SELL: target when `price <= target`, stop-loss when `price >= stop_loss`.
pub fn evaluate_exit(side: Side, levels: &PriceLevels, price: Decimal) -> Option<SuggestionStatus> {
    let (target_hit, stop_hit) = match side {
        Side::Buy => (price >= levels.target, price <= levels.stop_loss),
        Side::Sell => (price <= levels.target, price >= levels.stop_loss),
    };

    if target_hit {
        Some(SuggestionStatus::TargetHit)
    } else if stop_hit {
        Some(SuggestionStatus::StoplossHit)
    } else {
        None
    }
}

/// Exit decision for an active position, given whether its validity lapsed.
///
/// An expired position is still checked against target and stop-loss first,
/// so a rule that is met at the expiry check wins over `active_expired`.
pub fn resolve_active(
    side: Side,
    levels: &PriceLevels,
    price: Decimal,
    expired: bool,
) -> Option<SuggestionStatus> {
    match evaluate_exit(side, levels, price) {
        Some(status) => Some(status),
        None if expired => Some(SuggestionStatus::ActiveExpired),
        None => None,
    }
}

/// Exit data stamped onto a lifecycle
#[derive(Debug, Clone)]
pub struct Exit {
    pub price: Decimal,
    pub pnl: PnlOutcome,
    pub reason: String,
}

impl Lifecycle {
    fn ensure_transition(&self, record_id: &str, to: SuggestionStatus) -> Result<()> {
        if can_transition(self.status, to) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                record_id: record_id.to_string(),
                from: self.status.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// `suggested -> active`
    pub fn activate(
        &mut self,
        record_id: &str,
        price: Decimal,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_transition(record_id, SuggestionStatus::Active)?;
        self.status = SuggestionStatus::Active;
        self.entry_price = Some(price);
        self.entry_time = Some(now);
        self.quantity = Some(quantity);
        Ok(())
    }

    /// `active -> terminal` with exit price and P&L
    pub fn close(
        &mut self,
        record_id: &str,
        to: SuggestionStatus,
        exit: Exit,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.status != SuggestionStatus::Active {
            return Err(EngineError::InvalidTransition {
                record_id: record_id.to_string(),
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.ensure_transition(record_id, to)?;
        self.status = to;
        self.exit_price = Some(exit.price);
        self.exit_time = Some(now);
        self.exit_reason = Some(exit.reason);
        self.pnl = Some(exit.pnl);
        Ok(())
    }

    /// `suggested -> expired|cancelled`, no prices involved
    pub fn retire_unentered(
        &mut self,
        record_id: &str,
        to: SuggestionStatus,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.status != SuggestionStatus::Suggested
            || !matches!(to, SuggestionStatus::Expired | SuggestionStatus::Cancelled)
        {
            return Err(EngineError::InvalidTransition {
                record_id: record_id.to_string(),
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.exit_time = Some(now);
        self.exit_reason = Some(reason.into());
        Ok(())
    }
}
