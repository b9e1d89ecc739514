//! Record types shared by the processors, the store adapters and the scheduler

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Market view of a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

/// Risk tier assigned by the idea generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

/// Trade direction of a record or leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for BUY, -1 for SELL; used for signed net premium
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle state shared by suggestions and strategy legs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Suggested,
    Active,
    TargetHit,
    StoplossHit,
    ActiveExpired,
    Expired,
    Cancelled,
    StrategyExit,
}

impl SuggestionStatus {
    pub const TERMINAL: [SuggestionStatus; 6] = [
        SuggestionStatus::TargetHit,
        SuggestionStatus::StoplossHit,
        SuggestionStatus::ActiveExpired,
        SuggestionStatus::Expired,
        SuggestionStatus::Cancelled,
        SuggestionStatus::StrategyExit,
    ];

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SuggestionStatus::Suggested | SuggestionStatus::Active)
    }

    /// Terminal states reached by a price rule rather than by time or fiat
    pub fn is_rule_exit(&self) -> bool {
        matches!(self, SuggestionStatus::TargetHit | SuggestionStatus::StoplossHit)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionStatus::Suggested => "suggested",
            SuggestionStatus::Active => "active",
            SuggestionStatus::TargetHit => "target_hit",
            SuggestionStatus::StoplossHit => "stoploss_hit",
            SuggestionStatus::ActiveExpired => "active_expired",
            SuggestionStatus::Expired => "expired",
            SuggestionStatus::Cancelled => "cancelled",
            SuggestionStatus::StrategyExit => "strategy_exit",
        }
    }
}

impl std::fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived status of a multi-leg strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyStatus {
    /// All legs pending
    Suggested,
    /// Mixed leg states
    PartialActive,
    /// All legs active
    FullyActive,
    /// All legs terminal
    Completed,
}

impl std::fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyStatus::Suggested => write!(f, "suggested"),
            StrategyStatus::PartialActive => write!(f, "partial_active"),
            StrategyStatus::FullyActive => write!(f, "fully_active"),
            StrategyStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Category of an audit note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    Info,
    Activation,
    Exit,
    Expiry,
    Cancellation,
    Warning,
}

/// Append-only audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditNote {
    pub at: DateTime<Utc>,
    pub kind: NoteKind,
    pub message: String,
}

/// What is being traded.
///
/// For multi-leg ideas `strike` and `instrument_key` hold comma separated
/// lists, one entry per leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentDescriptor {
    /// Underlying symbol, e.g. `NIFTY`
    pub symbol: String,
    /// Strike/expiry encoding, e.g. `24500 CE` or `BUY 24500 CE, SELL 24700 CE`
    #[serde(default)]
    pub strike: String,
    /// Broker instrument key(s) used for price lookups
    pub instrument_key: String,
}

/// Levels as produced by the idea generator. Values stay raw text until
/// they are parsed, since multi-leg plans carry delimited lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub entry: String,
    pub target: String,
    pub stop_loss: String,
    #[serde(default)]
    pub time_frame: Option<String>,
}

/// Parsed numeric levels for one instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevels {
    pub entry: Decimal,
    pub target: Decimal,
    pub stop_loss: Decimal,
}

impl PriceLevels {
    pub fn new(entry: Decimal, target: Decimal, stop_loss: Decimal) -> Self {
        Self {
            entry,
            target,
            stop_loss,
        }
    }
}

/// Transaction charges for one round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChargeBreakdown {
    pub brokerage: Decimal,
    /// Securities transaction tax
    pub stt: Decimal,
    pub regulatory_fee: Decimal,
    /// Tax on brokerage
    pub gst: Decimal,
    pub total: Decimal,
}

impl std::ops::Add for ChargeBreakdown {
    type Output = ChargeBreakdown;

    fn add(self, rhs: Self) -> Self::Output {
        ChargeBreakdown {
            brokerage: self.brokerage + rhs.brokerage,
            stt: self.stt + rhs.stt,
            regulatory_fee: self.regulatory_fee + rhs.regulatory_fee,
            gst: self.gst + rhs.gst,
            total: self.total + rhs.total,
        }
    }
}

impl std::iter::Sum for ChargeBreakdown {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(ChargeBreakdown::default(), |acc, c| acc + c)
    }
}

/// Computed financial result of an exit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnlOutcome {
    /// Per-unit price difference
    pub raw_pnl: Decimal,
    /// `raw_pnl * quantity`
    pub gross_pnl: Decimal,
    pub charges: ChargeBreakdown,
    /// `gross_pnl - charges.total`
    pub net_pnl: Decimal,
    pub pnl_percent: Decimal,
}

/// Mutable lifecycle fields carried by both suggestions and legs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub status: SuggestionStatus,
    #[serde(default)]
    pub entry_price: Option<Decimal>,
    #[serde(default)]
    pub entry_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_price: Option<Decimal>,
    #[serde(default)]
    pub exit_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_reason: Option<String>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub pnl: Option<PnlOutcome>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            status: SuggestionStatus::Suggested,
            entry_price: None,
            entry_time: None,
            exit_price: None,
            exit_time: None,
            exit_reason: None,
            quantity: None,
            pnl: None,
        }
    }
}

impl Lifecycle {
    pub fn was_activated(&self) -> bool {
        self.entry_time.is_some()
    }

    pub fn net_pnl(&self) -> Decimal {
        self.pnl.map(|p| p.net_pnl).unwrap_or_default()
    }

    /// Check the entry/exit field invariants for the current status
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let entry_set = self.entry_price.is_some() && self.entry_time.is_some();
        let entry_unset = self.entry_price.is_none() && self.entry_time.is_none();
        let exit_unset =
            self.exit_price.is_none() && self.exit_time.is_none() && self.pnl.is_none();

        match self.status {
            SuggestionStatus::Suggested => {
                if !entry_unset || !exit_unset {
                    return Err("suggested record carries entry or exit fields".into());
                }
            }
            SuggestionStatus::Active => {
                if !entry_set || !exit_unset {
                    return Err("active record must have entry fields and no exit fields".into());
                }
            }
            SuggestionStatus::Expired | SuggestionStatus::Cancelled
                if !self.was_activated() =>
            {
                // Never entered: only the exit time is stamped
                if !entry_unset || self.exit_time.is_none() || self.exit_price.is_some() {
                    return Err(format!(
                        "{} record without activation must only carry an exit time",
                        self.status
                    ));
                }
            }
            _ => {
                if !entry_set
                    || self.exit_price.is_none()
                    || self.exit_time.is_none()
                    || self.pnl.is_none()
                {
                    return Err(format!(
                        "{} record must carry entry, exit and P&L fields",
                        self.status
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A proposed trade idea
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    /// Shared id of the strategy this suggestion was decomposed into
    #[serde(default)]
    pub strategy_id: Option<String>,
    pub title: String,
    pub sentiment: Sentiment,
    pub instrument: InstrumentDescriptor,
    pub plan: TradePlan,
    /// 0-100
    pub confidence: u8,
    pub risk: RiskTier,
    /// Explicit direction; inferred from the descriptor when absent
    #[serde(default)]
    pub direction: Option<Side>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
    /// Set once a multi-leg suggestion has been decomposed
    #[serde(default)]
    pub strategy_processed: bool,
    #[serde(default)]
    pub notes: Vec<AuditNote>,
}

impl Suggestion {
    pub fn status(&self) -> SuggestionStatus {
        self.lifecycle.status
    }

    /// Whether the descriptor names two or more instruments
    pub fn is_multi_leg(&self) -> bool {
        split_list(&self.instrument.strike).len() >= 2
            || split_list(&self.instrument.instrument_key).len() >= 2
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.map(|v| v <= now).unwrap_or(false)
    }

    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        self.lifecycle
            .check_invariants()
            .map_err(|e| format!("suggestion {}: {}", self.id, e))
    }
}

/// One instrument-level trade of a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub id: String,
    /// Position within the strategy, zero based
    pub index: usize,
    pub symbol: String,
    /// Leg descriptor as written by the generator, e.g. `SELL 24700 CE`
    pub descriptor: String,
    pub instrument_key: String,
    pub side: Side,
    pub levels: PriceLevels,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub notes: Vec<AuditNote>,
}

impl Leg {
    pub fn status(&self) -> SuggestionStatus {
        self.lifecycle.status
    }

    pub fn push_note(&mut self, kind: NoteKind, message: impl Into<String>, at: DateTime<Utc>) {
        self.notes.push(AuditNote {
            at,
            kind,
            message: message.into(),
        });
    }

    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        self.lifecycle
            .check_invariants()
            .map_err(|e| format!("leg {}: {}", self.id, e))
    }
}

/// A multi-leg idea traded as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    /// Shared strategy id; also the key for idempotent decomposition
    pub id: String,
    pub parent_suggestion_id: String,
    pub title: String,
    pub sentiment: Sentiment,
    pub confidence: u8,
    pub risk: RiskTier,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    pub legs: Vec<Leg>,
    pub status: StrategyStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Status of the leg whose price rule ended the strategy
    #[serde(default)]
    pub resolution: Option<SuggestionStatus>,
    #[serde(default)]
    pub total_gross_pnl: Decimal,
    #[serde(default)]
    pub total_charges: ChargeBreakdown,
    #[serde(default)]
    pub total_net_pnl: Decimal,
}

impl Strategy {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.map(|v| v <= now).unwrap_or(false)
    }

    pub fn instrument_keys(&self) -> impl Iterator<Item = &str> {
        self.legs.iter().map(|l| l.instrument_key.as_str())
    }

    pub fn has_leg_in(&self, status: SuggestionStatus) -> bool {
        self.legs.iter().any(|l| l.status() == status)
    }

    /// Derive the strategy status from its legs
    pub fn derive_status(&self) -> StrategyStatus {
        if self.legs.iter().all(|l| l.status().is_terminal()) {
            StrategyStatus::Completed
        } else if self.legs.iter().all(|l| l.status() == SuggestionStatus::Suggested) {
            StrategyStatus::Suggested
        } else if self.legs.iter().all(|l| l.status() == SuggestionStatus::Active) {
            StrategyStatus::FullyActive
        } else {
            StrategyStatus::PartialActive
        }
    }

    /// Recompute derived status and aggregates after a leg mutation
    pub fn rollup(&mut self, now: DateTime<Utc>) {
        self.total_gross_pnl = self
            .legs
            .iter()
            .filter_map(|l| l.lifecycle.pnl.map(|p| p.gross_pnl))
            .sum();
        self.total_charges = self
            .legs
            .iter()
            .filter_map(|l| l.lifecycle.pnl.map(|p| p.charges))
            .sum();
        self.total_net_pnl = self.legs.iter().map(|l| l.lifecycle.net_pnl()).sum();

        self.activated_at = self.legs.iter().filter_map(|l| l.lifecycle.entry_time).min();
        if self.resolution.is_none() {
            self.resolution = self
                .legs
                .iter()
                .filter(|l| l.status().is_rule_exit())
                .min_by_key(|l| l.lifecycle.exit_time)
                .map(|l| l.status());
        }

        self.status = self.derive_status();
        if self.status == StrategyStatus::Completed {
            self.completed_at.get_or_insert(now);
        }
    }

    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        for leg in &self.legs {
            leg.check_invariants()?;
        }
        let sum: Decimal = self.legs.iter().map(|l| l.lifecycle.net_pnl()).sum();
        if sum != self.total_net_pnl {
            return Err(format!(
                "strategy {}: aggregate net P&L {} != leg sum {}",
                self.id, self.total_net_pnl, sum
            ));
        }
        if self.status != self.derive_status() {
            return Err(format!(
                "strategy {}: stored status {} != derived {}",
                self.id,
                self.status,
                self.derive_status()
            ));
        }
        if (self.status == StrategyStatus::Completed) != self.completed_at.is_some() {
            return Err(format!(
                "strategy {}: completion time does not match status",
                self.id
            ));
        }
        Ok(())
    }
}

/// Split a list on `,` or `;`, dropping blanks.
///
/// A comma with a digit on both sides is a thousands separator (`24,500`,
/// `₹1,250`) and stays inside its value; list commas are followed by a space
/// or a non-digit.
pub fn split_list(raw: &str) -> Vec<&str> {
    let bytes = raw.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, c) in raw.char_indices() {
        let separator = match c {
            ';' => true,
            ',' => {
                let grouping = i > 0
                    && bytes[i - 1].is_ascii_digit()
                    && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit());
                !grouping
            }
            _ => false,
        };
        if separator {
            parts.push(&raw[start..i]);
            start = i + 1;
        }
    }
    parts.push(&raw[start..]);

    parts
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn leg(status: SuggestionStatus, net: Option<Decimal>) -> Leg {
        let mut lifecycle = Lifecycle {
            status,
            ..Lifecycle::default()
        };
        if let Some(net) = net {
            lifecycle.pnl = Some(PnlOutcome {
                raw_pnl: Decimal::ZERO,
                gross_pnl: net,
                charges: ChargeBreakdown::default(),
                net_pnl: net,
                pnl_percent: Decimal::ZERO,
            });
        }
        Leg {
            id: "s-L1".into(),
            index: 0,
            symbol: "NIFTY".into(),
            descriptor: "BUY 24500 CE".into(),
            instrument_key: "NSE_FO|1".into(),
            side: Side::Buy,
            levels: PriceLevels::new(dec!(100), dec!(150), dec!(80)),
            lifecycle,
            notes: Vec::new(),
        }
    }

    fn strategy(legs: Vec<Leg>) -> Strategy {
        Strategy {
            id: "s".into(),
            parent_suggestion_id: "s".into(),
            title: "Bull call spread".into(),
            sentiment: Sentiment::Bullish,
            confidence: 70,
            risk: RiskTier::Medium,
            valid_until: None,
            legs,
            status: StrategyStatus::Suggested,
            created_at: Utc::now(),
            activated_at: None,
            completed_at: None,
            resolution: None,
            total_gross_pnl: Decimal::ZERO,
            total_charges: ChargeBreakdown::default(),
            total_net_pnl: Decimal::ZERO,
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SuggestionStatus::Suggested.is_terminal());
        assert!(!SuggestionStatus::Active.is_terminal());
        for status in SuggestionStatus::TERMINAL {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
    }

    #[test]
    fn test_derived_strategy_status() {
        use SuggestionStatus::*;
        let s = strategy(vec![leg(Suggested, None), leg(Suggested, None)]);
        assert_eq!(s.derive_status(), StrategyStatus::Suggested);

        let s = strategy(vec![leg(Active, None), leg(Suggested, None)]);
        assert_eq!(s.derive_status(), StrategyStatus::PartialActive);

        let s = strategy(vec![leg(Active, None), leg(Active, None)]);
        assert_eq!(s.derive_status(), StrategyStatus::FullyActive);

        let s = strategy(vec![leg(TargetHit, None), leg(Active, None)]);
        assert_eq!(s.derive_status(), StrategyStatus::PartialActive);

        let s = strategy(vec![leg(TargetHit, None), leg(StrategyExit, None)]);
        assert_eq!(s.derive_status(), StrategyStatus::Completed);
    }

    #[test]
    fn test_rollup_sums_leg_net_pnl() {
        use SuggestionStatus::*;
        let mut s = strategy(vec![
            leg(StoplossHit, Some(dec!(-812.40))),
            leg(StrategyExit, Some(dec!(311.15))),
        ]);
        let now = Utc::now();
        s.rollup(now);

        assert_eq!(s.total_net_pnl, dec!(-501.25));
        assert_eq!(s.status, StrategyStatus::Completed);
        assert_eq!(s.completed_at, Some(now));
        assert_eq!(s.resolution, Some(StoplossHit));
    }

    #[test]
    fn test_multi_leg_detection() {
        let raw = "BUY 24500 CE, SELL 24700 CE";
        assert_eq!(split_list(raw), vec!["BUY 24500 CE", "SELL 24700 CE"]);
        assert_eq!(split_list(" , "), Vec::<&str>::new());
        assert_eq!(split_list("NSE_FO|1,NSE_FO|2"), vec!["NSE_FO|1", "NSE_FO|2"]);
        assert_eq!(split_list("120; 45"), vec!["120", "45"]);
    }

    #[test]
    fn test_grouping_commas_stay_in_value() {
        assert_eq!(split_list("24,500 CE"), vec!["24,500 CE"]);
        assert_eq!(split_list("₹1,250, ₹980"), vec!["₹1,250", "₹980"]);
        assert_eq!(split_list("1,25,000;98,000"), vec!["1,25,000", "98,000"]);

        let mut raw = Suggestion {
            id: "s1".into(),
            strategy_id: None,
            title: "NIFTY 24500 CE breakout".into(),
            sentiment: Sentiment::Bullish,
            instrument: InstrumentDescriptor {
                symbol: "NIFTY".into(),
                strike: "24,500 CE".into(),
                instrument_key: "NSE_FO|43885".into(),
            },
            plan: TradePlan {
                entry: "₹1,250".into(),
                target: "₹1,400".into(),
                stop_loss: "₹1,100".into(),
                time_frame: None,
            },
            confidence: 70,
            risk: RiskTier::Medium,
            direction: None,
            created_at: Utc::now(),
            valid_until: None,
            lifecycle: Lifecycle::default(),
            strategy_processed: false,
            notes: Vec::new(),
        };
        assert!(!raw.is_multi_leg());
        raw.instrument.strike = "24,500 CE, 24,700 CE".into();
        assert!(raw.is_multi_leg());
    }
}
