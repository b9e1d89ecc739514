//! Lifecycle processing for multi-leg strategies
//!
//! Legs of one strategy are treated as a single risk unit:
//! - one qualifying leg activates every pending sibling, each at its own price
//! - the first leg to hit target or stop-loss forces every other active leg
//!   out as `strategy_exit`, and pending legs are cancelled
//! - after every mutation the strategy is rolled up and its parent
//!   suggestion is brought in line

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::charges::{money, ChargeCalculator, PnlConvention};
use super::price_cache::PriceSnapshot;
use super::report::TickReport;
use super::sizing::LotSizePolicy;
use super::state::{evaluate_entry, evaluate_exit, EntrySignal, EntryTolerance, Exit};
use crate::common::errors::{EngineError, Result};
use crate::common::traits::{StrategyStore, SuggestionStore};
use crate::common::types::{
    Leg, NoteKind, PnlOutcome, Side, Strategy, StrategyStatus, SuggestionStatus,
};

const PROCESSOR: &str = "multi_leg";

/// Leg-level changes made to one strategy in one pass
#[derive(Debug, Default)]
struct LegChanges {
    activated: Vec<String>,
    exits: Vec<SuggestionStatus>,
}

impl LegChanges {
    fn is_empty(&self) -> bool {
        self.activated.is_empty() && self.exits.is_empty()
    }

    fn apply_to(self, report: &mut TickReport) {
        report.activated.extend(self.activated);
        for status in self.exits {
            report.record_exit(status);
        }
    }
}

pub struct MultiLegProcessor {
    suggestions: Arc<dyn SuggestionStore>,
    strategies: Arc<dyn StrategyStore>,
    tolerance: EntryTolerance,
    lots: LotSizePolicy,
    charges: ChargeCalculator,
}

impl MultiLegProcessor {
    pub fn new(
        suggestions: Arc<dyn SuggestionStore>,
        strategies: Arc<dyn StrategyStore>,
        tolerance: EntryTolerance,
        lots: LotSizePolicy,
        charges: ChargeCalculator,
    ) -> Self {
        Self {
            suggestions,
            strategies,
            tolerance,
            lots,
            charges,
        }
    }

    /// Instrument keys of every non-terminal leg
    pub async fn watched_keys(&self) -> Result<Vec<String>> {
        let open = self.strategies.find_open_strategies().await?;
        Ok(open
            .iter()
            .flat_map(|s| s.legs.iter())
            .filter(|l| !l.status().is_terminal())
            .map(|l| l.instrument_key.clone())
            .collect())
    }

    /// Evaluate strategies with pending legs for expiry and joint activation
    #[instrument(skip(self, prices))]
    pub async fn scan_suggested(&self, prices: &PriceSnapshot, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::new(PROCESSOR);
        let open = match self.strategies.find_open_strategies().await {
            Ok(open) => open,
            Err(e) => {
                report.fail(PROCESSOR, e);
                return report;
            }
        };

        for mut strategy in open
            .into_iter()
            .filter(|s| s.has_leg_in(SuggestionStatus::Suggested))
        {
            report.examined += 1;
            match self.evaluate_pending(&mut strategy, prices, now).await {
                Ok(changes) => {
                    if !changes.activated.is_empty() {
                        report.strategies_touched.push(strategy.id.clone());
                    }
                    changes.apply_to(&mut report);
                }
                Err(e) => {
                    if report.fail(&strategy.id, e) {
                        break;
                    }
                }
            }
        }

        debug!(
            examined = report.examined,
            activated = report.activated.len(),
            "Pending leg scan complete"
        );
        report
    }

    async fn evaluate_pending(
        &self,
        strategy: &mut Strategy,
        prices: &PriceSnapshot,
        now: DateTime<Utc>,
    ) -> Result<LegChanges> {
        let mut changes = LegChanges::default();

        if strategy.is_expired_at(now) {
            for leg in pending_legs(strategy) {
                leg.lifecycle.retire_unentered(
                    &leg.id,
                    SuggestionStatus::Expired,
                    "validity lapsed before entry",
                    now,
                )?;
                leg.push_note(NoteKind::Expiry, "Expired before entry", now);
                changes.exits.push(SuggestionStatus::Expired);
            }
            self.persist(strategy, now).await?;
            info!(strategy_id = %strategy.id, legs = changes.exits.len(), "Pending legs expired");
            return Ok(changes);
        }

        let Some((signal, trigger)) = self.entry_signal(strategy, prices)? else {
            return Ok(changes);
        };
        debug!(strategy_id = %strategy.id, trigger_leg = %trigger, %signal, "Strategy entry condition met");

        for leg in strategy
            .legs
            .iter_mut()
            .filter(|l| l.status() == SuggestionStatus::Suggested)
        {
            let Some(price) = prices.get(&leg.instrument_key) else {
                warn!(
                    strategy_id = %strategy.id,
                    leg_id = %leg.id,
                    instrument_key = %leg.instrument_key,
                    "No price for pending leg, activation deferred to next tick"
                );
                continue;
            };
            let quantity = self.lots.lot_size(&leg.symbol);
            leg.lifecycle.activate(&leg.id, price, quantity, now)?;

            let reason = if leg.id == trigger {
                signal
            } else {
                EntrySignal::SiblingActivated
            };
            leg.push_note(
                NoteKind::Activation,
                format!("{} activated at ₹{} for {} units ({})", leg.side, price, quantity, reason),
                now,
            );
            changes.activated.push(leg.id.clone());
        }

        if !changes.activated.is_empty() {
            self.persist(strategy, now).await?;
            info!(
                strategy_id = %strategy.id,
                legs = changes.activated.len(),
                status = %strategy.status,
                "Strategy legs activated"
            );
        }
        Ok(changes)
    }

    /// Entry trigger for a strategy, with the id of the leg that caused it.
    ///
    /// An already active leg makes every pending sibling eligible. Otherwise
    /// pending legs are checked in order; if none qualifies and some had no
    /// price, `MissingPriceData` is returned for the first of them.
    fn entry_signal(
        &self,
        strategy: &Strategy,
        prices: &PriceSnapshot,
    ) -> Result<Option<(EntrySignal, String)>> {
        if let Some(active) = strategy
            .legs
            .iter()
            .find(|l| l.status() == SuggestionStatus::Active)
        {
            return Ok(Some((EntrySignal::SiblingActivated, active.id.clone())));
        }

        let mut missing = None;
        for leg in strategy
            .legs
            .iter()
            .filter(|l| l.status() == SuggestionStatus::Suggested)
        {
            match prices.get(&leg.instrument_key) {
                Some(price) => {
                    if let Some(signal) = evaluate_entry(leg.side, &leg.levels, price, &self.tolerance) {
                        return Ok(Some((signal, leg.id.clone())));
                    }
                }
                None => {
                    missing.get_or_insert_with(|| leg.instrument_key.clone());
                }
            }
        }

        match missing {
            Some(key) => Err(EngineError::missing_price(key)),
            None => Ok(None),
        }
    }

    /// Evaluate strategies with active legs for exits.
    ///
    /// Legs in `fresh_legs` were activated earlier in the same tick; their own
    /// target and stop-loss are first checked next tick, while the rest of
    /// their strategy is evaluated as usual.
    #[instrument(skip(self, prices, fresh_legs))]
    pub async fn scan_active(
        &self,
        prices: &PriceSnapshot,
        now: DateTime<Utc>,
        fresh_legs: &HashSet<String>,
    ) -> TickReport {
        let mut report = TickReport::new(PROCESSOR);
        let open = match self.strategies.find_open_strategies().await {
            Ok(open) => open,
            Err(e) => {
                report.fail(PROCESSOR, e);
                return report;
            }
        };

        for mut strategy in open
            .into_iter()
            .filter(|s| s.has_leg_in(SuggestionStatus::Active))
        {
            report.examined += 1;
            match self.evaluate_active(&mut strategy, prices, now, fresh_legs).await {
                Ok(changes) => changes.apply_to(&mut report),
                Err(e) => {
                    if report.fail(&strategy.id, e) {
                        break;
                    }
                }
            }
        }

        debug!(examined = report.examined, exits = ?report.exits, "Active leg scan complete");
        report
    }

    async fn evaluate_active(
        &self,
        strategy: &mut Strategy,
        prices: &PriceSnapshot,
        now: DateTime<Utc>,
        fresh_legs: &HashSet<String>,
    ) -> Result<LegChanges> {
        let mut changes = LegChanges::default();
        let mut missing: Option<String> = None;

        if strategy.resolution.is_none() {
            // First active leg, in leg order, whose rule is met
            let trigger = strategy
                .legs
                .iter()
                .enumerate()
                .filter(|(_, l)| l.status() == SuggestionStatus::Active && !fresh_legs.contains(&l.id))
                .find_map(|(pos, l)| {
                    let price = prices.get(&l.instrument_key)?;
                    evaluate_exit(l.side, &l.levels, price).map(|status| (pos, status, price))
                });

            if let Some((pos, status, price)) = trigger {
                let leg = &mut strategy.legs[pos];
                self.close_leg(leg, status, price, format!("{} at ₹{}", status, price), now)?;
                info!(
                    strategy_id = %strategy.id,
                    leg_id = %strategy.legs[pos].id,
                    %status,
                    %price,
                    "Leg exit resolves strategy"
                );
                strategy.resolution = Some(status);
                changes.exits.push(status);
            }
        }

        if let Some(resolution) = strategy.resolution {
            for leg in strategy.legs.iter_mut() {
                match leg.status() {
                    SuggestionStatus::Active => match prices.get(&leg.instrument_key) {
                        Some(price) => {
                            let reason = format!("sibling leg {}, closed at ₹{}", resolution, price);
                            self.close_leg(leg, SuggestionStatus::StrategyExit, price, reason, now)?;
                            changes.exits.push(SuggestionStatus::StrategyExit);
                        }
                        None => {
                            warn!(
                                strategy_id = %strategy.id,
                                leg_id = %leg.id,
                                "No price for sibling leg, strategy exit deferred to next tick"
                            );
                            missing.get_or_insert_with(|| leg.instrument_key.clone());
                        }
                    },
                    SuggestionStatus::Suggested => {
                        let reason = format!("strategy closed on {} before entry", resolution);
                        leg.lifecycle
                            .retire_unentered(&leg.id, SuggestionStatus::Cancelled, reason.as_str(), now)?;
                        leg.push_note(NoteKind::Cancellation, reason, now);
                        changes.exits.push(SuggestionStatus::Cancelled);
                    }
                    _ => {}
                }
            }
        } else if strategy.is_expired_at(now) {
            for leg in strategy.legs.iter_mut() {
                match leg.status() {
                    SuggestionStatus::Active => match prices.get(&leg.instrument_key) {
                        Some(price) => {
                            let reason = format!("validity lapsed, closed at ₹{}", price);
                            self.close_leg(leg, SuggestionStatus::ActiveExpired, price, reason, now)?;
                            changes.exits.push(SuggestionStatus::ActiveExpired);
                        }
                        None => {
                            missing.get_or_insert_with(|| leg.instrument_key.clone());
                        }
                    },
                    SuggestionStatus::Suggested => {
                        leg.lifecycle.retire_unentered(
                            &leg.id,
                            SuggestionStatus::Expired,
                            "validity lapsed before entry",
                            now,
                        )?;
                        leg.push_note(NoteKind::Expiry, "Expired before entry", now);
                        changes.exits.push(SuggestionStatus::Expired);
                    }
                    _ => {}
                }
            }
        } else {
            missing = strategy
                .legs
                .iter()
                .filter(|l| l.status() == SuggestionStatus::Active)
                .find(|l| prices.get(&l.instrument_key).is_none())
                .map(|l| l.instrument_key.clone());
        }

        if !changes.is_empty() {
            self.persist(strategy, now).await?;
        }
        match missing {
            Some(key) if changes.is_empty() => Err(EngineError::missing_price(key)),
            _ => Ok(changes),
        }
    }

    /// Close one active leg with direction-aware P&L
    fn close_leg(
        &self,
        leg: &mut Leg,
        status: SuggestionStatus,
        price: Decimal,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let entry = leg.lifecycle.entry_price.ok_or_else(|| {
            EngineError::Internal(format!("active leg {} has no entry price", leg.id))
        })?;
        let quantity = leg
            .lifecycle
            .quantity
            .unwrap_or_else(|| self.lots.lot_size(&leg.symbol));

        let pnl = self
            .charges
            .outcome(PnlConvention::Directional(leg.side), entry, price, quantity);
        leg.lifecycle.close(
            &leg.id,
            status,
            Exit {
                price,
                pnl,
                reason,
            },
            now,
        )?;
        leg.push_note(
            NoteKind::Exit,
            format!(
                "{} leg {} at ₹{}: gross ₹{}, charges ₹{}, net ₹{}",
                leg.side, status, price, pnl.gross_pnl, pnl.charges.total, pnl.net_pnl
            ),
            now,
        );
        debug!(leg_id = %leg.id, %status, %price, net_pnl = %pnl.net_pnl, "Leg closed");
        Ok(())
    }

    /// Cancel every non-terminal leg of a strategy.
    ///
    /// Active legs are closed at their cached price; if any active leg has
    /// no price the strategy is left untouched.
    pub async fn cancel_strategy(
        &self,
        strategy_id: &str,
        prices: &PriceSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Strategy> {
        let mut strategy = self
            .strategies
            .find_strategy(strategy_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(strategy_id.to_string()))?;

        if strategy.status == StrategyStatus::Completed {
            return Err(EngineError::InvalidTransition {
                record_id: strategy.id.clone(),
                from: strategy.status.to_string(),
                to: SuggestionStatus::Cancelled.to_string(),
            });
        }
        for leg in strategy
            .legs
            .iter()
            .filter(|l| l.status() == SuggestionStatus::Active)
        {
            prices.require(&leg.instrument_key)?;
        }

        for leg in strategy.legs.iter_mut() {
            match leg.status() {
                SuggestionStatus::Suggested => {
                    leg.lifecycle.retire_unentered(
                        &leg.id,
                        SuggestionStatus::Cancelled,
                        "cancelled before entry",
                        now,
                    )?;
                    leg.push_note(NoteKind::Cancellation, "Cancelled before entry", now);
                }
                SuggestionStatus::Active => {
                    let price = prices.require(&leg.instrument_key)?;
                    let reason = format!("cancelled at ₹{}", price);
                    self.close_leg(leg, SuggestionStatus::Cancelled, price, reason, now)?;
                }
                _ => {}
            }
        }

        self.persist(&mut strategy, now).await?;
        info!(strategy_id = %strategy.id, net_pnl = %strategy.total_net_pnl, "Strategy cancelled");
        Ok(strategy)
    }

    /// Close-out sweep: strategies with no leg entered expire.
    ///
    /// Swept strategy ids are listed in `strategies_touched`.
    pub async fn sweep_unentered(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::new(PROCESSOR);
        let open = match self.strategies.find_open_strategies().await {
            Ok(open) => open,
            Err(e) => {
                report.fail(PROCESSOR, e);
                return report;
            }
        };

        for mut strategy in open
            .into_iter()
            .filter(|s| s.status == StrategyStatus::Suggested)
        {
            report.examined += 1;
            match self.expire_all(&mut strategy, now).await {
                Ok(expired) => {
                    for _ in 0..expired {
                        report.record_exit(SuggestionStatus::Expired);
                    }
                    report.strategies_touched.push(strategy.id.clone());
                }
                Err(e) => {
                    if report.fail(&strategy.id, e) {
                        break;
                    }
                }
            }
        }
        report
    }

    async fn expire_all(&self, strategy: &mut Strategy, now: DateTime<Utc>) -> Result<usize> {
        let mut expired = 0;
        for leg in pending_legs(strategy) {
            leg.lifecycle.retire_unentered(
                &leg.id,
                SuggestionStatus::Expired,
                "not entered by market close",
                now,
            )?;
            leg.push_note(NoteKind::Expiry, "Expired by close-out sweep", now);
            expired += 1;
        }
        self.persist(strategy, now).await?;
        Ok(expired)
    }

    async fn persist(&self, strategy: &mut Strategy, now: DateTime<Utc>) -> Result<()> {
        strategy.rollup(now);
        self.strategies.save_strategy(strategy).await?;
        self.sync_parent(strategy, now).await
    }

    /// Mirror strategy progress onto the parent suggestion
    async fn sync_parent(&self, strategy: &Strategy, now: DateTime<Utc>) -> Result<()> {
        let Some(mut parent) = self
            .suggestions
            .find_by_id(&strategy.parent_suggestion_id)
            .await?
        else {
            warn!(
                strategy_id = %strategy.id,
                parent_id = %strategy.parent_suggestion_id,
                "Parent suggestion not found"
            );
            return Ok(());
        };
        if parent.status().is_terminal() {
            return Ok(());
        }

        let mut notes = Vec::new();

        if parent.status() == SuggestionStatus::Suggested {
            if let Some(activated_at) = strategy.activated_at {
                let entry = net_premium(
                    strategy
                        .legs
                        .iter()
                        .filter_map(|l| Some((l.side, l.lifecycle.entry_price?))),
                );
                let quantity = strategy
                    .legs
                    .iter()
                    .find_map(|l| l.lifecycle.quantity)
                    .unwrap_or_else(|| self.lots.lot_size(&parent.instrument.symbol));
                parent
                    .lifecycle
                    .activate(&parent.id, entry, quantity, activated_at)?;
                notes.push((
                    NoteKind::Activation,
                    format!("Strategy {} active at net premium ₹{}", strategy.id, entry),
                ));
            }
        }

        if strategy.status == StrategyStatus::Completed {
            let status = parent_status(strategy);
            let closed_at = strategy.completed_at.unwrap_or(now);
            if parent.status() == SuggestionStatus::Active {
                let exit_price = net_premium(
                    strategy
                        .legs
                        .iter()
                        .filter_map(|l| Some((l.side, l.lifecycle.exit_price?))),
                );
                let pnl = strategy_outcome(strategy);
                parent.lifecycle.close(
                    &parent.id,
                    status,
                    Exit {
                        price: exit_price,
                        pnl,
                        reason: format!("strategy {} completed ({})", strategy.id, status),
                    },
                    closed_at,
                )?;
                notes.push((
                    NoteKind::Exit,
                    format!(
                        "Strategy {} completed ({}): gross ₹{}, charges ₹{}, net ₹{}",
                        strategy.id,
                        status,
                        strategy.total_gross_pnl,
                        strategy.total_charges.total,
                        strategy.total_net_pnl
                    ),
                ));
            } else {
                let status = match status {
                    SuggestionStatus::Cancelled => SuggestionStatus::Cancelled,
                    _ => SuggestionStatus::Expired,
                };
                parent.lifecycle.retire_unentered(
                    &parent.id,
                    status,
                    format!("strategy {} {} before entry", strategy.id, status),
                    closed_at,
                )?;
                notes.push((
                    NoteKind::Expiry,
                    format!("Strategy {} {} before entry", strategy.id, status),
                ));
            }
        }

        if notes.is_empty() {
            return Ok(());
        }
        self.suggestions.save(&parent).await?;
        for (kind, message) in notes {
            self.suggestions
                .append_note(&parent.id, &message, kind, now)
                .await?;
        }
        debug!(suggestion_id = %parent.id, status = %parent.status(), "Parent suggestion synced");
        Ok(())
    }
}

fn pending_legs(strategy: &mut Strategy) -> impl Iterator<Item = &mut Leg> {
    strategy
        .legs
        .iter_mut()
        .filter(|l| l.status() == SuggestionStatus::Suggested)
}

/// Signed net premium: BUY legs pay (+), SELL legs collect (-)
fn net_premium(legs: impl Iterator<Item = (Side, Decimal)>) -> Decimal {
    legs.map(|(side, price)| side.sign() * price).sum()
}

/// Terminal status for the parent of a completed strategy
fn parent_status(strategy: &Strategy) -> SuggestionStatus {
    if let Some(resolution) = strategy.resolution {
        return resolution;
    }
    if strategy
        .legs
        .iter()
        .all(|l| l.status() == SuggestionStatus::Expired)
    {
        SuggestionStatus::Expired
    } else if strategy.has_leg_in(SuggestionStatus::Cancelled) {
        SuggestionStatus::Cancelled
    } else {
        SuggestionStatus::ActiveExpired
    }
}

/// Aggregate P&L of a strategy, as carried by its parent suggestion
fn strategy_outcome(strategy: &Strategy) -> PnlOutcome {
    let invested: Decimal = strategy
        .legs
        .iter()
        .filter_map(|l| Some(l.lifecycle.entry_price? * Decimal::from(l.lifecycle.quantity?)))
        .sum();
    let raw_pnl: Decimal = strategy
        .legs
        .iter()
        .filter_map(|l| l.lifecycle.pnl.map(|p| p.raw_pnl))
        .sum();
    let pnl_percent = if invested.is_zero() {
        Decimal::ZERO
    } else {
        money(strategy.total_net_pnl / invested * dec!(100))
    };

    PnlOutcome {
        raw_pnl,
        gross_pnl: strategy.total_gross_pnl,
        charges: strategy.total_charges,
        net_pnl: strategy.total_net_pnl,
        pnl_percent,
    }
}
