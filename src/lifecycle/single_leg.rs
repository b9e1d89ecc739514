//! Lifecycle processing for one-instrument suggestions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::charges::{ChargeCalculator, PnlConvention};
use super::plan::{parse_levels, DirectionRules};
use super::price_cache::PriceSnapshot;
use super::report::TickReport;
use super::sizing::LotSizePolicy;
use super::state::{evaluate_entry, resolve_active, EntryTolerance, Exit};
use crate::common::errors::{EngineError, Result};
use crate::common::traits::SuggestionStore;
use crate::common::types::{NoteKind, Suggestion, SuggestionStatus};

const PROCESSOR: &str = "single_leg";

/// Drives single-leg suggestions from `suggested` through `active` to a
/// terminal state.
///
/// Multi-leg suggestions are left to the strategy decomposer and the
/// multi-leg processor.
pub struct SingleLegProcessor {
    store: Arc<dyn SuggestionStore>,
    tolerance: EntryTolerance,
    lots: LotSizePolicy,
    charges: ChargeCalculator,
    directions: DirectionRules,
}

impl SingleLegProcessor {
    pub fn new(
        store: Arc<dyn SuggestionStore>,
        tolerance: EntryTolerance,
        lots: LotSizePolicy,
        charges: ChargeCalculator,
        directions: DirectionRules,
    ) -> Self {
        Self {
            store,
            tolerance,
            lots,
            charges,
            directions,
        }
    }

    async fn load(&self, status: SuggestionStatus) -> Result<Vec<Suggestion>> {
        let records = self.store.find_by_status(status).await?;
        Ok(records.into_iter().filter(|s| !s.is_multi_leg()).collect())
    }

    /// Instrument keys of every suggested and active single-leg record
    pub async fn watched_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for status in [SuggestionStatus::Suggested, SuggestionStatus::Active] {
            keys.extend(
                self.load(status)
                    .await?
                    .into_iter()
                    .map(|s| s.instrument.instrument_key),
            );
        }
        Ok(keys)
    }

    /// Evaluate every `suggested` record for expiry and entry
    #[instrument(skip(self, prices))]
    pub async fn scan_suggested(&self, prices: &PriceSnapshot, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::new(PROCESSOR);
        let records = match self.load(SuggestionStatus::Suggested).await {
            Ok(records) => records,
            Err(e) => {
                report.fail(PROCESSOR, e);
                return report;
            }
        };

        for mut record in records {
            report.examined += 1;
            if let Err(e) = self.evaluate_suggested(&mut record, prices, now, &mut report).await {
                if report.fail(&record.id, e) {
                    break;
                }
            }
        }

        debug!(
            examined = report.examined,
            activated = report.activated.len(),
            "Suggested scan complete"
        );
        report
    }

    async fn evaluate_suggested(
        &self,
        record: &mut Suggestion,
        prices: &PriceSnapshot,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<()> {
        if record.is_expired_at(now) {
            self.expire(record, now).await?;
            report.record_exit(SuggestionStatus::Expired);
            return Ok(());
        }

        let levels = parse_levels(&record.plan)?;
        let price = prices.require(&record.instrument.instrument_key)?;
        let side = self.directions.side_of(record);

        if let Some(signal) = evaluate_entry(side, &levels, price, &self.tolerance) {
            debug!(suggestion_id = %record.id, %price, %signal, "Entry condition met");
            self.activate(record, prices, now).await?;
            report.activated.push(record.id.clone());
        }
        Ok(())
    }

    /// `suggested -> active` at the cached price.
    ///
    /// Without a cached price the record is left untouched and
    /// `MissingPriceData` is returned; it is never activated at a guess.
    pub async fn activate(
        &self,
        record: &mut Suggestion,
        prices: &PriceSnapshot,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let price = prices.require(&record.instrument.instrument_key)?;
        let quantity = self.lots.lot_size(&record.instrument.symbol);

        record.lifecycle.activate(&record.id, price, quantity, now)?;
        self.store.save(record).await?;
        self.store
            .append_note(
                &record.id,
                &format!("Activated at ₹{} for {} units", price, quantity),
                NoteKind::Activation,
                now,
            )
            .await?;

        info!(suggestion_id = %record.id, %price, quantity, "Suggestion activated");
        Ok(())
    }

    /// Evaluate every `active` record for target, stop-loss and expiry.
    ///
    /// Records in `skip` (activated earlier in the same tick) are left for the
    /// next tick.
    #[instrument(skip(self, prices, skip))]
    pub async fn scan_active(
        &self,
        prices: &PriceSnapshot,
        now: DateTime<Utc>,
        skip: &HashSet<String>,
    ) -> TickReport {
        let mut report = TickReport::new(PROCESSOR);
        let records = match self.load(SuggestionStatus::Active).await {
            Ok(records) => records,
            Err(e) => {
                report.fail(PROCESSOR, e);
                return report;
            }
        };

        for mut record in records {
            if skip.contains(&record.id) {
                continue;
            }
            report.examined += 1;
            match self.evaluate_active(&mut record, prices, now).await {
                Ok(Some(status)) => report.record_exit(status),
                Ok(None) => {}
                Err(e) => {
                    if report.fail(&record.id, e) {
                        break;
                    }
                }
            }
        }

        debug!(examined = report.examined, exits = ?report.exits, "Active scan complete");
        report
    }

    async fn evaluate_active(
        &self,
        record: &mut Suggestion,
        prices: &PriceSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Option<SuggestionStatus>> {
        let levels = parse_levels(&record.plan)?;
        let price = prices.require(&record.instrument.instrument_key)?;
        let side = self.directions.side_of(record);

        match resolve_active(side, &levels, price, record.is_expired_at(now)) {
            Some(status) => {
                self.settle(record, status, price, now).await?;
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }

    /// `active -> terminal` with P&L computed at `exit_price`
    pub async fn settle(
        &self,
        record: &mut Suggestion,
        terminal: SuggestionStatus,
        exit_price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let entry = record.lifecycle.entry_price.ok_or_else(|| {
            EngineError::Internal(format!("active suggestion {} has no entry price", record.id))
        })?;
        let quantity = record
            .lifecycle
            .quantity
            .unwrap_or_else(|| self.lots.lot_size(&record.instrument.symbol));

        let pnl = self
            .charges
            .outcome(PnlConvention::LongPremium, entry, exit_price, quantity);
        let reason = format!("{} at ₹{}", terminal, exit_price);
        record.lifecycle.close(
            &record.id,
            terminal,
            Exit {
                price: exit_price,
                pnl,
                reason,
            },
            now,
        )?;
        self.store.save(record).await?;
        self.store
            .append_note(
                &record.id,
                &format!(
                    "Exited ({}) at ₹{}: gross ₹{}, charges ₹{}, net ₹{}",
                    terminal, exit_price, pnl.gross_pnl, pnl.charges.total, pnl.net_pnl
                ),
                NoteKind::Exit,
                now,
            )
            .await?;

        info!(
            suggestion_id = %record.id,
            status = %terminal,
            %exit_price,
            net_pnl = %pnl.net_pnl,
            "Suggestion settled"
        );
        Ok(())
    }

    async fn expire(&self, record: &mut Suggestion, now: DateTime<Utc>) -> Result<()> {
        record.lifecycle.retire_unentered(
            &record.id,
            SuggestionStatus::Expired,
            "validity lapsed before entry",
            now,
        )?;
        self.store.save(record).await?;
        self.store
            .append_note(&record.id, "Expired before entry", NoteKind::Expiry, now)
            .await?;
        info!(suggestion_id = %record.id, "Suggestion expired before entry");
        Ok(())
    }

    /// Cancel a non-terminal record.
    ///
    /// An active record is closed at its cached price so P&L is attached.
    pub async fn cancel(&self, id: &str, prices: &PriceSnapshot, now: DateTime<Utc>) -> Result<()> {
        let mut record = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        match record.status() {
            SuggestionStatus::Suggested => {
                record.lifecycle.retire_unentered(
                    &record.id,
                    SuggestionStatus::Cancelled,
                    "cancelled before entry",
                    now,
                )?;
                self.store.save(&record).await?;
                self.store
                    .append_note(&record.id, "Cancelled before entry", NoteKind::Cancellation, now)
                    .await?;
            }
            SuggestionStatus::Active => {
                let price = prices.require(&record.instrument.instrument_key)?;
                self.settle(&mut record, SuggestionStatus::Cancelled, price, now)
                    .await?;
            }
            status => {
                return Err(EngineError::InvalidTransition {
                    record_id: record.id.clone(),
                    from: status.to_string(),
                    to: SuggestionStatus::Cancelled.to_string(),
                })
            }
        }
        info!(suggestion_id = %id, "Suggestion cancelled");
        Ok(())
    }

    /// Close-out sweep: every single-leg record still `suggested` expires.
    ///
    /// Raw multi-leg suggestions that were never decomposed are swept too.
    pub async fn sweep_unentered(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::new(PROCESSOR);
        let records = match self.store.find_by_status(SuggestionStatus::Suggested).await {
            Ok(records) => records,
            Err(e) => {
                report.fail(PROCESSOR, e);
                return report;
            }
        };

        for mut record in records {
            if record.is_multi_leg() && record.strategy_processed {
                continue;
            }
            report.examined += 1;
            match self.expire(&mut record, now).await {
                Ok(()) => report.record_exit(SuggestionStatus::Expired),
                Err(e) => {
                    if report.fail(&record.id, e) {
                        break;
                    }
                }
            }
        }
        report
    }
}
