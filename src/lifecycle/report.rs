//! Per-tick and per-day reports

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::common::errors::{log_record_error, EngineError};
use crate::common::types::{Suggestion, SuggestionStatus};

/// One record that could not be processed this tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub record_id: String,
    pub kind: &'static str,
    pub message: String,
}

/// Outcome of one processor pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub processor: &'static str,
    pub examined: usize,
    /// Ids of records or legs activated in this pass
    pub activated: Vec<String>,
    /// Strategies that had a leg activated in this pass
    pub strategies_touched: Vec<String>,
    pub exits: BTreeMap<SuggestionStatus, usize>,
    pub created: usize,
    pub skipped_missing_price: usize,
    pub failures: Vec<RecordFailure>,
    /// Set when a store failure ended the pass early
    pub aborted: Option<String>,
}

impl TickReport {
    pub fn new(processor: &'static str) -> Self {
        Self {
            processor,
            ..Self::default()
        }
    }

    pub fn record_exit(&mut self, status: SuggestionStatus) {
        *self.exits.entry(status).or_default() += 1;
    }

    pub fn exits_of(&self, status: SuggestionStatus) -> usize {
        self.exits.get(&status).copied().unwrap_or(0)
    }

    /// Record a per-record failure; returns true when the pass must stop
    pub fn fail(&mut self, record_id: &str, err: EngineError) -> bool {
        log_record_error(record_id, &err);
        if matches!(err, EngineError::MissingPriceData { .. }) {
            self.skipped_missing_price += 1;
        }
        let aborts = err.aborts_tick();
        if aborts {
            self.aborted = Some(err.to_string());
        }
        self.failures.push(RecordFailure {
            record_id: record_id.to_string(),
            kind: err.kind(),
            message: err.to_string(),
        });
        aborts
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// End-of-day roll-up
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub counts_by_status: BTreeMap<SuggestionStatus, usize>,
    pub average_confidence: Option<Decimal>,
    pub aggregate_net_pnl: Decimal,
    /// Suggestions force-expired by the close-out sweep
    pub expired_by_sweep: usize,
}

impl DailySummary {
    /// Summarise the suggestions that reached a terminal state on `date`
    pub fn build<'a, I, F>(date: NaiveDate, records: I, day_of: F, expired_by_sweep: usize) -> Self
    where
        I: IntoIterator<Item = &'a Suggestion>,
        F: Fn(&Suggestion) -> Option<NaiveDate>,
    {
        let mut counts_by_status = BTreeMap::new();
        let mut confidence_sum = Decimal::ZERO;
        let mut count = 0u32;
        let mut aggregate_net_pnl = Decimal::ZERO;

        for record in records {
            if !record.status().is_terminal() || day_of(record) != Some(date) {
                continue;
            }
            *counts_by_status.entry(record.status()).or_default() += 1;
            confidence_sum += Decimal::from(record.confidence);
            count += 1;
            aggregate_net_pnl += record.lifecycle.net_pnl();
        }

        let average_confidence = (count > 0)
            .then(|| (confidence_sum / Decimal::from(count)).round_dp(2));

        Self {
            date,
            counts_by_status,
            average_confidence,
            aggregate_net_pnl,
            expired_by_sweep,
        }
    }

    pub fn total(&self) -> usize {
        self.counts_by_status.values().sum()
    }
}
