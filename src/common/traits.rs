//! Trait definitions for the engine's external collaborators

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

use super::errors::Result;
use super::types::{NoteKind, Strategy, Suggestion, SuggestionStatus};

/// Persistent suggestion records
///
/// Implementations must make `save` atomic per record, and updates to
/// different records must not block each other.
#[async_trait]
pub trait SuggestionStore: Send + Sync {
    /// All suggestions currently in `status`
    async fn find_by_status(&self, status: SuggestionStatus) -> Result<Vec<Suggestion>>;

    /// Look up a single suggestion
    async fn find_by_id(&self, id: &str) -> Result<Option<Suggestion>>;

    /// Persist every field of the record except its audit notes.
    ///
    /// Notes are append-only and only change through [`append_note`](Self::append_note).
    async fn save(&self, suggestion: &Suggestion) -> Result<()>;

    /// Append an audit note stamped `at`; allowed in every state, terminal included
    async fn append_note(
        &self,
        id: &str,
        message: &str,
        kind: NoteKind,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Persistent strategy records. Legs are stored inside their strategy.
#[async_trait]
pub trait StrategyStore: Send + Sync {
    async fn find_strategy(&self, id: &str) -> Result<Option<Strategy>>;

    /// Strategies that are not completed yet
    async fn find_open_strategies(&self) -> Result<Vec<Strategy>>;

    /// Persist the strategy together with all of its legs
    async fn save_strategy(&self, strategy: &Strategy) -> Result<()>;
}

/// Batch last-traded-price lookup
///
/// The returned map may be partial: a missing key means the price is
/// unknown, never zero.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn batch_last_price(&self, instrument_keys: &[String]) -> Result<HashMap<String, Decimal>>;
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Trading-hours policy
pub trait MarketCalendar: Send + Sync {
    /// Whether `now` falls inside the trading window of a trading day
    fn is_market_open(&self, now: DateTime<Utc>) -> bool;

    /// Market-local calendar date of `now`
    fn trading_day(&self, now: DateTime<Utc>) -> NaiveDate;

    /// Whether the once-daily close-out may run at `now`
    fn is_end_of_day_due(&self, now: DateTime<Utc>) -> bool;
}
