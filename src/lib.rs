//! Trade Lifecycle Library
//!
//! Tracks paper-traded suggestions and multi-leg option strategies from
//! `suggested` through `active` to a terminal state, re-evaluating live
//! prices against entry, target and stop-loss on a market-hours schedule.

pub mod common;
pub mod config;
pub mod feed;
pub mod lifecycle;
pub mod scheduler;
pub mod store;

// Re-export commonly used types
pub use common::errors::{EngineError, Result};
pub use common::traits::{Clock, MarketCalendar, PriceProvider, StrategyStore, SuggestionStore, SystemClock};
pub use common::types::{
    AuditNote, ChargeBreakdown, InstrumentDescriptor, Leg, Lifecycle, NoteKind, PnlOutcome,
    PriceLevels, RiskTier, Sentiment, Side, Strategy, StrategyStatus, Suggestion, SuggestionStatus,
    TradePlan,
};
pub use config::types::AppConfig;
pub use feed::{RestPriceProvider, StaticPriceProvider};
pub use store::InMemoryStore;

// Lifecycle engine
pub use lifecycle::{
    ChargeCalculator, DailySummary, DecomposeOutcome, DirectionRules, EntryTolerance,
    LotSizePolicy, MultiLegProcessor, PnlConvention, PriceCache, PriceSnapshot,
    SingleLegProcessor, StrategyDecomposer, TickReport,
};
pub use scheduler::{JobKind, JobOutcome, JobReport, MarketHours, Scheduler};
