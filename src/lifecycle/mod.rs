//! Suggestion and strategy lifecycle engine
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PER TICK (scheduler)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  StrategyDecomposer                                         │
//! │    - Splits new multi-leg suggestions into legs             │
//! │                                                             │
//! │  PriceCache.refresh(watched keys) → PriceSnapshot           │
//! │       │                                                     │
//! │       ▼                                                     │
//! │  scan_suggested (single + multi)  → activations             │
//! │       │                                                     │
//! │       ▼                                                     │
//! │  scan_active (single + multi)     → exits, P&L, rollups     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`SingleLegProcessor`]: one-instrument suggestions
//! - [`StrategyDecomposer`]: multi-leg suggestion → [`Strategy`](crate::common::types::Strategy)
//! - [`MultiLegProcessor`]: joint activation and exit of strategy legs
//! - [`PriceCache`]: per-tick last-traded-price snapshot
//! - [`ChargeCalculator`]: charges and realized P&L
//! - [`TickReport`]: per-pass outcome surfaced to the scheduler

pub mod charges;
pub mod decomposer;
pub mod multi_leg;
pub mod plan;
pub mod price_cache;
pub mod report;
pub mod single_leg;
pub mod sizing;
pub mod state;

pub use charges::{ChargeCalculator, PnlConvention};
pub use decomposer::{DecomposeOutcome, StrategyDecomposer};
pub use multi_leg::MultiLegProcessor;
pub use plan::{parse_levels, parse_price, plan_legs, DirectionRules, LegPlan, LegPlanSet, ParseWarning};
pub use price_cache::{PriceCache, PriceSnapshot};
pub use report::{DailySummary, RecordFailure, TickReport};
pub use single_leg::SingleLegProcessor;
pub use sizing::LotSizePolicy;
pub use state::{
    can_transition, evaluate_entry, evaluate_exit, resolve_active, EntrySignal, EntryTolerance,
};
