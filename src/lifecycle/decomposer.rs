//! Expansion of multi-leg suggestions into strategies

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::plan::{plan_legs, DirectionRules};
use super::report::TickReport;
use crate::common::errors::Result;
use crate::common::traits::{StrategyStore, SuggestionStore};
use crate::common::types::{
    ChargeBreakdown, Leg, Lifecycle, NoteKind, Strategy, StrategyStatus, Suggestion,
    SuggestionStatus,
};

const PROCESSOR: &str = "decomposer";

/// Result of one decomposition request
#[derive(Debug, Clone, PartialEq)]
pub enum DecomposeOutcome {
    Created(Strategy),
    /// The suggestion was already decomposed; nothing was written
    AlreadyProcessed { strategy_id: String },
}

pub struct StrategyDecomposer {
    suggestions: Arc<dyn SuggestionStore>,
    strategies: Arc<dyn StrategyStore>,
    directions: DirectionRules,
}

impl StrategyDecomposer {
    pub fn new(
        suggestions: Arc<dyn SuggestionStore>,
        strategies: Arc<dyn StrategyStore>,
        directions: DirectionRules,
    ) -> Self {
        Self {
            suggestions,
            strategies,
            directions,
        }
    }

    /// Strategy id shared by the parent suggestion and its legs
    pub fn strategy_id_of(raw: &Suggestion) -> String {
        raw.strategy_id.clone().unwrap_or_else(|| raw.id.clone())
    }

    /// Split `raw` into an ordered set of legs under one strategy.
    ///
    /// Idempotent: a suggestion already flagged as processed, or whose
    /// strategy id already exists in the store, produces no new strategy.
    #[instrument(skip(self, raw), fields(suggestion_id = %raw.id))]
    pub async fn decompose(&self, raw: &Suggestion, now: DateTime<Utc>) -> Result<DecomposeOutcome> {
        let strategy_id = Self::strategy_id_of(raw);

        if raw.strategy_processed {
            debug!(%strategy_id, "Suggestion already decomposed");
            return Ok(DecomposeOutcome::AlreadyProcessed { strategy_id });
        }

        if self.strategies.find_strategy(&strategy_id).await?.is_some() {
            // Strategy was written but the parent flag was not; repair the flag
            warn!(%strategy_id, "Strategy exists for unflagged suggestion, marking processed");
            self.mark_processed(raw, &strategy_id, now).await?;
            return Ok(DecomposeOutcome::AlreadyProcessed { strategy_id });
        }

        let plan = plan_legs(raw, &self.directions)?;
        for warning in &plan.warnings {
            warn!(%strategy_id, %warning, "Leg list length mismatch, using first value");
            self.suggestions
                .append_note(&raw.id, &warning.to_string(), NoteKind::Warning, now)
                .await?;
        }

        let legs: Vec<Leg> = plan
            .legs
            .into_iter()
            .map(|leg| Leg {
                id: format!("{}-L{}", strategy_id, leg.index + 1),
                index: leg.index,
                symbol: raw.instrument.symbol.clone(),
                descriptor: leg.descriptor,
                instrument_key: leg.instrument_key,
                side: leg.side,
                levels: leg.levels,
                lifecycle: Lifecycle::default(),
                notes: Vec::new(),
            })
            .collect();

        let mut strategy = Strategy {
            id: strategy_id.clone(),
            parent_suggestion_id: raw.id.clone(),
            title: raw.title.clone(),
            sentiment: raw.sentiment,
            confidence: raw.confidence,
            risk: raw.risk,
            valid_until: raw.valid_until,
            legs,
            status: StrategyStatus::Suggested,
            created_at: now,
            activated_at: None,
            completed_at: None,
            resolution: None,
            total_gross_pnl: Decimal::ZERO,
            total_charges: ChargeBreakdown::default(),
            total_net_pnl: Decimal::ZERO,
        };
        strategy.rollup(now);

        // Strategy first: a crash before the flag is set is repaired above
        self.strategies.save_strategy(&strategy).await?;
        self.mark_processed(raw, &strategy_id, now).await?;

        let sides: Vec<String> = strategy
            .legs
            .iter()
            .map(|l| format!("{} {}", l.side, l.descriptor))
            .collect();
        info!(
            %strategy_id,
            legs = strategy.legs.len(),
            sides = ?sides,
            "Strategy created"
        );
        Ok(DecomposeOutcome::Created(strategy))
    }

    /// Flag the parent as decomposed.
    ///
    /// The parent is re-read so a concurrent monitor tick that already
    /// activated it through its strategy is not rolled back.
    async fn mark_processed(
        &self,
        raw: &Suggestion,
        strategy_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut parent = self
            .suggestions
            .find_by_id(&raw.id)
            .await?
            .unwrap_or_else(|| raw.clone());
        parent.strategy_processed = true;
        parent.strategy_id = Some(strategy_id.to_string());
        self.suggestions.save(&parent).await?;
        self.suggestions
            .append_note(
                &raw.id,
                &format!("Decomposed into strategy {}", strategy_id),
                NoteKind::Info,
                now,
            )
            .await
    }

    /// Decompose every pending multi-leg suggestion
    #[instrument(skip(self))]
    pub async fn run(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::new(PROCESSOR);
        let pending = match self.suggestions.find_by_status(SuggestionStatus::Suggested).await {
            Ok(records) => records,
            Err(e) => {
                report.fail(PROCESSOR, e);
                return report;
            }
        };

        for raw in pending
            .into_iter()
            .filter(|s| s.is_multi_leg() && !s.strategy_processed)
        {
            report.examined += 1;
            match self.decompose(&raw, now).await {
                Ok(DecomposeOutcome::Created(_)) => report.created += 1,
                Ok(DecomposeOutcome::AlreadyProcessed { .. }) => {}
                Err(e) => {
                    if report.fail(&raw.id, e) {
                        break;
                    }
                }
            }
        }

        debug!(examined = report.examined, created = report.created, "Decomposition pass complete");
        report
    }
}
