//! Recurring, market-hours-aware job runner
//!
//! Three jobs share one set of processors and one price cache:
//! - `decompose`: expand new multi-leg suggestions into strategies
//! - `monitor`: refresh prices, then suggested-scan and active-scan for
//!   single- and multi-leg records
//! - `end_of_day`: once per trading day, expire what never entered and log
//!   a [`DailySummary`]
//!
//! Every job is gated by the [`MarketCalendar`] and by a [`JobGuard`], so an
//! overlapping tick is skipped rather than queued. [`Scheduler::run_job`]
//! fires one tick directly, which is how tests drive it.

pub mod guard;
pub mod market_hours;

pub use guard::{JobGuard, JobToken};
pub use market_hours::MarketHours;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::common::errors::{EngineError, Result};
use crate::common::traits::{Clock, MarketCalendar, PriceProvider, StrategyStore, SuggestionStore};
use crate::common::types::{Suggestion, SuggestionStatus};
use crate::config::types::{AppConfig, ScheduleConfig};
use crate::lifecycle::{
    ChargeCalculator, DailySummary, DirectionRules, EntryTolerance, LotSizePolicy, MultiLegProcessor,
    PriceCache, SingleLegProcessor, StrategyDecomposer, TickReport,
};

/// Scheduled job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Decompose,
    Monitor,
    EndOfDay,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Decompose, JobKind::Monitor, JobKind::EndOfDay];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Decompose => "decompose",
            JobKind::Monitor => "monitor",
            JobKind::EndOfDay => "end_of_day",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "decompose" => Ok(JobKind::Decompose),
            "monitor" => Ok(JobKind::Monitor),
            "end_of_day" | "eod" => Ok(JobKind::EndOfDay),
            other => Err(EngineError::Configuration(format!("Unknown job: {}", other))),
        }
    }
}

/// Result of one monitor tick
#[derive(Debug, Clone, Serialize)]
pub struct MonitorReport {
    /// Distinct instrument keys asked of the price provider
    pub requested: usize,
    /// Keys that came back with a usable price
    pub priced: usize,
    pub single_suggested: TickReport,
    pub multi_suggested: TickReport,
    /// `None` when the suggested-scan aborted on a store failure
    pub single_active: Option<TickReport>,
    pub multi_active: Option<TickReport>,
}

impl MonitorReport {
    fn passes(&self) -> impl Iterator<Item = &TickReport> {
        [&self.single_suggested, &self.multi_suggested]
            .into_iter()
            .chain(self.single_active.iter())
            .chain(self.multi_active.iter())
    }

    pub fn activated(&self) -> usize {
        self.passes().map(|r| r.activated.len()).sum()
    }

    pub fn exits(&self) -> usize {
        self.passes().map(|r| r.exits.values().sum::<usize>()).sum()
    }

    pub fn failures(&self) -> usize {
        self.passes().map(|r| r.failures.len()).sum()
    }
}

/// Result of the once-daily close-out
#[derive(Debug, Clone, Serialize)]
pub struct EndOfDayReport {
    pub single: TickReport,
    pub multi: TickReport,
    pub summary: DailySummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum JobReport {
    Decompose(TickReport),
    Monitor(MonitorReport),
    EndOfDay(EndOfDayReport),
}

/// What happened when a job was fired
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed(JobReport),
    SkippedMarketClosed,
    SkippedAlreadyRunning,
    /// End-of-day fired before the close-out time
    SkippedNotDue,
    SkippedAlreadyRanToday,
    Failed(String),
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed(_))
    }

    pub fn report(&self) -> Option<&JobReport> {
        match self {
            JobOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

pub struct Scheduler {
    clock: Arc<dyn Clock>,
    calendar: Arc<dyn MarketCalendar>,
    suggestions: Arc<dyn SuggestionStore>,
    prices: PriceCache,
    single: SingleLegProcessor,
    multi: MultiLegProcessor,
    decomposer: StrategyDecomposer,
    schedule: ScheduleConfig,
    decompose_guard: JobGuard,
    monitor_guard: JobGuard,
    end_of_day_guard: JobGuard,
    last_end_of_day: Mutex<Option<NaiveDate>>,
}

impl Scheduler {
    /// Wire processors and the price cache from configuration
    pub fn build(
        cfg: &AppConfig,
        suggestions: Arc<dyn SuggestionStore>,
        strategies: Arc<dyn StrategyStore>,
        provider: Arc<dyn PriceProvider>,
        clock: Arc<dyn Clock>,
        calendar: Arc<dyn MarketCalendar>,
    ) -> Self {
        let tolerance = EntryTolerance::new(
            cfg.engine.buy_entry_tolerance_pct,
            cfg.engine.sell_entry_tolerance_pct,
        );
        let lots = LotSizePolicy::from_config(&cfg.engine);
        let charges = ChargeCalculator::new(cfg.charges.clone());
        let directions = DirectionRules::new(cfg.engine.sell_keywords.iter().cloned());

        Self {
            single: SingleLegProcessor::new(
                Arc::clone(&suggestions),
                tolerance,
                lots.clone(),
                charges.clone(),
                directions.clone(),
            ),
            multi: MultiLegProcessor::new(
                Arc::clone(&suggestions),
                Arc::clone(&strategies),
                tolerance,
                lots,
                charges,
            ),
            decomposer: StrategyDecomposer::new(Arc::clone(&suggestions), strategies, directions),
            prices: PriceCache::new(
                provider,
                cfg.price_feed.batch_size,
                cfg.price_feed.max_in_flight,
            ),
            suggestions,
            clock,
            calendar,
            schedule: cfg.schedule.clone(),
            decompose_guard: JobGuard::new("decompose"),
            monitor_guard: JobGuard::new("monitor"),
            end_of_day_guard: JobGuard::new("end_of_day"),
            last_end_of_day: Mutex::new(None),
        }
    }

    pub fn single_leg(&self) -> &SingleLegProcessor {
        &self.single
    }

    pub fn multi_leg(&self) -> &MultiLegProcessor {
        &self.multi
    }

    pub fn decomposer(&self) -> &StrategyDecomposer {
        &self.decomposer
    }

    pub fn prices(&self) -> &PriceCache {
        &self.prices
    }

    pub fn guard(&self, kind: JobKind) -> &JobGuard {
        match kind {
            JobKind::Decompose => &self.decompose_guard,
            JobKind::Monitor => &self.monitor_guard,
            JobKind::EndOfDay => &self.end_of_day_guard,
        }
    }

    /// Fire one tick of `kind`
    pub async fn run_job(&self, kind: JobKind) -> JobOutcome {
        let Some(_token) = self.guard(kind).try_acquire() else {
            debug!(job = %kind, "Previous tick still running, skipping");
            return JobOutcome::SkippedAlreadyRunning;
        };

        let now = self.clock.now();
        match kind {
            JobKind::Decompose => {
                if !self.calendar.is_market_open(now) {
                    return JobOutcome::SkippedMarketClosed;
                }
                JobOutcome::Completed(JobReport::Decompose(self.decomposer.run(now).await))
            }
            JobKind::Monitor => {
                if !self.calendar.is_market_open(now) {
                    return JobOutcome::SkippedMarketClosed;
                }
                match self.monitor(now).await {
                    Ok(report) => JobOutcome::Completed(JobReport::Monitor(report)),
                    Err(e) => JobOutcome::Failed(e.to_string()),
                }
            }
            JobKind::EndOfDay => self.end_of_day(now).await,
        }
    }

    async fn monitor(&self, now: DateTime<Utc>) -> Result<MonitorReport> {
        let mut keys = self.single.watched_keys().await?;
        keys.extend(self.multi.watched_keys().await?);
        let snapshot = self.prices.refresh(keys, now).await;

        let single_suggested = self.single.scan_suggested(&snapshot, now).await;
        let multi_suggested = self.multi.scan_suggested(&snapshot, now).await;

        // Records activated this tick are first evaluated for exit next tick
        let single_active = if single_suggested.is_aborted() {
            None
        } else {
            let fresh: HashSet<String> = single_suggested.activated.iter().cloned().collect();
            Some(self.single.scan_active(&snapshot, now, &fresh).await)
        };
        let multi_active = if multi_suggested.is_aborted() {
            None
        } else {
            let fresh: HashSet<String> = multi_suggested.activated.iter().cloned().collect();
            Some(self.multi.scan_active(&snapshot, now, &fresh).await)
        };

        Ok(MonitorReport {
            requested: snapshot.requested(),
            priced: snapshot.len(),
            single_suggested,
            multi_suggested,
            single_active,
            multi_active,
        })
    }

    async fn end_of_day(&self, now: DateTime<Utc>) -> JobOutcome {
        if !self.calendar.is_end_of_day_due(now) {
            return JobOutcome::SkippedNotDue;
        }
        let today = self.calendar.trading_day(now);
        let mut last = self.last_end_of_day.lock().await;
        if *last == Some(today) {
            return JobOutcome::SkippedAlreadyRanToday;
        }

        let single = self.single.sweep_unentered(now).await;
        let multi = self.multi.sweep_unentered(now).await;
        if let Some(reason) = single.aborted.as_ref().or(multi.aborted.as_ref()) {
            // Not marked as done; the next poll retries the sweep
            return JobOutcome::Failed(reason.clone());
        }

        let expired_by_sweep =
            single.exits_of(SuggestionStatus::Expired) + multi.strategies_touched.len();
        let summary = match self.daily_summary(today, expired_by_sweep).await {
            Ok(summary) => summary,
            Err(e) => return JobOutcome::Failed(e.to_string()),
        };
        *last = Some(today);

        info!(
            date = %today,
            total = summary.total(),
            aggregate_net_pnl = %summary.aggregate_net_pnl,
            summary = %serde_json::to_string(&summary).unwrap_or_default(),
            "Daily summary"
        );
        JobOutcome::Completed(JobReport::EndOfDay(EndOfDayReport {
            single,
            multi,
            summary,
        }))
    }

    /// Summary of suggestions that reached a terminal state on `date`
    pub async fn daily_summary(&self, date: NaiveDate, expired_by_sweep: usize) -> Result<DailySummary> {
        let mut records: Vec<Suggestion> = Vec::new();
        for status in SuggestionStatus::TERMINAL {
            records.extend(self.suggestions.find_by_status(status).await?);
        }
        let calendar = Arc::clone(&self.calendar);
        Ok(DailySummary::build(
            date,
            &records,
            |s| s.lifecycle.exit_time.map(|t| calendar.trading_day(t)),
            expired_by_sweep,
        ))
    }

    /// Run every job on its interval until `shutdown` flips to true
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let every = |secs: u64| {
            let mut timer = interval(Duration::from_secs(secs.max(1)));
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer
        };
        let mut decompose = every(self.schedule.decompose_interval_seconds);
        let mut monitor = every(self.schedule.monitor_interval_seconds);
        let mut end_of_day = every(self.schedule.end_of_day_poll_seconds);

        info!(
            decompose_secs = self.schedule.decompose_interval_seconds,
            monitor_secs = self.schedule.monitor_interval_seconds,
            end_of_day_poll_secs = self.schedule.end_of_day_poll_seconds,
            "Scheduler started"
        );

        loop {
            let kind = tokio::select! {
                _ = decompose.tick() => JobKind::Decompose,
                _ = monitor.tick() => JobKind::Monitor,
                _ = end_of_day.tick() => JobKind::EndOfDay,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            let scheduler = Arc::clone(&self);
            tokio::spawn(async move {
                let outcome = scheduler.run_job(kind).await;
                log_outcome(kind, &outcome);
            });
        }

        info!("Scheduler stopped");
    }
}

pub fn log_outcome(kind: JobKind, outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Completed(JobReport::Decompose(report)) => {
            if report.created > 0 || !report.is_clean() {
                info!(job = %kind, created = report.created, failures = report.failures.len(), "Job completed");
            }
        }
        JobOutcome::Completed(JobReport::Monitor(report)) => info!(
            job = %kind,
            priced = report.priced,
            requested = report.requested,
            activated = report.activated(),
            exits = report.exits(),
            failures = report.failures(),
            "Job completed"
        ),
        JobOutcome::Completed(JobReport::EndOfDay(report)) => info!(
            job = %kind,
            expired = report.summary.expired_by_sweep,
            "Job completed"
        ),
        JobOutcome::SkippedAlreadyRunning => warn!(job = %kind, "Tick skipped, previous run still in progress"),
        JobOutcome::SkippedMarketClosed
        | JobOutcome::SkippedNotDue
        | JobOutcome::SkippedAlreadyRanToday => debug!(job = %kind, outcome = ?outcome, "Tick skipped"),
        JobOutcome::Failed(reason) => error!(job = %kind, %reason, "Job failed"),
    }
}
