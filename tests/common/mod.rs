//! Common test utilities and fixtures
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Asia::Kolkata;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};

use trade_lifecycle::common::traits::Clock;
use trade_lifecycle::{
    AppConfig, InMemoryStore, InstrumentDescriptor, Lifecycle, MarketHours, RiskTier, Scheduler,
    Sentiment, StaticPriceProvider, Suggestion, TradePlan,
};

/// Instant from an IST wall-clock time
pub fn ist(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Kolkata
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .expect("valid IST time")
        .with_timezone(&Utc)
}

/// Wednesday 2026-10-14, 11:00 IST: market open
pub fn market_open() -> DateTime<Utc> {
    ist(2026, 10, 14, 11, 0)
}

/// Saturday 2026-10-17, 11:00 IST
pub fn weekend() -> DateTime<Utc> {
    ist(2026, 10, 17, 11, 0)
}

/// Manually driven clock
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Single-leg NIFTY option idea
pub fn single_leg(id: &str, key: &str, entry: &str, target: &str, stop: &str) -> Suggestion {
    Suggestion {
        id: id.to_string(),
        strategy_id: None,
        title: "NIFTY 24500 CE breakout".to_string(),
        sentiment: Sentiment::Bullish,
        instrument: InstrumentDescriptor {
            symbol: "NIFTY".to_string(),
            strike: "24500 CE".to_string(),
            instrument_key: key.to_string(),
        },
        plan: TradePlan {
            entry: entry.to_string(),
            target: target.to_string(),
            stop_loss: stop.to_string(),
            time_frame: Some("intraday".to_string()),
        },
        confidence: 72,
        risk: RiskTier::Medium,
        direction: None,
        created_at: market_open() - Duration::hours(1),
        valid_until: Some(market_open() + Duration::days(1)),
        lifecycle: Lifecycle::default(),
        strategy_processed: false,
        notes: Vec::new(),
    }
}

/// Multi-leg idea; list fields are comma separated, one value per leg
pub fn multi_leg(
    id: &str,
    title: &str,
    strikes: &str,
    keys: &str,
    entries: &str,
    targets: &str,
    stops: &str,
) -> Suggestion {
    let mut s = single_leg(id, keys, entries, targets, stops);
    s.title = title.to_string();
    s.sentiment = Sentiment::Neutral;
    s.instrument.strike = strikes.to_string();
    s
}

/// Bull call spread: BUY 24500 CE at 120, SELL 24700 CE at 45
pub fn bull_call_spread(id: &str) -> Suggestion {
    multi_leg(
        id,
        "NIFTY bull call spread",
        "BUY 24500 CE, SELL 24700 CE",
        "NSE_FO|1, NSE_FO|2",
        "120, 45",
        "180, 15",
        "90, 70",
    )
}

/// Store, settable prices, clock and scheduler wired together
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub prices: Arc<StaticPriceProvider>,
    pub clock: Arc<FixedClock>,
    pub scheduler: Scheduler,
}

impl Harness {
    pub fn new(records: Vec<Suggestion>) -> Self {
        Self::at(records, market_open())
    }

    pub fn at(records: Vec<Suggestion>, now: DateTime<Utc>) -> Self {
        let cfg = AppConfig::default();
        let store = Arc::new(InMemoryStore::from_suggestions(records));
        let prices = Arc::new(StaticPriceProvider::new());
        let clock = Arc::new(FixedClock::new(now));
        let hours = MarketHours::from_config(&cfg.market).expect("default market hours");
        let scheduler = Scheduler::build(
            &cfg,
            store.clone(),
            store.clone(),
            prices.clone(),
            clock.clone(),
            Arc::new(hours),
        );
        Self {
            store,
            prices,
            clock,
            scheduler,
        }
    }

    pub fn price(&self, key: &str, price: Decimal) {
        self.prices.set_price(key, price);
    }
}
