//! Trading-hours calendar

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use std::collections::BTreeSet;

use crate::common::errors::{EngineError, Result};
use crate::common::traits::MarketCalendar;
use crate::config::types::MarketConfig;

/// Fixed daily trading window on weekdays, in the exchange's timezone.
///
/// The window is `[open, close)`. Listed holidays are closed all day.
#[derive(Debug, Clone)]
pub struct MarketHours {
    tz: Tz,
    open: NaiveTime,
    close: NaiveTime,
    end_of_day: NaiveTime,
    holidays: BTreeSet<NaiveDate>,
}

impl MarketHours {
    pub fn new(tz: Tz, open: NaiveTime, close: NaiveTime, end_of_day: NaiveTime) -> Result<Self> {
        if open >= close {
            return Err(EngineError::Configuration(format!(
                "market open {} must be before close {}",
                open, close
            )));
        }
        Ok(Self {
            tz,
            open,
            close,
            end_of_day,
            holidays: BTreeSet::new(),
        })
    }

    pub fn from_config(cfg: &MarketConfig) -> Result<Self> {
        let tz: Tz = cfg
            .timezone
            .parse()
            .map_err(|e| EngineError::Configuration(format!("Invalid timezone {}: {}", cfg.timezone, e)))?;
        let hours = Self::new(
            tz,
            parse_time("market.open", &cfg.open)?,
            parse_time("market.close", &cfg.close)?,
            parse_time("market.end_of_day", &cfg.end_of_day)?,
        )?;
        Ok(hours.with_holidays(cfg.holidays.iter().copied()))
    }

    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(holidays);
        self
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Weekday that is not a listed holiday
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }
}

impl MarketCalendar for MarketHours {
    fn is_market_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.tz);
        let time = local.time();
        self.is_trading_day(local.date_naive()) && time >= self.open && time < self.close
    }

    fn trading_day(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    fn is_end_of_day_due(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.tz);
        self.is_trading_day(local.date_naive()) && local.time() >= self.end_of_day
    }
}

fn parse_time(field: &str, raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S"))
        .map_err(|e| EngineError::Configuration(format!("{} {:?}: {}", field, raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ist() -> MarketHours {
        MarketHours::from_config(&MarketConfig::default()).unwrap()
    }

    #[test]
    fn test_open_window_in_ist() {
        let hours = ist();
        // Wednesday 2026-10-14; 09:15 IST is 03:45 UTC
        assert!(!hours.is_market_open(Utc.with_ymd_and_hms(2026, 10, 14, 3, 44, 59).unwrap()));
        assert!(hours.is_market_open(Utc.with_ymd_and_hms(2026, 10, 14, 3, 45, 0).unwrap()));
        assert!(hours.is_market_open(Utc.with_ymd_and_hms(2026, 10, 14, 9, 59, 59).unwrap()));
        assert!(!hours.is_market_open(Utc.with_ymd_and_hms(2026, 10, 14, 10, 0, 0).unwrap()));
    }

    #[test]
    fn test_weekend_and_holiday_closed() {
        let hours = ist().with_holidays([NaiveDate::from_ymd_opt(2026, 10, 12).unwrap()]);
        // Saturday
        assert!(!hours.is_market_open(Utc.with_ymd_and_hms(2026, 10, 17, 6, 0, 0).unwrap()));
        // Monday holiday
        assert!(!hours.is_market_open(Utc.with_ymd_and_hms(2026, 10, 12, 6, 0, 0).unwrap()));
        assert!(!hours.is_end_of_day_due(Utc.with_ymd_and_hms(2026, 10, 12, 11, 0, 0).unwrap()));
    }

    #[test]
    fn test_end_of_day_due_after_sweep_time() {
        let hours = ist();
        assert!(!hours.is_end_of_day_due(Utc.with_ymd_and_hms(2026, 10, 14, 10, 4, 0).unwrap()));
        assert!(hours.is_end_of_day_due(Utc.with_ymd_and_hms(2026, 10, 14, 10, 5, 0).unwrap()));
    }

    #[test]
    fn test_trading_day_uses_local_date() {
        let hours = ist();
        // 20:00 UTC on the 14th is 01:30 IST on the 15th
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 20, 0, 0).unwrap();
        assert_eq!(hours.trading_day(now), NaiveDate::from_ymd_opt(2026, 10, 15).unwrap());
    }

    #[test]
    fn test_bad_config_rejected() {
        let cfg = MarketConfig {
            timezone: "Mars/Olympus".into(),
            ..MarketConfig::default()
        };
        assert!(matches!(MarketHours::from_config(&cfg), Err(EngineError::Configuration(_))));

        let cfg = MarketConfig {
            open: "16:00".into(),
            ..MarketConfig::default()
        };
        assert!(MarketHours::from_config(&cfg).is_err());
    }
}
