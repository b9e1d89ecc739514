//! Configuration types

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Lifecycle rule parameters
    #[serde(default)]
    pub engine: EngineConfig,
    /// Transaction charge schedule
    #[serde(default)]
    pub charges: ChargeConfig,
    /// Trading window
    #[serde(default)]
    pub market: MarketConfig,
    /// Job intervals
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Last-traded-price feed
    #[serde(default)]
    pub price_feed: PriceFeedConfig,
    /// Suggestion store
    #[serde(default)]
    pub store: StoreConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

/// Entry, sizing and direction rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Entry tolerance for BUY records, percent of the planned entry
    #[serde(default = "default_buy_tolerance")]
    pub buy_entry_tolerance_pct: Decimal,
    /// Entry tolerance for SELL records, percent of the planned entry
    #[serde(default = "default_sell_tolerance")]
    pub sell_entry_tolerance_pct: Decimal,
    /// Lot size per underlying symbol
    #[serde(default = "default_lot_sizes")]
    pub lot_sizes: BTreeMap<String, u32>,
    /// Quantity for symbols without a lot size entry
    #[serde(default = "default_lot")]
    pub default_lot_size: u32,
    /// Title keywords that mark a strategy as premium selling
    #[serde(default = "default_sell_keywords")]
    pub sell_keywords: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buy_entry_tolerance_pct: default_buy_tolerance(),
            sell_entry_tolerance_pct: default_sell_tolerance(),
            lot_sizes: default_lot_sizes(),
            default_lot_size: default_lot(),
            sell_keywords: default_sell_keywords(),
        }
    }
}

fn default_buy_tolerance() -> Decimal {
    dec!(2)
}

fn default_sell_tolerance() -> Decimal {
    dec!(5)
}

fn default_lot_sizes() -> BTreeMap<String, u32> {
    [
        ("NIFTY", 75),
        ("BANKNIFTY", 35),
        ("FINNIFTY", 65),
        ("MIDCPNIFTY", 140),
        ("SENSEX", 20),
        ("BANKEX", 30),
    ]
    .into_iter()
    .map(|(symbol, lot)| (symbol.to_string(), lot))
    .collect()
}

fn default_lot() -> u32 {
    1
}

fn default_sell_keywords() -> Vec<String> {
    [
        "sell",
        "short",
        "iron condor",
        "iron fly",
        "iron butterfly",
        "credit spread",
        "write",
        "writing",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Transaction charge schedule applied on every exit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeConfig {
    /// Flat brokerage for the round trip
    #[serde(default = "default_brokerage")]
    pub brokerage_flat: Decimal,
    /// Securities transaction tax rate on exit turnover
    #[serde(default = "default_stt_rate")]
    pub stt_rate: Decimal,
    /// Exchange/regulatory rate on round-trip turnover
    #[serde(default = "default_regulatory_rate")]
    pub regulatory_rate: Decimal,
    /// Tax rate on brokerage
    #[serde(default = "default_gst_rate")]
    pub gst_rate: Decimal,
}

impl Default for ChargeConfig {
    fn default() -> Self {
        Self {
            brokerage_flat: default_brokerage(),
            stt_rate: default_stt_rate(),
            regulatory_rate: default_regulatory_rate(),
            gst_rate: default_gst_rate(),
        }
    }
}

fn default_brokerage() -> Decimal {
    dec!(40)
}

fn default_stt_rate() -> Decimal {
    dec!(0.001)
}

fn default_regulatory_rate() -> Decimal {
    dec!(0.0005)
}

fn default_gst_rate() -> Decimal {
    dec!(0.18)
}

/// Trading window, in exchange-local time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// IANA timezone name
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Session open, `HH:MM`
    #[serde(default = "default_open")]
    pub open: String,
    /// Session close, `HH:MM`
    #[serde(default = "default_close")]
    pub close: String,
    /// Earliest time for the daily close-out, `HH:MM`
    #[serde(default = "default_end_of_day")]
    pub end_of_day: String,
    /// Exchange holidays (weekdays with no session)
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            open: default_open(),
            close: default_close(),
            end_of_day: default_end_of_day(),
            holidays: Vec::new(),
        }
    }
}

fn default_timezone() -> String {
    "Asia/Kolkata".to_string()
}

fn default_open() -> String {
    "09:15".to_string()
}

fn default_close() -> String {
    "15:30".to_string()
}

fn default_end_of_day() -> String {
    "15:35".to_string()
}

/// Job intervals in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_decompose_interval")]
    pub decompose_interval_seconds: u64,
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_seconds: u64,
    /// How often the close-out job checks whether it is due
    #[serde(default = "default_end_of_day_poll")]
    pub end_of_day_poll_seconds: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            decompose_interval_seconds: default_decompose_interval(),
            monitor_interval_seconds: default_monitor_interval(),
            end_of_day_poll_seconds: default_end_of_day_poll(),
        }
    }
}

fn default_decompose_interval() -> u64 {
    60
}

fn default_monitor_interval() -> u64 {
    30
}

fn default_end_of_day_poll() -> u64 {
    60
}

/// Last-traded-price REST feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceFeedConfig {
    /// Base URL of the quote API
    #[serde(default = "default_feed_url")]
    pub base_url: String,
    /// Bearer token, if the feed needs one
    #[serde(default)]
    pub access_token: Option<String>,
    /// Instrument keys per request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Batches in flight at once within a tick
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_feed_url(),
            access_token: None,
            batch_size: default_batch_size(),
            max_in_flight: default_max_in_flight(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_feed_url() -> String {
    "https://api.upstox.com/v2".to_string()
}

fn default_batch_size() -> usize {
    50
}

fn default_max_in_flight() -> usize {
    1
}

fn default_request_timeout() -> u64 {
    10
}

/// Suggestion store settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON file of suggestions loaded into the in-memory store at start
    #[serde(default)]
    pub seed_file: Option<String>,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}
