use std::str::FromStr;

use crate::{Error, Result};

/// Process configuration, loaded from environment variables at startup.
/// Every value has a default; malformed values are a `Config` error.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite URL for the durable store. `None` keeps everything in memory.
    pub database_url: Option<String>,

    // Feed
    pub symbols: Vec<String>,
    pub stream_url: String,
    pub kline_interval: String,

    // Decision modules
    pub strategy_config_path: String,

    // Event log retention, per symbol
    pub event_log_cap: usize,
    pub price_log_cap: usize,
    pub depth_log_cap: usize,
    pub indicator_log_cap: usize,
    /// Absolute price band around the last trade used for depth volume.
    pub depth_band: f64,

    /// Per-subscriber queue depth on the event bus.
    pub bus_capacity: usize,

    /// Delay in seconds before each monitoring checkpoint.
    pub monitor_intervals: Vec<u64>,

    // Supervisor
    pub restart_backoff_ms: u64,
    pub restart_backoff_max_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            symbols: vec!["BTCUSDT".to_string()],
            stream_url: "wss://stream.binance.com:9443/ws".to_string(),
            kline_interval: "1s".to_string(),
            strategy_config_path: "config/strategies.toml".to_string(),
            event_log_cap: 1000,
            price_log_cap: 300,
            depth_log_cap: 10_000,
            indicator_log_cap: 180,
            depth_band: 200.0,
            bus_capacity: 1024,
            monitor_intervals: vec![10; 16],
            restart_backoff_ms: 500,
            restart_backoff_max_ms: 30_000,
        }
    }
}

impl Config {
    /// Load configuration from the environment. Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let symbols = match get("SYMBOLS") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.symbols,
        };
        if symbols.is_empty() {
            return Err(Error::Config("SYMBOLS must name at least one instrument".into()));
        }

        let monitor_intervals = match get("MONITOR_INTERVALS") {
            Some(raw) => raw
                .split(',')
                .map(|s| parse_value::<u64>("MONITOR_INTERVALS", s.trim()))
                .collect::<Result<Vec<_>>>()?,
            None => defaults.monitor_intervals,
        };
        if monitor_intervals.is_empty() || monitor_intervals.iter().any(|&s| s == 0) {
            return Err(Error::Config("MONITOR_INTERVALS must be positive seconds".into()));
        }

        let config = Config {
            database_url: get("DATABASE_URL"),
            symbols,
            stream_url: get("STREAM_URL").unwrap_or(defaults.stream_url),
            kline_interval: get("KLINE_INTERVAL").unwrap_or(defaults.kline_interval),
            strategy_config_path: get("STRATEGY_CONFIG_PATH")
                .unwrap_or(defaults.strategy_config_path),
            event_log_cap: optional(&get, "EVENT_LOG_CAP", defaults.event_log_cap)?,
            price_log_cap: optional(&get, "PRICE_LOG_CAP", defaults.price_log_cap)?,
            depth_log_cap: optional(&get, "DEPTH_LOG_CAP", defaults.depth_log_cap)?,
            indicator_log_cap: optional(&get, "INDICATOR_LOG_CAP", defaults.indicator_log_cap)?,
            depth_band: optional(&get, "DEPTH_BAND", defaults.depth_band)?,
            bus_capacity: optional(&get, "BUS_CAPACITY", defaults.bus_capacity)?,
            monitor_intervals,
            restart_backoff_ms: optional(&get, "RESTART_BACKOFF_MS", defaults.restart_backoff_ms)?,
            restart_backoff_max_ms: optional(
                &get,
                "RESTART_BACKOFF_MAX_MS",
                defaults.restart_backoff_max_ms,
            )?,
        };

        if config.bus_capacity == 0 {
            return Err(Error::Config("BUS_CAPACITY must be at least 1".into()));
        }
        if !config.depth_band.is_finite() || config.depth_band < 0.0 {
            return Err(Error::Config(format!("DEPTH_BAND = {}", config.depth_band)));
        }
        Ok(config)
    }
}

fn optional<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, raw.trim()),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::Config(format!("{key} has an invalid value: '{raw}'")))
}
