use std::io::ErrorKind;

use serde::{Deserialize, Serialize};
use tracing::warn;

use common::{Error, EventKind, Result, Side};

/// Top-level strategy config file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// [[strategy]]
/// name = "dip-buyer"
/// symbol = "BTCUSDT"
/// side = "LONG"
/// leverage = 10.0
/// notional_usd = 100.0
/// stop_loss = 0.01
/// take_profit = 0.02
///
/// [strategy.when]
/// kinds = ["PRICE_DROP_SECOND"]
/// windows = ["5s", "10s"]
/// min_percentage = 4.0
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    #[serde(rename = "strategy", default)]
    pub strategies: Vec<StrategyConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Unique name; must not contain ':'.
    pub name: String,
    pub symbol: String,
    /// Whether the strategy starts activated.
    #[serde(default = "default_active")]
    pub active: bool,
    pub side: Side,
    pub leverage: f64,
    pub notional_usd: f64,
    /// Below 1: fraction of entry; otherwise an absolute price.
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    pub when: Trigger,
}

/// Which events fire a strategy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Trigger {
    pub kinds: Vec<EventKind>,
    /// Empty matches any window, including un-windowed events.
    #[serde(default)]
    pub windows: Vec<String>,
    /// Minimum `|percentage|` of the event.
    #[serde(default)]
    pub min_percentage: f64,
}

fn default_active() -> bool {
    true
}

impl StrategyFileConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content).map_err(|e| Error::Config(format!("{path}: {e}")))
    }

    /// Like [`load`](Self::load), but a missing file is an empty pool.
    pub fn load_or_empty(path: &str) -> Result<Self> {
        match Self::load(path) {
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                warn!(path, "No strategy file, starting without decision modules");
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: StrategyFileConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        let mut seen = std::collections::HashSet::new();
        for s in &file.strategies {
            if !seen.insert(s.name.as_str()) {
                return Err(Error::Config(format!("duplicate strategy name '{}'", s.name)));
            }
        }
        Ok(file)
    }
}
