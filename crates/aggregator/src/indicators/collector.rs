use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{vwap, Bollinger, BollingerBand, Candle, EmaCross, EmaCrossValue, Macd, MacdValue, Rsi, Stochastic, StochasticValue};

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    /// Closed candles kept per symbol.
    pub history: usize,
    /// Candles required before the first snapshot.
    pub min_candles: usize,
    pub rsi: Rsi,
    pub macd: Macd,
    pub bollinger: Bollinger,
    pub ema_cross: EmaCross,
    pub stochastic: Stochastic,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            history: 120,
            min_candles: 25,
            rsi: Rsi::default(),
            macd: Macd::default(),
            bollinger: Bollinger::default(),
            ema_cross: EmaCross::default(),
            stochastic: Stochastic::default(),
        }
    }
}

/// Every indicator evaluated at one closed candle. Indicators whose lookback
/// is not yet filled are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSnapshot {
    pub time: i64,
    pub close: f64,
    pub rsi: Option<f64>,
    pub macd: Option<MacdValue>,
    pub bollinger: Option<BollingerBand>,
    pub ema: Option<EmaCrossValue>,
    pub stochastic: Option<StochasticValue>,
    pub vwap: Option<f64>,
}

/// Per-symbol buffer of closed candles.
#[derive(Debug, Default)]
pub struct IndicatorCollector {
    config: IndicatorConfig,
    candles: HashMap<String, VecDeque<Candle>>,
}

impl IndicatorCollector {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config, candles: HashMap::new() }
    }

    /// Buffer a closed candle and evaluate the indicators once at least
    /// `min_candles` are held.
    pub fn collect(&mut self, symbol: &str, candle: Candle) -> Option<IndicatorSnapshot> {
        let history = self.candles.entry(symbol.to_string()).or_default();
        if history.back().is_some_and(|last| last.time >= candle.time) {
            debug!(symbol, time = candle.time, "Stale candle ignored");
            return None;
        }
        history.push_back(candle);
        while history.len() > self.config.history.max(1) {
            history.pop_front();
        }
        if history.len() < self.config.min_candles {
            return None;
        }

        let candles: &[Candle] = history.make_contiguous();
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let cfg = &self.config;
        Some(IndicatorSnapshot {
            time: candle.time,
            close: candle.close,
            rsi: cfg.rsi.compute(&closes),
            macd: cfg.macd.compute(&closes),
            bollinger: cfg.bollinger.compute(&closes),
            ema: cfg.ema_cross.compute(&closes),
            stochastic: cfg.stochastic.compute(candles),
            vwap: vwap(candles),
        })
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.candles.get(symbol).map_or(0, VecDeque::len)
    }
}
