use serde::{Deserialize, Serialize};

use super::ema::{ema_series, Crossover};

/// MACD line = EMA(fast) - EMA(slow); signal = EMA(MACD line, signal).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for Macd {
    fn default() -> Self {
        Self { fast: 12, slow: 26, signal: 9 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
    /// MACD line against the signal line on the latest bar.
    pub crossover: Crossover,
}

impl Macd {
    /// Latest MACD point. Needs `slow + signal - 1` closes.
    pub fn compute(&self, closes: &[f64]) -> Option<MacdValue> {
        let fast = ema_series(closes, self.fast);
        let slow = ema_series(closes, self.slow);
        let mut line: Vec<f64> = fast.iter().rev().zip(slow.iter().rev()).map(|(f, s)| f - s).collect();
        line.reverse();

        let signal = ema_series(&line, self.signal);
        let macd = *line.last()?;
        let signal_now = *signal.last()?;
        Some(MacdValue {
            macd,
            signal: signal_now,
            histogram: macd - signal_now,
            crossover: Crossover::detect(&line, &signal),
        })
    }
}
