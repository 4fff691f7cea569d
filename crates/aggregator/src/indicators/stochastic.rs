use serde::{Deserialize, Serialize};

use super::Candle;

/// Stochastic oscillator: %K over `k_period` candles, %D its `d_period` average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stochastic {
    pub k_period: usize,
    pub d_period: usize,
}

impl Default for Stochastic {
    fn default() -> Self {
        Self { k_period: 5, d_period: 3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StochasticValue {
    pub k: f64,
    pub d: f64,
}

impl Stochastic {
    /// Needs `k_period + d_period - 1` candles. A window with no range reads 50.
    pub fn compute(&self, candles: &[Candle]) -> Option<StochasticValue> {
        let (k_period, d_period) = (self.k_period.max(1), self.d_period.max(1));
        if candles.len() < k_period + d_period - 1 {
            return None;
        }
        let ks: Vec<f64> = (candles.len() - d_period..candles.len())
            .map(|end| percent_k(&candles[end + 1 - k_period..=end]))
            .collect();
        let k = *ks.last()?;
        Some(StochasticValue { k, d: ks.iter().sum::<f64>() / d_period as f64 })
    }
}

fn percent_k(window: &[Candle]) -> f64 {
    let high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let close = window.last().map_or(low, |c| c.close);
    if high <= low {
        return 50.0;
    }
    (close - low) / (high - low) * 100.0
}
