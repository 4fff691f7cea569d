//! Technical indicators over closed candles.
//!
//! Each indicator is a small configured struct with a `compute` over the
//! candle history (oldest first). [`IndicatorCollector`] buffers closed
//! candles per symbol and evaluates all of them at once.

pub mod bollinger;
pub mod collector;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod stochastic;

pub use bollinger::{Bollinger, BollingerBand};
pub use collector::{IndicatorCollector, IndicatorConfig, IndicatorSnapshot};
pub use ema::{ema_series, Crossover, EmaCross, EmaCrossValue};
pub use macd::{Macd, MacdValue};
pub use rsi::Rsi;
pub use stochastic::{Stochastic, StochasticValue};

/// One closed kline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    /// Open time, epoch milliseconds.
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Volume-weighted average of the typical price across `candles`.
/// `None` when they carry no volume.
pub fn vwap(candles: &[Candle]) -> Option<f64> {
    let (weighted, volume) = candles
        .iter()
        .fold((0.0, 0.0), |(w, v), c| (w + c.typical_price() * c.volume, v + c.volume));
    (volume > 0.0).then(|| weighted / volume)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vwap_weights_by_volume() {
        let a = Candle { time: 0, open: 9.0, high: 12.0, low: 9.0, close: 9.0, volume: 1.0 };
        let b = Candle { time: 1, open: 20.0, high: 21.0, low: 18.0, close: 21.0, volume: 3.0 };
        // typical prices 10 and 20
        assert_eq!(vwap(&[a, b]), Some(17.5));
        assert_eq!(vwap(&[Candle { volume: 0.0, ..a }]), None);
    }
}
