use serde::{Deserialize, Serialize};

/// EMA of `values` (oldest first), seeded with the simple average of the
/// first `period` values.
///
/// The series is aligned to the end of `values` and holds
/// `values.len() - period + 1` points; it is empty when there are fewer than
/// `period` values.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    let mut series = Vec::with_capacity(values.len() - period + 1);
    series.push(ema);
    for &value in &values[period..] {
        ema = value * k + ema * (1.0 - k);
        series.push(ema);
    }
    series
}

/// Direction in which a fast line crossed a slow one on the latest bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Crossover {
    Bullish,
    Bearish,
    Neutral,
}

impl Crossover {
    /// Compare the last two points of two end-aligned series.
    pub fn detect(fast: &[f64], slow: &[f64]) -> Self {
        let (Some(prev_fast), Some(prev_slow)) = (nth_last(fast, 1), nth_last(slow, 1)) else {
            return Crossover::Neutral;
        };
        let (Some(fast), Some(slow)) = (nth_last(fast, 0), nth_last(slow, 0)) else {
            return Crossover::Neutral;
        };
        if prev_fast <= prev_slow && fast > slow {
            Crossover::Bullish
        } else if prev_fast >= prev_slow && fast < slow {
            Crossover::Bearish
        } else {
            Crossover::Neutral
        }
    }
}

fn nth_last(series: &[f64], n: usize) -> Option<f64> {
    series.len().checked_sub(n + 1).map(|i| series[i])
}

/// Short and long EMA of the closes and their crossover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmaCrossValue {
    pub short_ema: f64,
    pub long_ema: f64,
    pub signal: Crossover,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmaCross {
    pub short: usize,
    pub long: usize,
}

impl Default for EmaCross {
    fn default() -> Self {
        Self { short: 9, long: 21 }
    }
}

impl EmaCross {
    /// `None` until there are `long` closes.
    pub fn compute(&self, closes: &[f64]) -> Option<EmaCrossValue> {
        let short = ema_series(closes, self.short);
        let long = ema_series(closes, self.long);
        Some(EmaCrossValue {
            short_ema: *short.last()?,
            long_ema: *long.last()?,
            signal: Crossover::detect(&short, &long),
        })
    }
}
