use std::collections::VecDeque;

use serde::Serialize;

use crate::window::Point;

/// What an aggregator window computes from the retained history.
pub trait Metric {
    /// Per-sample input.
    type Value: Copy + std::fmt::Debug;
    /// Per-window statistic. `Default` is the value before any sample fits.
    type Stat: Clone + Default + std::fmt::Debug + PartialEq;

    /// Summarise the samples with `timestamp >= cutoff` in `history`
    /// (arrival order; `latest` is the sample just ingested).
    ///
    /// `None` means insufficient data: the window keeps its previous value.
    fn summarize(
        history: &VecDeque<Point<Self::Value>>,
        cutoff: i64,
        latest: &Point<Self::Value>,
    ) -> Option<Self::Stat>;
}

// ─── Price variation ─────────────────────────────────────────────────────────

/// Percent change from the oldest in-window price to the latest one.
#[derive(Debug, Clone, Copy)]
pub struct PriceVariation;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VariationStat {
    pub start_price: f64,
    pub current_price: f64,
    /// `(current - start) / start * 100`
    pub variation: f64,
    pub timestamp: i64,
}

impl Metric for PriceVariation {
    type Value = f64;
    type Stat = VariationStat;

    fn summarize(history: &VecDeque<Point<f64>>, cutoff: i64, latest: &Point<f64>) -> Option<VariationStat> {
        let start = history.iter().find(|p| p.timestamp >= cutoff)?;
        if start.value <= 0.0 {
            return None;
        }
        let variation = (latest.value - start.value) / start.value * 100.0;
        variation.is_finite().then_some(VariationStat {
            start_price: start.value,
            current_price: latest.value,
            variation,
            timestamp: latest.timestamp,
        })
    }
}

// ─── Volume pressure ─────────────────────────────────────────────────────────

/// Buy / sell volume of one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeTick {
    pub buy: f64,
    pub sell: f64,
}

/// Summed buy / sell volume of a window and each side's share in percent.
#[derive(Debug, Clone, Copy)]
pub struct VolumePressure;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PressureStat {
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub total_volume: f64,
    pub buy_pressure: f64,
    pub sell_pressure: f64,
    pub timestamp: i64,
}

impl Metric for VolumePressure {
    type Value = VolumeTick;
    type Stat = PressureStat;

    fn summarize(
        history: &VecDeque<Point<VolumeTick>>,
        cutoff: i64,
        latest: &Point<VolumeTick>,
    ) -> Option<PressureStat> {
        let (buy, sell) = history
            .iter()
            .filter(|p| p.timestamp >= cutoff)
            .fold((0.0, 0.0), |(b, s), p| (b + p.value.buy, s + p.value.sell));
        let total = buy + sell;
        // no volume at all: pressure is undefined
        if total <= 0.0 || !total.is_finite() {
            return None;
        }
        Some(PressureStat {
            buy_volume: buy,
            sell_volume: sell,
            total_volume: total,
            buy_pressure: buy / total * 100.0,
            sell_pressure: sell / total * 100.0,
            timestamp: latest.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history<V: Copy>(points: &[(V, i64)]) -> VecDeque<Point<V>> {
        points.iter().map(|&(value, timestamp)| Point { value, timestamp }).collect()
    }

    #[test]
    fn variation_uses_oldest_point_inside_cutoff() {
        let h = history(&[(90.0, 0), (100.0, 1_000), (110.0, 2_000)]);
        let stat = PriceVariation::summarize(&h, 500, h.back().unwrap()).unwrap();
        assert_eq!(stat.start_price, 100.0);
        assert!((stat.variation - 10.0).abs() < 1e-9);
    }

    #[test]
    fn variation_skips_non_positive_start() {
        let h = history(&[(0.0, 0), (100.0, 1_000)]);
        assert!(PriceVariation::summarize(&h, 0, h.back().unwrap()).is_none());
    }

    #[test]
    fn pressure_sums_window_only() {
        let tick = |buy, sell| VolumeTick { buy, sell };
        let h = history(&[(tick(100.0, 0.0), 0), (tick(3.0, 1.0), 1_000), (tick(1.0, 3.0), 2_000)]);
        let stat = VolumePressure::summarize(&h, 1_000, h.back().unwrap()).unwrap();
        assert_eq!(stat.total_volume, 8.0);
        assert_eq!(stat.buy_pressure, 50.0);
        assert_eq!(stat.sell_pressure, 50.0);
    }

    #[test]
    fn pressure_without_volume_is_insufficient() {
        let h = history(&[(VolumeTick { buy: 0.0, sell: 0.0 }, 0)]);
        assert!(VolumePressure::summarize(&h, 0, h.back().unwrap()).is_none());
    }
}
