use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::metric::Metric;
use crate::window::{Point, WindowSet, WindowSpec};

/// Declared windows plus how much history to retain.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfig {
    pub windows: Vec<WindowSpec>,
    /// Samples older than `now - retention_ms` are pruned on every insert.
    pub retention_ms: i64,
}

impl AggregatorConfig {
    /// Retention defaults to the longest declared window.
    pub fn new(windows: Vec<WindowSpec>) -> Self {
        let retention_ms = windows.iter().map(|w| w.duration_ms).max().unwrap_or(0);
        Self { windows, retention_ms }
    }

    /// 5, 10, 15, 20, 25, 30 and 60 minutes; one hour of history.
    pub fn minutes() -> Self {
        Self::new([5, 10, 15, 20, 25, 30, 60].into_iter().map(WindowSpec::minutes).collect())
    }

    /// 1 to 10 seconds; ten seconds of history.
    pub fn seconds() -> Self {
        Self::new((1..=10).map(WindowSpec::seconds).collect())
    }
}

struct Series<M: Metric> {
    history: VecDeque<Point<M::Value>>,
    windows: WindowSet<M::Stat>,
}

/// Per-symbol rolling windows over one metric.
///
/// Not safe for concurrent mutation of one symbol; callers feed each symbol
/// in arrival order. The most recently ingested sample is "now".
pub struct IntervalAggregator<M: Metric> {
    config: AggregatorConfig,
    series: HashMap<String, Series<M>>,
}

impl<M: Metric> IntervalAggregator<M> {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config, series: HashMap::new() }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Append a sample, prune expired history and recompute every window.
    pub fn ingest(&mut self, symbol: &str, value: M::Value, timestamp: i64) -> &WindowSet<M::Stat> {
        let config = &self.config;
        let series = self.series.entry(symbol.to_string()).or_insert_with(|| Series {
            history: VecDeque::new(),
            windows: WindowSet::new(&config.windows),
        });

        let latest = Point { value, timestamp };
        series.history.push_back(latest);

        // Timestamps are not guaranteed monotonic, so scan the whole deque.
        let cutoff = timestamp.saturating_sub(config.retention_ms);
        let before = series.history.len();
        series.history.retain(|p| p.timestamp >= cutoff);
        let pruned = before - series.history.len();
        if pruned > 0 {
            debug!(symbol, pruned, retained = series.history.len(), "Pruned sample history");
        }

        for window in series.windows.iter_mut() {
            let window_cutoff = timestamp.saturating_sub(window.duration_ms);
            if let Some(stat) = M::summarize(&series.history, window_cutoff, &latest) {
                window.stat = stat;
            }
        }

        &series.windows
    }

    /// Current windows of `symbol`, `None` before its first sample.
    pub fn windows(&self, symbol: &str) -> Option<&WindowSet<M::Stat>> {
        self.series.get(symbol).map(|s| &s.windows)
    }

    pub fn history_len(&self, symbol: &str) -> usize {
        self.series.get(symbol).map_or(0, |s| s.history.len())
    }

    /// Oldest retained timestamp of `symbol`.
    pub fn oldest_timestamp(&self, symbol: &str) -> Option<i64> {
        self.series
            .get(symbol)
            .and_then(|s| s.history.iter().map(|p| p.timestamp).min())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{PriceVariation, VolumePressure, VolumeTick};

    #[test]
    fn windows_exist_with_zero_values_before_data_fits() {
        let mut agg = IntervalAggregator::<PriceVariation>::new(AggregatorConfig::seconds());
        assert!(agg.windows("BTCUSDT").is_none());
        let windows = agg.ingest("BTCUSDT", 100.0, 0);
        assert_eq!(windows.len(), 10);
        // single sample: start == current for every window
        for w in windows.iter() {
            assert_eq!(w.stat.start_price, 100.0);
            assert_eq!(w.stat.variation, 0.0);
        }
    }

    #[test]
    fn five_second_drop_scenario() {
        let mut agg = IntervalAggregator::<PriceVariation>::new(AggregatorConfig::seconds());
        for (i, price) in [100.0, 100.0, 100.0, 100.0, 95.0].into_iter().enumerate() {
            agg.ingest("BTCUSDT", price, i as i64 * 1_000);
        }
        let windows = agg.windows("BTCUSDT").unwrap();
        let five = windows.get("5s").unwrap();
        assert_eq!(five.start_price, 100.0);
        assert_eq!(five.current_price, 95.0);
        assert!((five.variation + 5.0).abs() < 1e-9);
        // the 1s window starts at the 3s sample
        assert_eq!(windows.get("1s").unwrap().start_price, 100.0);
    }

    #[test]
    fn history_is_pruned_to_retention() {
        let mut agg = IntervalAggregator::<PriceVariation>::new(AggregatorConfig::seconds());
        for i in 0..30 {
            agg.ingest("BTCUSDT", 100.0 + i as f64, i * 1_000);
        }
        // now = 29s, retention 10s: samples 19s..=29s survive
        assert_eq!(agg.history_len("BTCUSDT"), 11);
        assert_eq!(agg.oldest_timestamp("BTCUSDT"), Some(19_000));
    }

    #[test]
    fn out_of_order_sample_becomes_now() {
        let mut agg = IntervalAggregator::<PriceVariation>::new(AggregatorConfig::seconds());
        agg.ingest("BTCUSDT", 100.0, 20_000);
        agg.ingest("BTCUSDT", 50.0, 5_000);
        // the 20s sample is newer than "now" and stays; nothing older than -5s exists
        assert_eq!(agg.history_len("BTCUSDT"), 2);
        let ten = agg.windows("BTCUSDT").unwrap().get("10s").unwrap();
        assert_eq!(ten.start_price, 100.0);
        assert_eq!(ten.current_price, 50.0);
    }

    #[test]
    fn symbols_do_not_interact() {
        let mut agg = IntervalAggregator::<PriceVariation>::new(AggregatorConfig::minutes());
        agg.ingest("BTCUSDT", 100.0, 0);
        agg.ingest("ETHUSDT", 10.0, 0);
        agg.ingest("BTCUSDT", 110.0, 60_000);
        let eth = agg.windows("ETHUSDT").unwrap().get("5m").unwrap();
        assert_eq!(eth.current_price, 10.0);
        let btc = agg.windows("BTCUSDT").unwrap().get("5m").unwrap();
        assert!((btc.variation - 10.0).abs() < 1e-9);
    }

    #[test]
    fn empty_volume_keeps_previous_pressure() {
        let mut agg = IntervalAggregator::<VolumePressure>::new(AggregatorConfig::seconds());
        agg.ingest("BTCUSDT", VolumeTick { buy: 3.0, sell: 1.0 }, 0);
        // 1s window now only sees an empty tick
        let windows = agg.ingest("BTCUSDT", VolumeTick { buy: 0.0, sell: 0.0 }, 5_000);
        let one = windows.get("1s").unwrap();
        assert_eq!(one.buy_pressure, 75.0);
        assert_eq!(one.timestamp, 0);
        let ten = windows.get("10s").unwrap();
        assert_eq!(ten.total_volume, 4.0);
        assert_eq!(ten.timestamp, 5_000);
    }
}
