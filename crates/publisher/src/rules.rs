use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use aggregator::{VariationStat, WindowSet};
use common::{EventDetail, MarketEvent, PriceSample};

/// Which aggregator a window set came from; picks the event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Minute,
    Second,
}

/// Percent thresholds keyed by window name. A window without an entry
/// never fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationThresholds {
    pub minutes: BTreeMap<String, f64>,
    pub seconds: BTreeMap<String, f64>,
}

impl Default for VariationThresholds {
    fn default() -> Self {
        let minutes = [
            ("5m", 0.1),
            ("10m", 0.2),
            ("15m", 0.3),
            ("20m", 0.35),
            ("25m", 0.4),
            ("30m", 0.45),
            ("60m", 0.5),
        ];
        let seconds = [
            ("1s", 1.0),
            ("2s", 2.0),
            ("3s", 3.0),
            ("4s", 3.5),
            ("5s", 4.0),
            ("6s", 4.5),
            ("7s", 5.0),
            ("8s", 5.5),
            ("9s", 6.0),
            ("10s", 6.5),
        ];
        let table = |pairs: &[(&str, f64)]| pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        Self { minutes: table(&minutes), seconds: table(&seconds) }
    }
}

impl VariationThresholds {
    pub fn threshold(&self, granularity: Granularity, window: &str) -> Option<f64> {
        let table = match granularity {
            Granularity::Minute => &self.minutes,
            Granularity::Second => &self.seconds,
        };
        table.get(window).copied()
    }
}

/// One `PRICE_JUMP`/`PRICE_DROP` (or second variant) per window whose
/// `|variation|` reaches its threshold.
pub fn variation_events(
    symbol: &str,
    windows: &WindowSet<VariationStat>,
    thresholds: &VariationThresholds,
    granularity: Granularity,
    volume: f64,
) -> Vec<MarketEvent> {
    windows
        .iter()
        .filter_map(|w| {
            let threshold = thresholds.threshold(granularity, &w.name)?;
            let stat = &w.stat;
            // an untouched window has start 0 and never qualifies
            if stat.start_price <= 0.0 || stat.variation == 0.0 || stat.variation.abs() < threshold {
                return None;
            }
            let start_price = stat.start_price;
            let detail = match (granularity, stat.variation > 0.0) {
                (Granularity::Minute, true) => EventDetail::PriceJump { start_price, threshold },
                (Granularity::Minute, false) => EventDetail::PriceDrop { start_price, threshold },
                (Granularity::Second, true) => EventDetail::PriceJumpSecond { start_price, threshold },
                (Granularity::Second, false) => EventDetail::PriceDropSecond { start_price, threshold },
            };
            Some(MarketEvent {
                symbol: symbol.to_string(),
                price: stat.current_price,
                volume,
                timestamp: stat.timestamp,
                percentage: stat.variation,
                window: Some(w.name.clone()),
                detail,
            })
        })
        .collect()
}

// ─── Mass buy / sell detection ───────────────────────────────────────────────

/// Tunables for the per-candle rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Analysis records kept per symbol.
    pub record_window: usize,
    /// Most recent records averaged for pressure.
    pub pressure_span: usize,
    /// Buy share (0..1) needed for `MASS_BUY`.
    pub buy_pressure: f64,
    /// Sell share (0..1) needed for `MASS_SELL`.
    pub sell_pressure: f64,
    /// Latest volume over the trailing average needed for either.
    pub surge_multiplier: f64,
    /// Close-over-open move (fraction) that emits a candle jump/drop.
    pub candle_variance: f64,
    /// Window label carried by candle events.
    pub candle_window: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            record_window: 100,
            pressure_span: 3,
            buy_pressure: 0.85,
            sell_pressure: 0.70,
            surge_multiplier: 2.0,
            candle_variance: 0.035,
            candle_window: "1m".to_string(),
        }
    }
}

/// Per-candle aggregate the mass detector reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisRecord {
    pub price: f64,
    pub buy_pressure: f64,
    pub sell_pressure: f64,
    pub variance: f64,
    pub volume: f64,
    pub timestamp: i64,
}

impl AnalysisRecord {
    /// `None` for candles without volume or a usable open.
    pub fn from_sample(sample: &PriceSample) -> Option<Self> {
        let buy_pressure = sample.buy_ratio()?;
        Some(Self {
            price: sample.price,
            buy_pressure,
            sell_pressure: 1.0 - buy_pressure,
            variance: sample.variance()?,
            volume: sample.volume,
            timestamp: sample.timestamp,
        })
    }
}

/// `MASS_BUY` / `MASS_SELL` from the latest records. Both the averaged
/// pressure and the volume surge must strictly exceed their thresholds.
pub fn mass_events(symbol: &str, records: &VecDeque<AnalysisRecord>, cfg: &DetectionConfig) -> Vec<MarketEvent> {
    let Some(latest) = records.back() else {
        return Vec::new();
    };
    let trailing = records.len() - 1;
    if trailing == 0 {
        return Vec::new();
    }
    let trailing_avg = records.iter().take(trailing).map(|r| r.volume).sum::<f64>() / trailing as f64;
    if trailing_avg <= 0.0 {
        return Vec::new();
    }
    let surge = latest.volume / trailing_avg;
    if !surge.is_finite() || surge <= cfg.surge_multiplier {
        return Vec::new();
    }

    let span = cfg.pressure_span.clamp(1, records.len());
    let recent = records.iter().skip(records.len() - span);
    let (buy, sell) = recent.fold((0.0, 0.0), |(b, s), r| (b + r.buy_pressure, s + r.sell_pressure));
    let avg_buy = buy / span as f64;
    let avg_sell = sell / span as f64;

    let event = |percentage: f64, detail: EventDetail| MarketEvent {
        symbol: symbol.to_string(),
        price: latest.price,
        volume: latest.volume,
        timestamp: latest.timestamp,
        percentage,
        window: None,
        detail,
    };

    let mut events = Vec::new();
    if avg_buy > cfg.buy_pressure {
        events.push(event(
            avg_buy * 100.0,
            EventDetail::MassBuy { threshold: cfg.buy_pressure * 100.0, surge },
        ));
    }
    if avg_sell > cfg.sell_pressure {
        events.push(event(
            avg_sell * 100.0,
            EventDetail::MassSell { threshold: cfg.sell_pressure * 100.0, surge },
        ));
    }
    events
}

/// A single candle that moved more than `candle_variance` since its open.
pub fn candle_event(sample: &PriceSample, cfg: &DetectionConfig) -> Option<MarketEvent> {
    let variance = sample.variance()?;
    if variance.abs() <= cfg.candle_variance {
        return None;
    }
    let start_price = sample.open;
    let threshold = cfg.candle_variance * 100.0;
    let detail = if variance > 0.0 {
        EventDetail::PriceJump { start_price, threshold }
    } else {
        EventDetail::PriceDrop { start_price, threshold }
    };
    Some(MarketEvent {
        symbol: sample.symbol.clone(),
        price: sample.price,
        volume: sample.volume,
        timestamp: sample.timestamp,
        percentage: variance * 100.0,
        window: Some(cfg.candle_window.clone()),
        detail,
    })
}

#[cfg(test)]
mod tests {
    use aggregator::{AggregatorConfig, IntervalAggregator, PriceVariation};
    use common::EventKind;

    use super::*;

    fn record(volume: f64, buy_pressure: f64) -> AnalysisRecord {
        AnalysisRecord {
            price: 100.0,
            buy_pressure,
            sell_pressure: 1.0 - buy_pressure,
            variance: 0.0,
            volume,
            timestamp: 0,
        }
    }

    #[test]
    fn second_windows_fire_on_drop() {
        let mut agg = IntervalAggregator::<PriceVariation>::new(AggregatorConfig::seconds());
        for (i, price) in [100.0, 100.0, 100.0, 100.0, 95.0].into_iter().enumerate() {
            agg.ingest("BTCUSDT", price, i as i64 * 1_000);
        }
        let windows = agg.windows("BTCUSDT").unwrap();
        let mut thresholds = VariationThresholds::default();
        thresholds.seconds.insert("5s".into(), 4.0);
        let events = variation_events("BTCUSDT", windows, &thresholds, Granularity::Second, 0.0);

        let five = events.iter().find(|e| e.window.as_deref() == Some("5s")).unwrap();
        assert_eq!(five.kind(), EventKind::PriceDropSecond);
        assert!((five.percentage + 5.0).abs() < 1e-9);
        // 10s window (6.5%) does not fire
        assert!(events.iter().all(|e| e.window.as_deref() != Some("10s")));
    }

    #[test]
    fn flat_prices_emit_nothing() {
        let mut agg = IntervalAggregator::<PriceVariation>::new(AggregatorConfig::minutes());
        agg.ingest("ETHUSDT", 10.0, 0);
        agg.ingest("ETHUSDT", 10.0, 1_000);
        let windows = agg.windows("ETHUSDT").unwrap();
        let events =
            variation_events("ETHUSDT", windows, &VariationThresholds::default(), Granularity::Minute, 0.0);
        assert!(events.is_empty());
    }

    #[test]
    fn mass_buy_needs_pressure_and_surge() {
        let cfg = DetectionConfig::default();
        let mut records: VecDeque<_> = (0..5).map(|_| record(10.0, 0.9)).collect();

        // pressure high but no surge
        records.push_back(record(10.0, 0.9));
        assert!(mass_events("BTCUSDT", &records, &cfg).is_empty());

        // surge with high buy pressure
        records.push_back(record(50.0, 0.9));
        let events = mass_events("BTCUSDT", &records, &cfg);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::MassBuy);
        assert!((events[0].percentage - 90.0).abs() < 1e-9);
    }

    #[test]
    fn mass_sell_on_surge_with_sell_pressure() {
        let cfg = DetectionConfig::default();
        let mut records: VecDeque<_> = (0..5).map(|_| record(10.0, 0.2)).collect();
        records.push_back(record(40.0, 0.2));
        let events = mass_events("BTCUSDT", &records, &cfg);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::MassSell);
    }

    #[test]
    fn thresholds_must_be_exceeded_not_reached() {
        let cfg = DetectionConfig { buy_pressure: 0.75, ..DetectionConfig::default() };

        // surge of exactly 2.0 with high pressure
        let at_surge: VecDeque<_> = [record(10.0, 0.9), record(10.0, 0.9), record(20.0, 0.9)].into_iter().collect();
        assert!(mass_events("BTCUSDT", &at_surge, &cfg).is_empty());

        // average pressure of exactly 0.75 with a large surge
        let at_pressure: VecDeque<_> =
            [record(10.0, 0.75), record(10.0, 0.75), record(40.0, 0.75)].into_iter().collect();
        assert!(mass_events("BTCUSDT", &at_pressure, &cfg).is_empty());

        let above: VecDeque<_> = [record(10.0, 0.75), record(10.0, 0.75), record(40.0, 1.0)].into_iter().collect();
        let events = mass_events("BTCUSDT", &above, &cfg);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::MassBuy);
    }

    #[test]
    fn zero_trailing_volume_is_insufficient_data() {
        let cfg = DetectionConfig::default();
        let records: VecDeque<_> = [record(0.0, 0.9), record(5.0, 0.9)].into_iter().collect();
        assert!(mass_events("BTCUSDT", &records, &cfg).is_empty());
    }

    #[test]
    fn candle_rule_uses_signed_move() {
        let cfg = DetectionConfig::default();
        let sample = PriceSample {
            symbol: "BTCUSDT".into(),
            open: 100.0,
            high: 100.0,
            low: 95.5,
            price: 96.0,
            volume: 1.0,
            taker_buy_volume: 0.5,
            timestamp: 7,
            is_closed: true,
        };
        let event = candle_event(&sample, &cfg).unwrap();
        assert_eq!(event.kind(), EventKind::PriceDrop);
        assert!((event.percentage + 4.0).abs() < 1e-9);

        let quiet = PriceSample { price: 101.0, ..sample };
        assert!(candle_event(&quiet, &cfg).is_none());
    }
}
