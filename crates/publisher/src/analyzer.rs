use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use aggregator::{
    AggregatorConfig, Candle, IndicatorCollector, IndicatorConfig, IntervalAggregator, PressureStat, PriceVariation,
    VariationStat, VolumePressure, VolumeTick, WindowSet,
};
use common::{price_key, DepthSample, Error, EventDetail, MarketEvent, PriceSample, Result, Sample, Store};

use crate::publisher::Publisher;
use crate::rules::{self, AnalysisRecord, DetectionConfig, Granularity, VariationThresholds};

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub minute_windows: AggregatorConfig,
    pub second_windows: AggregatorConfig,
    pub thresholds: VariationThresholds,
    pub detection: DetectionConfig,
    /// Absolute distance from the last price within which depth levels count.
    pub depth_band: f64,
    pub indicators: IndicatorConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            minute_windows: AggregatorConfig::minutes(),
            second_windows: AggregatorConfig::seconds(),
            thresholds: VariationThresholds::default(),
            detection: DetectionConfig::default(),
            depth_band: 200.0,
            indicators: IndicatorConfig::default(),
        }
    }
}

/// Everything currently known about one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub price: f64,
    pub timestamp: i64,
    pub minutes: WindowSet<VariationStat>,
    pub seconds: WindowSet<VariationStat>,
    pub volumes: WindowSet<PressureStat>,
}

/// Turns samples into market events.
///
/// Owns the aggregators, so samples of one symbol are processed strictly in
/// arrival order by whoever holds the analyzer.
pub struct MarketAnalyzer {
    store: Arc<dyn Store>,
    publisher: Publisher,
    config: AnalyzerConfig,
    minutes: IntervalAggregator<PriceVariation>,
    seconds: IntervalAggregator<PriceVariation>,
    volumes: IntervalAggregator<VolumePressure>,
    indicators: IndicatorCollector,
    records: HashMap<String, VecDeque<AnalysisRecord>>,
    last_price: HashMap<String, (f64, i64)>,
}

impl MarketAnalyzer {
    pub fn new(store: Arc<dyn Store>, publisher: Publisher, config: AnalyzerConfig) -> Self {
        Self {
            store,
            publisher,
            minutes: IntervalAggregator::new(config.minute_windows.clone()),
            seconds: IntervalAggregator::new(config.second_windows.clone()),
            // volume windows share the minute durations
            volumes: IntervalAggregator::new(config.minute_windows.clone()),
            indicators: IndicatorCollector::new(config.indicators.clone()),
            config,
            records: HashMap::new(),
            last_price: HashMap::new(),
        }
    }

    /// Process one sample and return the events that were published for it.
    /// Invalid samples are dropped.
    pub async fn on_sample(&mut self, sample: Sample) -> Vec<MarketEvent> {
        if let Err(e) = sample.validate() {
            warn!(symbol = sample.symbol(), error = %e, "Dropping malformed sample");
            return Vec::new();
        }
        let events = match &sample {
            Sample::Price(price) => self.derive_price_events(price).await,
            Sample::Depth(depth) => self.derive_depth_event(depth).into_iter().collect(),
        };

        let mut published = Vec::with_capacity(events.len());
        for event in events {
            if self.publisher.publish(event.clone()).await.is_some() {
                published.push(event);
            }
        }
        published
    }

    async fn derive_price_events(&mut self, sample: &PriceSample) -> Vec<MarketEvent> {
        let symbol = sample.symbol.as_str();
        let ts = sample.timestamp;

        if let Err(e) = self.store.set(&price_key(symbol), &sample.price.to_string()).await {
            warn!(symbol, error = %e, "Failed to store current price");
        }
        self.last_price.insert(symbol.to_string(), (sample.price, ts));

        let mut events = vec![MarketEvent::price_update(symbol, sample.price, sample.volume, ts)];

        let tick = VolumeTick { buy: sample.buy_volume(), sell: sample.sell_volume() };
        self.volumes.ingest(symbol, tick, ts);

        let minute_windows = self.minutes.ingest(symbol, sample.price, ts);
        events.extend(rules::variation_events(
            symbol,
            minute_windows,
            &self.config.thresholds,
            Granularity::Minute,
            sample.volume,
        ));
        let second_windows = self.seconds.ingest(symbol, sample.price, ts);
        events.extend(rules::variation_events(
            symbol,
            second_windows,
            &self.config.thresholds,
            Granularity::Second,
            sample.volume,
        ));

        if let Some(record) = AnalysisRecord::from_sample(sample) {
            let detection = &self.config.detection;
            let records = self.records.entry(symbol.to_string()).or_default();
            records.push_back(record);
            while records.len() > detection.record_window.max(1) {
                records.pop_front();
            }
            events.extend(rules::mass_events(symbol, records, detection));
        } else {
            debug!(symbol, "Candle without volume, skipping mass detection");
        }

        events.extend(rules::candle_event(sample, &self.config.detection));
        if sample.is_closed {
            self.collect_indicators(sample).await;
        }
        events
    }

    async fn collect_indicators(&mut self, sample: &PriceSample) {
        let candle = Candle {
            time: sample.timestamp,
            open: sample.open,
            high: sample.high,
            low: sample.low,
            close: sample.price,
            volume: sample.volume,
        };
        let Some(snapshot) = self.indicators.collect(&sample.symbol, candle) else {
            return;
        };
        debug!(symbol = %sample.symbol, rsi = ?snapshot.rsi, "Indicators updated");
        if let Err(e) = self.publisher.log().append_indicators(&sample.symbol, &snapshot).await {
            warn!(symbol = %sample.symbol, error = %e, "Failed to store indicators");
        }
    }

    fn derive_depth_event(&self, depth: &DepthSample) -> Option<MarketEvent> {
        let Some(&(last, _)) = self.last_price.get(&depth.symbol) else {
            debug!(symbol = %depth.symbol, "Depth before first price, dropped");
            return None;
        };
        let band = self.config.depth_band;
        let within = |levels: &[(f64, f64)]| {
            levels
                .iter()
                .filter(|(price, _)| (price - last).abs() <= band)
                .map(|(_, qty)| qty)
                .sum::<f64>()
        };
        let buy_volume = within(&depth.bids);
        let sell_volume = within(&depth.asks);
        let total = buy_volume + sell_volume;
        if total <= 0.0 {
            return None;
        }
        Some(MarketEvent {
            symbol: depth.symbol.clone(),
            price: last,
            volume: total,
            timestamp: depth.timestamp,
            percentage: buy_volume / total * 100.0,
            window: None,
            detail: EventDetail::Volume { buy_volume, sell_volume },
        })
    }

    /// Current windows and price of `symbol`, `None` before its first price sample.
    pub fn snapshot(&self, symbol: &str) -> Option<MarketSnapshot> {
        let &(price, timestamp) = self.last_price.get(symbol)?;
        Some(MarketSnapshot {
            symbol: symbol.to_string(),
            price,
            timestamp,
            minutes: self.minutes.windows(symbol)?.clone(),
            seconds: self.seconds.windows(symbol)?.clone(),
            volumes: self.volumes.windows(symbol)?.clone(),
        })
    }

    /// Consume samples until cancelled. A closed sample channel is an error so
    /// the supervisor restarts the unit.
    pub async fn run(mut self, mut samples: broadcast::Receiver<Sample>, token: CancellationToken) -> Result<()> {
        info!("Market analyzer started");
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Market analyzer stopping");
                    return Ok(());
                }
                received = samples.recv() => match received {
                    Ok(sample) => {
                        self.on_sample(sample).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Market analyzer lagged behind the feed");
                    }
                    Err(RecvError::Closed) => {
                        return Err(Error::Other("sample channel closed".into()));
                    }
                },
            }
        }
    }
}
