use std::sync::Arc;

use tracing::warn;

use aggregator::IndicatorSnapshot;
use common::{EventKind, MarketEvent, Result, Store};

/// Which capped log an event lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Prices,
    Depths,
    Signals,
    /// Indicator snapshots of closed candles; never holds events.
    Indicators,
}

impl LogStream {
    pub fn for_kind(kind: EventKind) -> Self {
        match kind {
            EventKind::PriceUpdate => LogStream::Prices,
            EventKind::Volume => LogStream::Depths,
            _ => LogStream::Signals,
        }
    }

    pub fn key(self, symbol: &str) -> String {
        match self {
            LogStream::Prices => format!("price:{symbol}"),
            LogStream::Depths => format!("events:{symbol}:depths"),
            LogStream::Signals => format!("events:{symbol}"),
            LogStream::Indicators => format!("indicators:{symbol}"),
        }
    }
}

/// Maximum retained entries per symbol and stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogCaps {
    pub prices: usize,
    pub depths: usize,
    pub signals: usize,
    pub indicators: usize,
}

impl Default for LogCaps {
    fn default() -> Self {
        Self { prices: 300, depths: 10_000, signals: 1000, indicators: 180 }
    }
}

impl LogCaps {
    pub fn for_stream(&self, stream: LogStream) -> usize {
        match stream {
            LogStream::Prices => self.prices,
            LogStream::Depths => self.depths,
            LogStream::Signals => self.signals,
            LogStream::Indicators => self.indicators,
        }
    }
}

/// Symbol-scoped, time-ordered, capped history of published events.
#[derive(Clone)]
pub struct EventLog {
    store: Arc<dyn Store>,
    caps: LogCaps,
}

impl EventLog {
    pub fn new(store: Arc<dyn Store>, caps: LogCaps) -> Self {
        Self { store, caps }
    }

    /// Append `event` scored by its timestamp, then trim the oldest beyond the cap.
    pub async fn append(&self, event: &MarketEvent) -> Result<()> {
        let stream = LogStream::for_kind(event.kind());
        self.push(&event.symbol, stream, event.timestamp, &serde_json::to_string(event)?).await
    }

    /// Append the indicator snapshot of a closed candle, scored by its open time.
    pub async fn append_indicators(&self, symbol: &str, snapshot: &IndicatorSnapshot) -> Result<()> {
        let payload = serde_json::to_string(snapshot)?;
        self.push(symbol, LogStream::Indicators, snapshot.time, &payload).await
    }

    /// The newest `n` events of an event stream, oldest first. Entries that
    /// no longer decode are skipped.
    pub async fn recent(&self, symbol: &str, stream: LogStream, n: usize) -> Result<Vec<MarketEvent>> {
        self.tail(symbol, stream, n, MarketEvent::from_json).await
    }

    /// The newest `n` indicator snapshots, oldest first.
    pub async fn recent_indicators(&self, symbol: &str, n: usize) -> Result<Vec<IndicatorSnapshot>> {
        self.tail(symbol, LogStream::Indicators, n, |text| Ok(serde_json::from_str(text)?)).await
    }

    async fn push(&self, symbol: &str, stream: LogStream, score: i64, payload: &str) -> Result<()> {
        let key = stream.key(symbol);
        self.store.zadd(&key, score, payload).await?;
        self.store.trim_to(&key, self.caps.for_stream(stream)).await?;
        Ok(())
    }

    async fn tail<T, F>(&self, symbol: &str, stream: LogStream, n: usize, decode: F) -> Result<Vec<T>>
    where
        F: Fn(&str) -> Result<T>,
    {
        if n == 0 {
            return Ok(Vec::new());
        }
        let start = -(i64::try_from(n).unwrap_or(i64::MAX));
        let raw = self.store.zrange(&stream.key(symbol), start, -1).await?;
        Ok(raw
            .iter()
            .filter_map(|text| match decode(text) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(symbol, error = %e, "Skipping undecodable log entry");
                    None
                }
            })
            .collect())
    }

    pub async fn len(&self, symbol: &str, stream: LogStream) -> Result<u64> {
        self.store.zcard(&stream.key(symbol)).await
    }
}

#[cfg(test)]
mod tests {
    use store::MemoryStore;

    use super::*;

    fn snapshot(time: i64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            time,
            close: 100.0,
            rsi: Some(55.0),
            macd: None,
            bollinger: None,
            ema: None,
            stochastic: None,
            vwap: Some(99.5),
        }
    }

    #[tokio::test]
    async fn indicator_log_keeps_the_newest_snapshots() {
        let store = Arc::new(MemoryStore::default());
        let log = EventLog::new(store.clone(), LogCaps { indicators: 3, ..LogCaps::default() });
        for t in 1..=5 {
            log.append_indicators("BTCUSDT", &snapshot(t)).await.unwrap();
        }

        assert_eq!(store.zcard("indicators:BTCUSDT").await.unwrap(), 3);
        let times: Vec<i64> = log.recent_indicators("BTCUSDT", 10).await.unwrap().iter().map(|s| s.time).collect();
        assert_eq!(times, vec![3, 4, 5]);
        assert_eq!(log.recent_indicators("BTCUSDT", 1).await.unwrap(), vec![snapshot(5)]);
        assert_eq!(log.len("BTCUSDT", LogStream::Signals).await.unwrap(), 0);
    }

    #[test]
    fn default_indicator_cap_is_180() {
        assert_eq!(LogCaps::default().for_stream(LogStream::Indicators), 180);
        assert_eq!(LogStream::Indicators.key("ETHUSDT"), "indicators:ETHUSDT");
    }
}
