use serde::Deserialize;
use tracing::warn;

use common::{DepthSample, Error, Level, PriceSample, Result, Sample};

// ─── Binance JSON shapes ─────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(tag = "e")]
enum StreamMessage {
    #[serde(rename = "kline")]
    Kline { k: KlineData },
    #[serde(rename = "depthUpdate")]
    Depth(DepthData),
}

#[derive(Deserialize)]
struct KlineData {
    #[serde(rename = "s")]
    symbol: String,
    /// Candle open time.
    #[serde(rename = "t")]
    start_time_ms: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "V")]
    taker_buy_volume: String,
    #[serde(rename = "x")]
    is_closed: bool,
}

#[derive(Deserialize)]
struct DepthData {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "E")]
    event_time_ms: i64,
    #[serde(rename = "b")]
    bids: Vec<[String; 2]>,
    #[serde(rename = "a")]
    asks: Vec<[String; 2]>,
}

/// Decode one text frame. Frames that are not market data (subscription
/// acks and the like) and malformed frames yield `None`; the latter are logged.
pub fn decode(text: &str) -> Option<Sample> {
    match parse(text) {
        Ok(sample) => sample,
        Err(e) => {
            warn!(error = %e, "Dropping malformed feed message");
            None
        }
    }
}

/// Like [`decode`] but reports why a market-data frame was rejected.
pub fn parse(text: &str) -> Result<Option<Sample>> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    match value.get("e").and_then(|v| v.as_str()) {
        Some("kline") | Some("depthUpdate") => {}
        _ => return Ok(None),
    }

    let sample = match serde_json::from_value::<StreamMessage>(value)? {
        StreamMessage::Kline { k } => Sample::Price(PriceSample {
            symbol: k.symbol,
            open: number("o", &k.open)?,
            high: number("h", &k.high)?,
            low: number("l", &k.low)?,
            price: number("c", &k.close)?,
            volume: number("v", &k.volume)?,
            taker_buy_volume: number("V", &k.taker_buy_volume)?,
            timestamp: k.start_time_ms,
            is_closed: k.is_closed,
        }),
        StreamMessage::Depth(d) => Sample::Depth(DepthSample {
            symbol: d.symbol,
            bids: levels(&d.bids)?,
            asks: levels(&d.asks)?,
            timestamp: d.event_time_ms,
        }),
    };
    sample.validate()?;
    Ok(Some(sample))
}

fn number(field: &str, raw: &str) -> Result<f64> {
    raw.parse()
        .map_err(|_| Error::InvalidSample(format!("{field} = '{raw}'")))
}

fn levels(raw: &[[String; 2]]) -> Result<Vec<Level>> {
    raw.iter()
        .map(|[price, qty]| Ok((number("price", price)?, number("qty", qty)?)))
        .collect()
}
