use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One trade-stream tick for a symbol (a kline update).
/// Timestamps are epoch milliseconds throughout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    /// Latest close price of the current candle.
    pub price: f64,
    pub volume: f64,
    pub taker_buy_volume: f64,
    pub timestamp: i64,
    pub is_closed: bool,
}

impl PriceSample {
    pub fn buy_volume(&self) -> f64 {
        self.taker_buy_volume
    }

    /// Total volume minus taker buys. Never negative.
    pub fn sell_volume(&self) -> f64 {
        (self.volume - self.taker_buy_volume).max(0.0)
    }

    /// Share of taker buy volume in `[0, 1]`, `None` when the candle has no volume.
    pub fn buy_ratio(&self) -> Option<f64> {
        (self.volume > 0.0).then(|| (self.taker_buy_volume / self.volume).clamp(0.0, 1.0))
    }

    /// Relative close-over-open move, `None` when `open` is not positive.
    pub fn variance(&self) -> Option<f64> {
        (self.open > 0.0).then(|| (self.price - self.open) / self.open)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol.is_empty() {
            return Err(Error::InvalidSample("empty symbol".into()));
        }
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("price", self.price),
            ("volume", self.volume),
            ("taker_buy_volume", self.taker_buy_volume),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidSample(format!("{name} = {value}")));
            }
        }
        if self.price == 0.0 {
            return Err(Error::InvalidSample("price = 0".into()));
        }
        Ok(())
    }
}

/// A price level: `(price, quantity)`.
pub type Level = (f64, f64);

/// An order-book depth update for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthSample {
    pub symbol: String,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    pub timestamp: i64,
}

impl DepthSample {
    pub fn validate(&self) -> Result<()> {
        if self.symbol.is_empty() {
            return Err(Error::InvalidSample("empty symbol".into()));
        }
        let bad = self
            .bids
            .iter()
            .chain(self.asks.iter())
            .find(|(p, q)| !p.is_finite() || !q.is_finite() || *p < 0.0 || *q < 0.0);
        match bad {
            Some((p, q)) => Err(Error::InvalidSample(format!("depth level ({p}, {q})"))),
            None => Ok(()),
        }
    }
}

/// Anything the ingestor delivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Sample {
    Price(PriceSample),
    Depth(DepthSample),
}

impl Sample {
    pub fn symbol(&self) -> &str {
        match self {
            Sample::Price(s) => &s.symbol,
            Sample::Depth(s) => &s.symbol,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Sample::Price(s) => s.timestamp,
            Sample::Depth(s) => s.timestamp,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Sample::Price(s) => s.validate(),
            Sample::Depth(s) => s.validate(),
        }
    }
}

// ─── Market events ───────────────────────────────────────────────────────────

/// Discriminant of a `MarketEvent`, handy for matching and config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    PriceUpdate,
    Volume,
    MassBuy,
    MassSell,
    PriceJump,
    PriceDrop,
    PriceJumpSecond,
    PriceDropSecond,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::PriceUpdate => "PRICE_UPDATE",
            EventKind::Volume => "VOLUME",
            EventKind::MassBuy => "MASS_BUY",
            EventKind::MassSell => "MASS_SELL",
            EventKind::PriceJump => "PRICE_JUMP",
            EventKind::PriceDrop => "PRICE_DROP",
            EventKind::PriceJumpSecond => "PRICE_JUMP_SECOND",
            EventKind::PriceDropSecond => "PRICE_DROP_SECOND",
        };
        f.write_str(s)
    }
}

/// Kind-specific payload of a `MarketEvent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventDetail {
    PriceUpdate,
    #[serde(rename_all = "camelCase")]
    Volume { buy_volume: f64, sell_volume: f64 },
    #[serde(rename_all = "camelCase")]
    MassBuy { threshold: f64, surge: f64 },
    #[serde(rename_all = "camelCase")]
    MassSell { threshold: f64, surge: f64 },
    #[serde(rename_all = "camelCase")]
    PriceJump { start_price: f64, threshold: f64 },
    #[serde(rename_all = "camelCase")]
    PriceDrop { start_price: f64, threshold: f64 },
    #[serde(rename_all = "camelCase")]
    PriceJumpSecond { start_price: f64, threshold: f64 },
    #[serde(rename_all = "camelCase")]
    PriceDropSecond { start_price: f64, threshold: f64 },
}

impl EventDetail {
    pub fn kind(&self) -> EventKind {
        match self {
            EventDetail::PriceUpdate => EventKind::PriceUpdate,
            EventDetail::Volume { .. } => EventKind::Volume,
            EventDetail::MassBuy { .. } => EventKind::MassBuy,
            EventDetail::MassSell { .. } => EventKind::MassSell,
            EventDetail::PriceJump { .. } => EventKind::PriceJump,
            EventDetail::PriceDrop { .. } => EventKind::PriceDrop,
            EventDetail::PriceJumpSecond { .. } => EventKind::PriceJumpSecond,
            EventDetail::PriceDropSecond { .. } => EventKind::PriceDropSecond,
        }
    }

    fn numbers(&self) -> Vec<f64> {
        match self {
            EventDetail::PriceUpdate => vec![],
            EventDetail::Volume { buy_volume, sell_volume } => vec![*buy_volume, *sell_volume],
            EventDetail::MassBuy { threshold, surge } | EventDetail::MassSell { threshold, surge } => {
                vec![*threshold, *surge]
            }
            EventDetail::PriceJump { start_price, threshold }
            | EventDetail::PriceDrop { start_price, threshold }
            | EventDetail::PriceJumpSecond { start_price, threshold }
            | EventDetail::PriceDropSecond { start_price, threshold } => {
                vec![*start_price, *threshold]
            }
        }
    }
}

/// A derived market event. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketEvent {
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
    pub timestamp: i64,
    pub percentage: f64,
    /// Window name such as `5m` or `3s`; `None` for un-windowed events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
    #[serde(flatten)]
    pub detail: EventDetail,
}

impl MarketEvent {
    pub fn price_update(symbol: impl Into<String>, price: f64, volume: f64, timestamp: i64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            volume,
            timestamp,
            percentage: 0.0,
            window: None,
            detail: EventDetail::PriceUpdate,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.detail.kind()
    }

    /// Decode a payload received on the event topic and reject anything that
    /// would put non-finite numbers in front of a decision module.
    pub fn from_json(text: &str) -> Result<Self> {
        let event: MarketEvent = serde_json::from_str(text)?;
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol.is_empty() {
            return Err(Error::InvalidSample("event without symbol".into()));
        }
        let all_finite = [self.price, self.volume, self.percentage]
            .into_iter()
            .chain(self.detail.numbers())
            .all(f64::is_finite);
        if !all_finite {
            return Err(Error::InvalidSample(format!(
                "{} event for {} carries a non-finite value",
                self.kind(),
                self.symbol
            )));
        }
        Ok(())
    }
}

// ─── Trade intents ───────────────────────────────────────────────────────────

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    #[serde(alias = "BUY")]
    Long,
    #[serde(alias = "SELL")]
    Short,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Request from a decision module to open a monitored position.
///
/// `stop_loss` / `take_profit` below 1 are fractions of the entry price,
/// anything else is an absolute price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeIntent {
    #[serde(alias = "name")]
    pub strategy_name: String,
    pub symbol: String,
    pub side: Side,
    pub leverage: f64,
    #[serde(alias = "amountInUSD")]
    pub notional_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
}

impl TradeIntent {
    pub fn from_json(text: &str) -> Result<Self> {
        let intent: TradeIntent = serde_json::from_str(text)?;
        intent.validate()?;
        Ok(intent)
    }

    pub fn validate(&self) -> Result<()> {
        if self.strategy_name.is_empty() || self.strategy_name.contains(':') {
            return Err(Error::InvalidIntent(format!(
                "strategy name '{}' must be non-empty and contain no ':'",
                self.strategy_name
            )));
        }
        if self.symbol.is_empty() {
            return Err(Error::InvalidIntent("empty symbol".into()));
        }
        if !self.leverage.is_finite() || self.leverage <= 0.0 {
            return Err(Error::InvalidIntent(format!("leverage = {}", self.leverage)));
        }
        if !self.notional_usd.is_finite() || self.notional_usd <= 0.0 {
            return Err(Error::InvalidIntent(format!("notional = {}", self.notional_usd)));
        }
        for (name, level) in [("stop_loss", self.stop_loss), ("take_profit", self.take_profit)] {
            if let Some(v) = level {
                if !v.is_finite() || v <= 0.0 {
                    return Err(Error::InvalidIntent(format!("{name} = {v}")));
                }
            }
        }
        Ok(())
    }
}
