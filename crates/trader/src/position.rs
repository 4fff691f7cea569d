use serde::{Deserialize, Serialize};

use common::{trade_key, Result, Side, Store, TradeIntent};

use crate::exits;

/// Lifecycle state of a position. Nothing leaves a `Closed*` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    ClosedStoploss,
    ClosedTakeprofit,
    ClosedLiquidation,
    ClosedTimeout,
    /// Monitoring was cancelled by process shutdown.
    ClosedShutdown,
}

/// Why a position closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Liquidation,
    Timeout,
    Shutdown,
}

impl ExitReason {
    pub fn status(self) -> PositionStatus {
        match self {
            ExitReason::StopLoss => PositionStatus::ClosedStoploss,
            ExitReason::TakeProfit => PositionStatus::ClosedTakeprofit,
            ExitReason::Liquidation => PositionStatus::ClosedLiquidation,
            ExitReason::Timeout => PositionStatus::ClosedTimeout,
            ExitReason::Shutdown => PositionStatus::ClosedShutdown,
        }
    }

    /// Price-triggered exits; these leave a liquidity snapshot.
    pub fn is_trigger(self) -> bool {
        matches!(self, ExitReason::StopLoss | ExitReason::TakeProfit | ExitReason::Liquidation)
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "stopLoss",
            ExitReason::TakeProfit => "takeProfit",
            ExitReason::Liquidation => "liquidation",
            ExitReason::Timeout => "timeout",
            ExitReason::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlSnapshot {
    pub elapsed_secs: u64,
    pub pnl: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquiditySnapshot {
    pub timestamp: i64,
    pub price: f64,
    pub reason: ExitReason,
}

/// A simulated leveraged position and its monitoring history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: String,
    pub strategy_name: String,
    pub symbol: String,
    pub side: Side,
    pub leverage: f64,
    pub notional_usd: f64,
    pub entry_price: f64,
    pub quantity: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub status: PositionStatus,
    pub opened_at: i64,
    pub closed_at: Option<i64>,
    pub close_price: Option<f64>,
    pub realized_pnl: Option<f64>,
    pub exit: Option<ExitReason>,
    pub pnl_snapshots: Vec<PnlSnapshot>,
    pub liquidity_snapshots: Vec<LiquiditySnapshot>,
}

impl Position {
    /// Open at `entry_price`, resolving relative stop-loss / take-profit levels.
    pub fn open(id: String, intent: &TradeIntent, entry_price: f64, opened_at: i64) -> Self {
        let side = intent.side;
        Self {
            id,
            strategy_name: intent.strategy_name.clone(),
            symbol: intent.symbol.clone(),
            side,
            leverage: intent.leverage,
            notional_usd: intent.notional_usd,
            entry_price,
            quantity: exits::quantity_for(intent.notional_usd, entry_price),
            stop_loss: intent.stop_loss.map(|l| exits::resolve_stop_loss(l, entry_price, side)),
            take_profit: intent.take_profit.map(|l| exits::resolve_take_profit(l, entry_price, side)),
            status: PositionStatus::Open,
            opened_at,
            closed_at: None,
            close_price: None,
            realized_pnl: None,
            exit: None,
            pnl_snapshots: Vec::new(),
            liquidity_snapshots: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// PnL if the position were closed at `price`.
    pub fn pnl_at(&self, price: f64) -> f64 {
        exits::pnl(self.side, self.entry_price, price, self.quantity, self.leverage)
    }

    /// Append a PnL snapshot. No-op once closed.
    pub fn record_pnl(&mut self, elapsed_secs: u64, price: f64) -> bool {
        if !self.is_open() {
            return false;
        }
        self.pnl_snapshots.push(PnlSnapshot { elapsed_secs, pnl: self.pnl_at(price) });
        true
    }

    /// Close with `reason`. Returns `false` and changes nothing if already closed.
    pub fn close(&mut self, reason: ExitReason, price: Option<f64>, at: i64) -> bool {
        if !self.is_open() {
            return false;
        }
        self.status = reason.status();
        self.exit = Some(reason);
        self.closed_at = Some(at);
        self.close_price = price;
        self.realized_pnl = price.map(|p| self.pnl_at(p));
        if let (true, Some(price)) = (reason.is_trigger(), price) {
            self.liquidity_snapshots.push(LiquiditySnapshot { timestamp: at, price, reason });
        }
        true
    }

    pub async fn save(&self, store: &dyn Store) -> Result<()> {
        store.set(&trade_key(&self.id), &serde_json::to_string(self)?).await
    }

    pub async fn load(store: &dyn Store, id: &str) -> Result<Option<Position>> {
        match store.get(&trade_key(id)).await? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }
}
