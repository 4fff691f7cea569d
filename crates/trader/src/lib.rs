//! Simulated trade lifecycle: intents become monitored positions that close
//! on stop-loss, take-profit, liquidation or schedule exhaustion.

pub mod engine;
pub mod exits;
pub mod monitor;
pub mod position;
pub mod prices;

pub use engine::TradeEngine;
pub use monitor::{Checkpoint, PositionMonitor};
pub use position::{ExitReason, LiquiditySnapshot, PnlSnapshot, Position, PositionStatus};
pub use prices::{PriceSource, StorePrices};
