use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use common::{now_ms, Store};

use crate::exits;
use crate::position::{ExitReason, Position};
use crate::prices::PriceSource;

/// What one checkpoint did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Checkpoint {
    /// No exit; a PnL snapshot was recorded.
    Recorded { pnl: f64 },
    /// An exit condition fired and the position is now closed.
    Exited(ExitReason),
    /// No price was available; evaluation deferred to the next checkpoint.
    NoPrice,
    /// The position was already closed; nothing happened.
    Closed,
}

/// Sole owner of one open position until it closes.
pub struct PositionMonitor {
    position: Position,
    prices: Arc<dyn PriceSource>,
    store: Arc<dyn Store>,
    /// Delay in seconds before each checkpoint.
    schedule: Vec<u64>,
    last_price: Option<f64>,
}

impl PositionMonitor {
    pub fn new(position: Position, prices: Arc<dyn PriceSource>, store: Arc<dyn Store>, schedule: Vec<u64>) -> Self {
        Self { position, prices, store, schedule, last_price: None }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Evaluate exits at `elapsed_secs` since open.
    pub async fn checkpoint(&mut self, elapsed_secs: u64) -> Checkpoint {
        if !self.position.is_open() {
            return Checkpoint::Closed;
        }
        let id = self.position.id.clone();

        let price = match self.prices.current_price(&self.position.symbol).await {
            Ok(Some(price)) => price,
            Ok(None) => {
                warn!(position = %id, elapsed_secs, "No price available, deferring checkpoint");
                return Checkpoint::NoPrice;
            }
            Err(e) => {
                warn!(position = %id, elapsed_secs, error = %e, "Price lookup failed, deferring checkpoint");
                return Checkpoint::NoPrice;
            }
        };
        self.last_price = Some(price);

        if let Some(reason) = exits::evaluate(&self.position, price) {
            self.close(reason).await;
            return Checkpoint::Exited(reason);
        }

        self.position.record_pnl(elapsed_secs, price);
        let pnl = self.position.pnl_at(price);
        debug!(position = %id, elapsed_secs, price, pnl, "Checkpoint recorded");
        self.persist().await;
        Checkpoint::Recorded { pnl }
    }

    /// Walk the checkpoint schedule until an exit fires, the schedule runs
    /// out (timeout) or `token` is cancelled (shutdown). Returns the final record.
    pub async fn run(mut self, token: CancellationToken) -> Position {
        let mut elapsed = 0;
        let schedule = self.schedule.clone();
        for delay in schedule {
            tokio::select! {
                _ = token.cancelled() => {
                    self.close(ExitReason::Shutdown).await;
                    return self.position;
                }
                _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
            }
            elapsed += delay;
            if let Checkpoint::Exited(_) = self.checkpoint(elapsed).await {
                return self.position;
            }
        }
        self.close(ExitReason::Timeout).await;
        self.position
    }

    async fn close(&mut self, reason: ExitReason) {
        if !self.position.close(reason, self.last_price, now_ms()) {
            return;
        }
        info!(
            position = %self.position.id,
            symbol = %self.position.symbol,
            side = %self.position.side,
            reason = %reason,
            close_price = ?self.position.close_price,
            pnl = ?self.position.realized_pnl,
            "Position closed"
        );
        self.persist().await;
    }

    async fn persist(&self) {
        if let Err(e) = self.position.save(self.store.as_ref()).await {
            warn!(position = %self.position.id, error = %e, "Failed to persist position");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use common::{Result, Side, TradeIntent};
    use store::MemoryStore;

    use super::*;
    use crate::position::PositionStatus;

    /// Hands out a fixed sequence of prices, then `None`.
    struct Scripted(Mutex<VecDeque<Option<f64>>>);

    impl Scripted {
        fn new(prices: &[Option<f64>]) -> Arc<Self> {
            Arc::new(Self(Mutex::new(prices.iter().copied().collect())))
        }
    }

    #[async_trait]
    impl PriceSource for Scripted {
        async fn current_price(&self, _symbol: &str) -> Result<Option<f64>> {
            Ok(self.0.lock().unwrap().pop_front().flatten())
        }
    }

    fn monitor(side: Side, leverage: f64, sl: Option<f64>, tp: Option<f64>, prices: &[Option<f64>]) -> PositionMonitor {
        let intent = TradeIntent {
            strategy_name: "s".into(),
            symbol: "BTCUSDT".into(),
            side,
            leverage,
            notional_usd: 100.0,
            stop_loss: sl,
            take_profit: tp,
        };
        let position = Position::open("s:abcd1234".into(), &intent, 100.0, 0);
        PositionMonitor::new(position, Scripted::new(prices), Arc::new(MemoryStore::default()), vec![10, 10, 10])
    }

    #[tokio::test]
    async fn stop_loss_closes_and_stops_recording() {
        let mut m = monitor(Side::Long, 1.0, Some(95.0), Some(110.0), &[Some(94.0), Some(120.0)]);
        assert_eq!(m.checkpoint(10).await, Checkpoint::Exited(ExitReason::StopLoss));
        assert_eq!(m.checkpoint(20).await, Checkpoint::Closed);

        let p = m.position();
        assert_eq!(p.status, PositionStatus::ClosedStoploss);
        assert!(p.pnl_snapshots.is_empty());
        assert_eq!(p.liquidity_snapshots.len(), 1);
        assert_eq!(p.liquidity_snapshots[0].price, 94.0);
    }

    #[tokio::test]
    async fn stop_loss_wins_when_liquidation_also_hits() {
        // long 10x: liquidation at 90, stop at 95, price gaps to 89
        let mut m = monitor(Side::Long, 10.0, Some(95.0), None, &[Some(89.0), Some(80.0)]);
        assert_eq!(m.checkpoint(10).await, Checkpoint::Exited(ExitReason::StopLoss));
        let first = Position::load(m.store.as_ref(), "s:abcd1234").await.unwrap().unwrap();

        assert_eq!(m.checkpoint(20).await, Checkpoint::Closed);
        let stored = Position::load(m.store.as_ref(), "s:abcd1234").await.unwrap().unwrap();
        assert_eq!(stored.status, PositionStatus::ClosedStoploss);
        assert_eq!(stored.exit, Some(ExitReason::StopLoss));
        assert_eq!(stored.close_price, Some(89.0));
        assert_eq!(stored.closed_at, first.closed_at);
        assert_eq!(stored.liquidity_snapshots.len(), 1);
        assert_eq!(stored.liquidity_snapshots[0].reason, ExitReason::StopLoss);
    }

    #[tokio::test]
    async fn short_liquidates_at_leverage_threshold() {
        let mut m = monitor(Side::Short, 10.0, None, None, &[Some(111.0)]);
        assert_eq!(m.checkpoint(10).await, Checkpoint::Exited(ExitReason::Liquidation));
        assert_eq!(m.position().status, PositionStatus::ClosedLiquidation);
    }

    #[tokio::test]
    async fn close_is_persisted() {
        let mut m = monitor(Side::Long, 1.0, None, Some(0.05), &[Some(106.0)]);
        m.checkpoint(10).await;
        let stored = Position::load(m.store.as_ref(), "s:abcd1234").await.unwrap().unwrap();
        assert_eq!(stored.status, PositionStatus::ClosedTakeprofit);
        assert_eq!(stored.exit, Some(ExitReason::TakeProfit));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_price_leaves_gap_then_times_out_at_last_price() {
        let m = monitor(Side::Long, 1.0, None, None, &[Some(101.0), None, Some(102.0)]);
        let p = m.run(CancellationToken::new()).await;

        let elapsed: Vec<u64> = p.pnl_snapshots.iter().map(|s| s.elapsed_secs).collect();
        assert_eq!(elapsed, vec![10, 30]);
        assert_eq!(p.status, PositionStatus::ClosedTimeout);
        assert_eq!(p.close_price, Some(102.0));
        assert!(p.liquidity_snapshots.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_marks_shutdown() {
        let m = monitor(Side::Long, 1.0, None, None, &[Some(101.0)]);
        let token = CancellationToken::new();
        let handle = tokio::spawn(m.run(token.clone()));
        tokio::time::sleep(Duration::from_secs(15)).await;
        token.cancel();

        let p = handle.await.unwrap();
        assert_eq!(p.status, PositionStatus::ClosedShutdown);
        assert_eq!(p.pnl_snapshots.len(), 1);
        assert_eq!(p.close_price, Some(101.0));
    }
}
