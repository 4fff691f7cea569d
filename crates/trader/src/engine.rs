use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use common::{now_ms, Result, Store, TradeIntent};

use crate::monitor::PositionMonitor;
use crate::position::{ExitReason, Position};
use crate::prices::PriceSource;

enum Slot {
    /// Reserved while the entry price is fetched.
    Pending,
    Running(JoinHandle<Position>),
}

struct EngineInner {
    store: Arc<dyn Store>,
    prices: Arc<dyn PriceSource>,
    schedule: Vec<u64>,
    /// Active positions by id. A strategy has at most one entry.
    active: Mutex<HashMap<String, Slot>>,
    /// Parent of every monitor's token; cancelled only by `shutdown`.
    token: CancellationToken,
}

/// Opens positions from trade intents and owns their monitoring loops.
///
/// Cloneable; every clone shares the same active set.
#[derive(Clone)]
pub struct TradeEngine {
    inner: Arc<EngineInner>,
}

impl TradeEngine {
    pub fn new(store: Arc<dyn Store>, prices: Arc<dyn PriceSource>, schedule: Vec<u64>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                prices,
                schedule,
                active: Mutex::new(HashMap::new()),
                token: CancellationToken::new(),
            }),
        }
    }

    /// Open a position for `intent` and start monitoring it.
    ///
    /// Returns `None` (and logs why) when the intent is invalid, the strategy
    /// already has an active position, no price is available or the engine
    /// is shutting down.
    pub async fn open(&self, intent: TradeIntent) -> Option<String> {
        if let Err(e) = intent.validate() {
            warn!(error = %e, "Rejecting trade intent");
            return None;
        }
        if self.inner.token.is_cancelled() {
            warn!(strategy = %intent.strategy_name, "Engine shutting down, intent ignored");
            return None;
        }

        let suffix = Uuid::new_v4().simple().to_string();
        let id = format!("{}:{}", intent.strategy_name, &suffix[..8]);

        {
            let mut active = self.active();
            let prefix = format!("{}:", intent.strategy_name);
            if let Some(existing) = active.keys().find(|k| k.starts_with(&prefix)) {
                info!(strategy = %intent.strategy_name, existing = %existing, "Strategy already has an active position");
                return None;
            }
            active.insert(id.clone(), Slot::Pending);
        }

        let entry_price = match self.inner.prices.current_price(&intent.symbol).await {
            Ok(Some(price)) => price,
            Ok(None) => {
                warn!(symbol = %intent.symbol, strategy = %intent.strategy_name, "No current price, intent dropped");
                self.active().remove(&id);
                return None;
            }
            Err(e) => {
                warn!(symbol = %intent.symbol, error = %e, "Price lookup failed, intent dropped");
                self.active().remove(&id);
                return None;
            }
        };

        let position = Position::open(id.clone(), &intent, entry_price, now_ms());
        if self.inner.token.is_cancelled() {
            self.active().remove(&id);
            return None;
        }
        if let Err(e) = position.save(self.inner.store.as_ref()).await {
            warn!(position = %id, error = %e, "Failed to persist opened position");
        }
        info!(
            position = %id,
            symbol = %position.symbol,
            side = %position.side,
            entry_price,
            quantity = position.quantity,
            leverage = position.leverage,
            stop_loss = ?position.stop_loss,
            take_profit = ?position.take_profit,
            "Position opened"
        );

        // Hold the lock across spawn so the task cannot remove its slot first,
        // and so `shutdown` either drains the running slot or has already cancelled.
        let stranded = {
            let mut active = self.active();
            if self.inner.token.is_cancelled() {
                active.remove(&id);
                Some(position)
            } else {
                let monitor = PositionMonitor::new(
                    position,
                    self.inner.prices.clone(),
                    self.inner.store.clone(),
                    self.inner.schedule.clone(),
                );
                let token = self.inner.token.child_token();
                let inner = self.inner.clone();
                let handle = tokio::spawn(async move {
                    let position = monitor.run(token).await;
                    lock(&inner.active).remove(&position.id);
                    position
                });
                active.insert(id.clone(), Slot::Running(handle));
                None
            }
        };

        if let Some(mut position) = stranded {
            position.close(ExitReason::Shutdown, Some(entry_price), now_ms());
            if let Err(e) = position.save(self.inner.store.as_ref()).await {
                warn!(position = %id, error = %e, "Failed to persist position closed at shutdown");
            }
            info!(position = %id, "Engine shut down while opening, position closed");
            return None;
        }
        Some(id)
    }

    /// Consume intents until cancelled. Monitors keep running when this
    /// returns; stop them with `shutdown`.
    pub async fn run(&self, intents: &mut mpsc::Receiver<TradeIntent>, token: CancellationToken) -> Result<()> {
        info!("Trade engine accepting intents");
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Trade engine stopped accepting intents");
                    return Ok(());
                }
                intent = intents.recv() => match intent {
                    Some(intent) => {
                        self.open(intent).await;
                    }
                    None => {
                        warn!("Intent channel closed");
                        return Ok(());
                    }
                },
            }
        }
    }

    /// Cancel every monitoring loop and wait for each to persist its final
    /// state. Returns the closed records.
    pub async fn shutdown(&self) -> Vec<Position> {
        self.inner.token.cancel();
        let handles: Vec<JoinHandle<Position>> = self
            .active()
            .drain()
            .filter_map(|(_, slot)| match slot {
                Slot::Running(handle) => Some(handle),
                Slot::Pending => None,
            })
            .collect();

        info!(monitors = handles.len(), "Shutting down position monitors");
        let mut closed = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(position) => closed.push(position),
                Err(e) => error!(error = %e, "Position monitor task failed"),
            }
        }
        closed
    }

    pub fn active_count(&self) -> usize {
        self.active().len()
    }

    fn active(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        lock(&self.inner.active)
    }
}

fn lock(active: &Mutex<HashMap<String, Slot>>) -> MutexGuard<'_, HashMap<String, Slot>> {
    active.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use common::Side;
    use store::MemoryStore;

    use super::*;
    use crate::position::PositionStatus;
    use crate::prices::StorePrices;

    /// Memory store whose position writes take a second.
    #[derive(Default)]
    struct SlowTrades {
        inner: MemoryStore,
        trade_keys: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Store for SlowTrades {
        async fn set(&self, key: &str, value: &str) -> Result<()> {
            if key.starts_with("trade:") {
                self.trade_keys.lock().unwrap().push(key.to_string());
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            self.inner.set(key, value).await
        }

        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<()> {
            self.inner.zadd(key, score, member).await
        }

        async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
            self.inner.zrange(key, start, stop).await
        }

        async fn zremrangebyrank(&self, key: &str, start: i64, stop: i64) -> Result<u64> {
            self.inner.zremrangebyrank(key, start, stop).await
        }

        async fn zcard(&self, key: &str) -> Result<u64> {
            self.inner.zcard(key).await
        }
    }

    fn engine() -> (TradeEngine, Arc<dyn Store>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::default());
        let prices = Arc::new(StorePrices::new(store.clone()));
        (TradeEngine::new(store.clone(), prices, vec![10; 16]), store)
    }

    fn intent(name: &str, side: Side, leverage: f64) -> TradeIntent {
        TradeIntent {
            strategy_name: name.into(),
            symbol: "BTCUSDT".into(),
            side,
            leverage,
            notional_usd: 100.0,
            stop_loss: None,
            take_profit: None,
        }
    }

    async fn wait_until_idle(engine: &TradeEngine) {
        while engine.active_count() > 0 {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn long_stop_loss_scenario() {
        let (engine, store) = engine();
        store.set("BTCUSDT:price", "100").await.unwrap();

        let long = TradeIntent { stop_loss: Some(95.0), take_profit: Some(110.0), ..intent("sl", Side::Long, 1.0) };
        let id = engine.open(long).await.unwrap();
        assert!(id.starts_with("sl:"));
        assert_eq!(id.len(), "sl:".len() + 8);

        store.set("BTCUSDT:price", "94").await.unwrap();
        wait_until_idle(&engine).await;

        let p = Position::load(store.as_ref(), &id).await.unwrap().unwrap();
        assert_eq!(p.quantity, 1.0);
        assert_eq!(p.status, PositionStatus::ClosedStoploss);
        assert_eq!(p.exit, Some(ExitReason::StopLoss));
        assert!(p.pnl_snapshots.is_empty());
        assert_eq!(p.liquidity_snapshots.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn one_active_position_per_strategy() {
        let (engine, store) = engine();
        store.set("BTCUSDT:price", "100").await.unwrap();

        assert!(engine.open(intent("dup", Side::Long, 1.0)).await.is_some());
        assert!(engine.open(intent("dup", Side::Short, 1.0)).await.is_none());
        // a name that merely shares a prefix is a different strategy
        assert!(engine.open(intent("du", Side::Long, 1.0)).await.is_some());
        assert_eq!(engine.active_count(), 2);

        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn missing_price_frees_the_slot() {
        let (engine, store) = engine();
        assert!(engine.open(intent("late", Side::Long, 1.0)).await.is_none());
        assert_eq!(engine.active_count(), 0);

        store.set("BTCUSDT:price", "100").await.unwrap();
        assert!(engine.open(intent("late", Side::Long, 1.0)).await.is_some());
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_exhaustion_times_out() {
        let (engine, store) = engine();
        store.set("BTCUSDT:price", "100").await.unwrap();
        let id = engine.open(intent("flat", Side::Long, 2.0)).await.unwrap();
        wait_until_idle(&engine).await;

        let p = Position::load(store.as_ref(), &id).await.unwrap().unwrap();
        assert_eq!(p.status, PositionStatus::ClosedTimeout);
        assert_eq!(p.pnl_snapshots.len(), 16);
        assert_eq!(p.pnl_snapshots.last().unwrap().elapsed_secs, 160);
        assert_eq!(p.realized_pnl, Some(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_open_positions() {
        let (engine, store) = engine();
        store.set("BTCUSDT:price", "100").await.unwrap();
        let id = engine.open(intent("hold", Side::Short, 5.0)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(25)).await;

        let closed = engine.shutdown().await;
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].status, PositionStatus::ClosedShutdown);
        assert_eq!(closed[0].pnl_snapshots.len(), 2);
        assert_eq!(engine.active_count(), 0);

        let stored = Position::load(store.as_ref(), &id).await.unwrap().unwrap();
        assert_eq!(stored.status, PositionStatus::ClosedShutdown);

        // no new positions after shutdown
        assert!(engine.open(intent("after", Side::Long, 1.0)).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_while_saving_settles_the_new_position() {
        let slow = Arc::new(SlowTrades::default());
        let store: Arc<dyn Store> = slow.clone();
        store.set("BTCUSDT:price", "100").await.unwrap();
        let prices = Arc::new(StorePrices::new(store.clone()));
        let engine = TradeEngine::new(store.clone(), prices, vec![10; 16]);

        let opener = engine.clone();
        let open = tokio::spawn(async move { opener.open(intent("race", Side::Long, 1.0)).await });
        tokio::time::sleep(Duration::from_millis(500)).await;

        let closed = engine.shutdown().await;
        assert!(closed.is_empty());
        assert_eq!(open.await.unwrap(), None);
        assert_eq!(engine.active_count(), 0);

        let key = slow.trade_keys.lock().unwrap().last().cloned().unwrap();
        let id = key.strip_prefix("trade:").unwrap();
        let stored = Position::load(store.as_ref(), id).await.unwrap().unwrap();
        assert_eq!(stored.status, PositionStatus::ClosedShutdown);
        assert_eq!(stored.exit, Some(ExitReason::Shutdown));
    }

    #[tokio::test(start_paused = true)]
    async fn run_opens_intents_from_channel() {
        let (engine, store) = engine();
        store.set("BTCUSDT:price", "100").await.unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let token = CancellationToken::new();

        let runner = engine.clone();
        let stop = token.clone();
        let task = tokio::spawn(async move { runner.run(&mut rx, stop).await });

        tx.send(intent("chan", Side::Long, 1.0)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(engine.active_count(), 1);

        token.cancel();
        task.await.unwrap().unwrap();
        // monitors outlive the intake loop
        assert_eq!(engine.active_count(), 1);
        engine.shutdown().await;
    }
}
