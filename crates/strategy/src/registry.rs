use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use common::{Error, MarketEvent, Result, TradeIntent};
use publisher::Subscription;

use crate::activation::ActivationRegistry;
use crate::condition::ConditionStrategy;
use crate::config::StrategyFileConfig;
use crate::Strategy;

/// Holds all strategy instances and dispatches market events to them.
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn Strategy>>,
    activation: ActivationRegistry,
}

impl StrategyRegistry {
    pub fn new(activation: ActivationRegistry) -> Self {
        Self { strategies: Vec::new(), activation }
    }

    /// Build from a config file; each strategy's `active` flag seeds `activation`.
    pub fn from_config(file_cfg: &StrategyFileConfig, activation: ActivationRegistry) -> Self {
        let mut registry = Self::new(activation);
        for cfg in &file_cfg.strategies {
            let active = cfg.active;
            let name = cfg.name.clone();
            registry.register(Box::new(ConditionStrategy::new(cfg.clone())));
            if active {
                registry.activation.activate(&name);
            } else {
                registry.activation.deactivate(&name);
            }
        }
        registry
    }

    pub fn register(&mut self, strategy: Box<dyn Strategy>) {
        info!(name = %strategy.name(), symbol = %strategy.symbol(), "Registered strategy");
        self.strategies.push(strategy);
    }

    pub fn activation(&self) -> &ActivationRegistry {
        &self.activation
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Intents from every active strategy watching the event's symbol.
    pub fn process(&self, event: &MarketEvent) -> Vec<TradeIntent> {
        self.strategies
            .iter()
            .filter(|s| s.symbol() == event.symbol)
            .filter(|s| self.activation.is_active(s.name()))
            .filter_map(|s| s.evaluate(event))
            .collect()
    }

    /// Dispatch events from `events` until cancelled, forwarding intents to
    /// the trade engine.
    pub async fn run(
        &self,
        mut events: Subscription,
        intents: mpsc::Sender<TradeIntent>,
        token: CancellationToken,
    ) -> Result<()> {
        info!(strategies = self.strategies.len(), "Strategy pool running");
        loop {
            let event = tokio::select! {
                _ = token.cancelled() => {
                    info!("Strategy pool stopping");
                    return Ok(());
                }
                event = events.recv() => event,
            };
            let Some(event) = event else {
                return Err(Error::Other("event bus closed".into()));
            };
            for intent in self.process(&event) {
                info!(strategy = %intent.strategy_name, side = %intent.side, kind = %event.kind(), "Strategy emitted intent");
                if intents.send(intent).await.is_err() {
                    warn!("Intent channel closed, stopping strategy pool");
                    return Err(Error::Other("intent channel closed".into()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use common::{EventDetail, EventKind};
    use publisher::EventBus;

    use super::*;

    const FILE: &str = r#"
        [[strategy]]
        name = "dip"
        symbol = "BTCUSDT"
        side = "LONG"
        leverage = 3.0
        notional_usd = 100.0
        [strategy.when]
        kinds = ["MASS_SELL"]

        [[strategy]]
        name = "eth-dip"
        symbol = "ETHUSDT"
        side = "LONG"
        leverage = 3.0
        notional_usd = 100.0
        [strategy.when]
        kinds = ["MASS_SELL"]

        [[strategy]]
        name = "sleeper"
        symbol = "BTCUSDT"
        active = false
        side = "SHORT"
        leverage = 3.0
        notional_usd = 100.0
        [strategy.when]
        kinds = ["MASS_SELL"]
    "#;

    fn mass_sell() -> MarketEvent {
        MarketEvent {
            symbol: "BTCUSDT".into(),
            price: 100.0,
            volume: 40.0,
            timestamp: 1,
            percentage: 80.0,
            window: None,
            detail: EventDetail::MassSell { threshold: 70.0, surge: 4.0 },
        }
    }

    fn registry() -> StrategyRegistry {
        let file = StrategyFileConfig::parse(FILE).unwrap();
        StrategyRegistry::from_config(&file, ActivationRegistry::new())
    }

    #[test]
    fn only_active_strategies_on_the_symbol_fire() {
        let registry = registry();
        assert_eq!(registry.len(), 3);
        let intents = registry.process(&mass_sell());
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].strategy_name, "dip");
    }

    #[test]
    fn activation_flags_apply_at_runtime() {
        let registry = registry();
        let flags = registry.activation().clone();
        flags.activate("sleeper");
        flags.deactivate("dip");
        let names: Vec<String> = registry.process(&mass_sell()).into_iter().map(|i| i.strategy_name).collect();
        assert_eq!(names, vec!["sleeper"]);
        assert_eq!(mass_sell().kind(), EventKind::MassSell);
    }

    #[tokio::test]
    async fn run_forwards_intents_until_cancelled() {
        let registry = std::sync::Arc::new(registry());
        let bus = EventBus::new(16);
        let (tx, mut rx) = mpsc::channel(4);
        let token = CancellationToken::new();

        let sub = bus.subscribe();
        let pool = registry.clone();
        let stop = token.clone();
        let task = tokio::spawn(async move { pool.run(sub, tx, stop).await });

        bus.publish(&mass_sell());
        let intent = rx.recv().await.unwrap();
        assert_eq!(intent.strategy_name, "dip");

        token.cancel();
        assert!(task.await.unwrap().is_ok());
    }
}
