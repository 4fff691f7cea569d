use tracing::debug;

use common::{MarketEvent, TradeIntent};

use crate::config::StrategyConfig;
use crate::Strategy;

/// Emits its configured intent whenever an event matches its trigger.
pub struct ConditionStrategy {
    cfg: StrategyConfig,
}

impl ConditionStrategy {
    pub fn new(cfg: StrategyConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.cfg
    }

    fn matches(&self, event: &MarketEvent) -> bool {
        let when = &self.cfg.when;
        if !when.kinds.contains(&event.kind()) {
            return false;
        }
        if !when.windows.is_empty() {
            match &event.window {
                Some(w) if when.windows.contains(w) => {}
                _ => return false,
            }
        }
        event.percentage.abs() >= when.min_percentage
    }
}

impl Strategy for ConditionStrategy {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn symbol(&self) -> &str {
        &self.cfg.symbol
    }

    fn evaluate(&self, event: &MarketEvent) -> Option<TradeIntent> {
        if !self.matches(event) {
            return None;
        }
        debug!(strategy = %self.cfg.name, kind = %event.kind(), percentage = event.percentage, "Trigger matched");
        Some(TradeIntent {
            strategy_name: self.cfg.name.clone(),
            symbol: self.cfg.symbol.clone(),
            side: self.cfg.side,
            leverage: self.cfg.leverage,
            notional_usd: self.cfg.notional_usd,
            stop_loss: self.cfg.stop_loss,
            take_profit: self.cfg.take_profit,
        })
    }
}

#[cfg(test)]
mod tests {
    use common::{EventDetail, EventKind, Side};

    use super::*;
    use crate::config::Trigger;

    fn config(name: &str, kinds: Vec<EventKind>, windows: &[&str], min: f64) -> StrategyConfig {
        StrategyConfig {
            name: name.into(),
            symbol: "BTCUSDT".into(),
            active: true,
            side: Side::Long,
            leverage: 5.0,
            notional_usd: 100.0,
            stop_loss: Some(0.02),
            take_profit: None,
            when: Trigger {
                kinds,
                windows: windows.iter().map(|w| w.to_string()).collect(),
                min_percentage: min,
            },
        }
    }

    fn drop_event(window: &str, percentage: f64) -> MarketEvent {
        MarketEvent {
            symbol: "BTCUSDT".into(),
            price: 95.0,
            volume: 0.0,
            timestamp: 1,
            percentage,
            window: Some(window.into()),
            detail: EventDetail::PriceDropSecond { start_price: 100.0, threshold: 4.0 },
        }
    }

    #[test]
    fn fires_on_matching_kind_window_and_size() {
        let s = ConditionStrategy::new(config("dip", vec![EventKind::PriceDropSecond], &["5s"], 4.0));
        let intent = s.evaluate(&drop_event("5s", -5.0)).unwrap();
        assert_eq!(intent.strategy_name, "dip");
        assert_eq!(intent.side, Side::Long);
        assert_eq!(intent.stop_loss, Some(0.02));
    }

    #[test]
    fn ignores_other_windows_kinds_and_small_moves() {
        let s = ConditionStrategy::new(config("dip", vec![EventKind::PriceDropSecond], &["5s"], 4.0));
        assert!(s.evaluate(&drop_event("3s", -5.0)).is_none());
        assert!(s.evaluate(&drop_event("5s", -3.0)).is_none());
        assert!(s.evaluate(&MarketEvent::price_update("BTCUSDT", 1.0, 1.0, 1)).is_none());
    }

    #[test]
    fn empty_window_list_matches_unwindowed_events() {
        let s = ConditionStrategy::new(config("any", vec![EventKind::PriceUpdate], &[], 0.0));
        assert!(s.evaluate(&MarketEvent::price_update("BTCUSDT", 1.0, 1.0, 1)).is_some());
    }
}
