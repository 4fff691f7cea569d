//! Pure exit-rule arithmetic shared by the engine and the monitor.

use common::Side;

use crate::position::{ExitReason, Position};

/// `notional / price` rounded to 8 decimals.
pub fn quantity_for(notional_usd: f64, price: f64) -> f64 {
    (notional_usd / price * 1e8).round() / 1e8
}

/// Levels below 1 are fractions of `entry`; anything else is a price.
pub fn resolve_stop_loss(level: f64, entry: f64, side: Side) -> f64 {
    if level >= 1.0 {
        return level;
    }
    match side {
        Side::Long => entry * (1.0 - level),
        Side::Short => entry * (1.0 + level),
    }
}

pub fn resolve_take_profit(level: f64, entry: f64, side: Side) -> f64 {
    if level >= 1.0 {
        return level;
    }
    match side {
        Side::Long => entry * (1.0 + level),
        Side::Short => entry * (1.0 - level),
    }
}

/// Price at which the adverse move reaches `1 / leverage` of entry.
pub fn liquidation_price(entry: f64, side: Side, leverage: f64) -> f64 {
    match side {
        Side::Long => entry * (1.0 - 1.0 / leverage),
        Side::Short => entry * (1.0 + 1.0 / leverage),
    }
}

pub fn pnl(side: Side, entry: f64, price: f64, quantity: f64, leverage: f64) -> f64 {
    let raw = (price - entry) * quantity * leverage;
    match side {
        Side::Long => raw,
        Side::Short => -raw,
    }
}

/// First exit condition met at `price`, checked as stop-loss, take-profit,
/// then liquidation.
pub fn evaluate(position: &Position, price: f64) -> Option<ExitReason> {
    let side = position.side;
    let against = |level: f64| match side {
        Side::Long => price <= level,
        Side::Short => price >= level,
    };
    let towards = |level: f64| match side {
        Side::Long => price >= level,
        Side::Short => price <= level,
    };

    if position.stop_loss.is_some_and(against) {
        return Some(ExitReason::StopLoss);
    }
    if position.take_profit.is_some_and(towards) {
        return Some(ExitReason::TakeProfit);
    }
    if against(liquidation_price(position.entry_price, side, position.leverage)) {
        return Some(ExitReason::Liquidation);
    }
    None
}

#[cfg(test)]
mod tests {
    use common::TradeIntent;

    use super::*;

    fn position(side: Side, leverage: f64, stop_loss: Option<f64>, take_profit: Option<f64>) -> Position {
        let intent = TradeIntent {
            strategy_name: "t".into(),
            symbol: "BTCUSDT".into(),
            side,
            leverage,
            notional_usd: 100.0,
            stop_loss,
            take_profit,
        };
        Position::open("t:1".into(), &intent, 100.0, 0)
    }

    #[test]
    fn long_stop_loss_fires_below_level() {
        let p = position(Side::Long, 1.0, Some(95.0), Some(110.0));
        assert_eq!(evaluate(&p, 94.0), Some(ExitReason::StopLoss));
        assert_eq!(evaluate(&p, 100.0), None);
        assert_eq!(evaluate(&p, 110.0), Some(ExitReason::TakeProfit));
    }

    #[test]
    fn stop_loss_wins_over_liquidation() {
        // liquidation at 90, stop at 95; 89 satisfies both
        let p = position(Side::Long, 10.0, Some(95.0), None);
        assert_eq!(evaluate(&p, 89.0), Some(ExitReason::StopLoss));
    }

    #[test]
    fn short_liquidates_without_stop() {
        let p = position(Side::Short, 10.0, None, None);
        assert_eq!(evaluate(&p, 111.0), Some(ExitReason::Liquidation));
        assert_eq!(evaluate(&p, 105.0), None);
    }

    #[test]
    fn short_pnl_is_negated() {
        assert_eq!(pnl(Side::Short, 100.0, 90.0, 1.0, 2.0), 20.0);
        assert_eq!(pnl(Side::Long, 100.0, 90.0, 1.0, 2.0), -20.0);
    }

    #[test]
    fn quantity_rounds_to_eight_decimals() {
        assert_eq!(quantity_for(100.0, 3.0), 33.33333333);
    }
}
