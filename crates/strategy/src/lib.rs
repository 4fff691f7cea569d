pub mod activation;
pub mod condition;
pub mod config;
pub mod registry;

pub use activation::ActivationRegistry;
pub use condition::ConditionStrategy;
pub use config::{StrategyConfig, StrategyFileConfig, Trigger};
pub use registry::StrategyRegistry;

use common::{MarketEvent, TradeIntent};

/// A decision module: a pure function from a market event to an optional
/// trade intent.
pub trait Strategy: Send + Sync {
    /// Unique name; becomes the prefix of every position it opens.
    fn name(&self) -> &str;

    /// The symbol this strategy watches (e.g. "BTCUSDT").
    fn symbol(&self) -> &str;

    /// Returns `None` when the event is not actionable.
    fn evaluate(&self, event: &MarketEvent) -> Option<TradeIntent>;
}
