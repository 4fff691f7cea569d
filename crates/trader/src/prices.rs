use std::sync::Arc;

use async_trait::async_trait;

use common::{price_key, Error, Result, Store};

/// Where the monitoring loop reads the current price of a symbol.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// `Ok(None)` when no usable price is known yet.
    async fn current_price(&self, symbol: &str) -> Result<Option<f64>>;
}

/// Reads the `{SYMBOL}:price` key written by the analyzer.
pub struct StorePrices {
    store: Arc<dyn Store>,
}

impl StorePrices {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PriceSource for StorePrices {
    async fn current_price(&self, symbol: &str) -> Result<Option<f64>> {
        let Some(raw) = self.store.get(&price_key(symbol)).await? else {
            return Ok(None);
        };
        let price: f64 = raw
            .trim()
            .parse()
            .map_err(|_| Error::PriceUnavailable(format!("{symbol}: '{raw}'")))?;
        Ok((price.is_finite() && price > 0.0).then_some(price))
    }
}
