pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use store::{resolve_rank_range, Store};
pub use types::*;

/// Store key of the current traded price for `symbol`.
pub fn price_key(symbol: &str) -> String {
    format!("{}:price", symbol.to_uppercase())
}

/// Store key of a position record.
pub fn trade_key(position_id: &str) -> String {
    format!("trade:{position_id}")
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
