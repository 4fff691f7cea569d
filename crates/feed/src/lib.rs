//! Binance market-data feed: kline and depth messages in, `Sample`s out.

pub mod decode;
pub mod stream;

pub use decode::decode;
pub use stream::{FeedConfig, FeedStream};
