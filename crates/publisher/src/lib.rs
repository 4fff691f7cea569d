//! Market event derivation and distribution.
//!
//! [`MarketAnalyzer`] turns samples into [`common::MarketEvent`]s,
//! [`Publisher`] writes each one to its capped [`EventLog`] and fans it out
//! over the [`EventBus`].

pub mod analyzer;
pub mod bus;
pub mod log;
pub mod publisher;
pub mod rules;

pub use analyzer::{AnalyzerConfig, MarketAnalyzer, MarketSnapshot};
pub use bus::{Delivery, EventBus, Subscription};
pub use log::{EventLog, LogCaps, LogStream};
pub use publisher::Publisher;
pub use rules::{AnalysisRecord, DetectionConfig, Granularity, VariationThresholds};
