//! Rolling time-window statistics over per-symbol sample streams.
//!
//! One generic [`IntervalAggregator`] serves every granularity; the
//! [`Metric`] parameter decides what a window summarises.

pub mod aggregator;
pub mod indicators;
pub mod metric;
pub mod window;

pub use aggregator::{AggregatorConfig, IntervalAggregator};
pub use indicators::{Candle, IndicatorCollector, IndicatorConfig, IndicatorSnapshot};
pub use metric::{Metric, PressureStat, PriceVariation, VariationStat, VolumePressure, VolumeTick};
pub use window::{Point, WindowSet, WindowSpec, WindowValue};
