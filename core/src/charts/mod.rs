//! Chart identities, typed visual configs and the visual registry.

pub mod config;
mod key;
mod registry;
mod sparkline;

pub use config::{BuiltChart, ChartConfig, ElementMap, FilterTarget, Notice, SeriesPatch};
pub use key::ChartKey;
pub use registry::{ChartSink, ChartSinkFactory, ChartSinkRegistry};
pub use sparkline::SparklineSet;
