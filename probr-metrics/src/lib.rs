pub mod agg;
pub mod kind;
pub mod metric;
pub mod registry;
pub mod series;
pub mod snapshot;

pub use kind::OutcomeKind;
pub use metric::{LatencyStat, Metric, MetricParseError};
pub use registry::Registry;
pub use series::{MetricSeries, SeriesSummary};
pub use snapshot::Snapshot;
