use std::fmt;
use std::str::FromStr;

use crate::kind::OutcomeKind;
use crate::series::SeriesSummary;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricParseError {
    #[error("unknown metric `{0}`")]
    Unknown(String),

    #[error("invalid percentile in `{0}` (expected 0 < p <= 100)")]
    InvalidPercentile(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LatencyStat {
    Avg,
    Min,
    Med,
    Max,
    Percentile(f64),
}

/// A named, aggregated value that can be read from a [`SeriesSummary`].
///
/// Latency metrics are reported in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    RequestsTotal,
    FailedTotal,
    /// Dropped outcomes: one per target of every arrival the pool could not serve.
    DroppedTotal,
    /// Arrivals the pool could not serve. Globally this is read from the snapshot's
    /// arrival counter; a tag's series only knows its own dropped outcomes.
    DroppedArrivals,
    ErrorRate,
    Latency(LatencyStat),
}

impl Metric {
    /// Metrics always present in a snapshot's flat value map.
    pub const STANDARD: [Metric; 12] = [
        Metric::RequestsTotal,
        Metric::FailedTotal,
        Metric::DroppedTotal,
        Metric::DroppedArrivals,
        Metric::ErrorRate,
        Metric::Latency(LatencyStat::Avg),
        Metric::Latency(LatencyStat::Min),
        Metric::Latency(LatencyStat::Med),
        Metric::Latency(LatencyStat::Max),
        Metric::Latency(LatencyStat::Percentile(90.0)),
        Metric::Latency(LatencyStat::Percentile(95.0)),
        Metric::Latency(LatencyStat::Percentile(99.0)),
    ];

    /// Reads the metric from a summary. Empty series degrade to `0.0`.
    pub fn value(&self, s: &SeriesSummary) -> f64 {
        match self {
            Self::RequestsTotal => s.total() as f64,
            Self::FailedTotal => s.failed() as f64,
            Self::DroppedTotal | Self::DroppedArrivals => s.count(OutcomeKind::Dropped) as f64,
            Self::ErrorRate => s.error_rate(),
            Self::Latency(stat) => {
                let d = match stat {
                    LatencyStat::Avg => s.mean(),
                    LatencyStat::Min => s.min(),
                    LatencyStat::Med => s.percentile(50.0),
                    LatencyStat::Max => s.max(),
                    LatencyStat::Percentile(p) => s.percentile(*p),
                };
                d.map(|d| d.as_nanos() as f64 / 1e6).unwrap_or(0.0)
            }
        }
    }

    pub fn is_latency(&self) -> bool {
        matches!(self, Self::Latency(_))
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestsTotal => f.write_str("requests_total"),
            Self::FailedTotal => f.write_str("failed_total"),
            Self::DroppedTotal => f.write_str("dropped_total"),
            Self::DroppedArrivals => f.write_str("dropped_arrivals"),
            Self::ErrorRate => f.write_str("error_rate"),
            Self::Latency(LatencyStat::Avg) => f.write_str("latency_avg"),
            Self::Latency(LatencyStat::Min) => f.write_str("latency_min"),
            Self::Latency(LatencyStat::Med) => f.write_str("latency_med"),
            Self::Latency(LatencyStat::Max) => f.write_str("latency_max"),
            Self::Latency(LatencyStat::Percentile(p)) => {
                if p.fract() == 0.0 {
                    write!(f, "latency_p{}", *p as u64)
                } else {
                    write!(f, "latency_p({p})")
                }
            }
        }
    }
}

impl FromStr for Metric {
    type Err = MetricParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let s = raw.trim();
        let metric = match s {
            "requests_total" => Self::RequestsTotal,
            "failed_total" => Self::FailedTotal,
            "dropped_total" => Self::DroppedTotal,
            "dropped_arrivals" => Self::DroppedArrivals,
            "error_rate" => Self::ErrorRate,
            "latency_avg" => Self::Latency(LatencyStat::Avg),
            "latency_min" => Self::Latency(LatencyStat::Min),
            "latency_med" => Self::Latency(LatencyStat::Med),
            "latency_max" => Self::Latency(LatencyStat::Max),
            _ => {
                let Some(rest) = s.strip_prefix("latency_p") else {
                    return Err(MetricParseError::Unknown(raw.to_string()));
                };
                let inner = rest
                    .strip_prefix('(')
                    .and_then(|v| v.strip_suffix(')'))
                    .unwrap_or(rest);
                let p: f64 = inner
                    .parse()
                    .map_err(|_| MetricParseError::Unknown(raw.to_string()))?;
                if !p.is_finite() || p <= 0.0 || p > 100.0 {
                    return Err(MetricParseError::InvalidPercentile(raw.to_string()));
                }
                Self::Latency(LatencyStat::Percentile(p))
            }
        };
        Ok(metric)
    }
}
