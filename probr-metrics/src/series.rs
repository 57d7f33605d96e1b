use std::sync::Arc;
use std::time::Duration;

use crate::kind::OutcomeKind;

const KINDS: usize = OutcomeKind::ALL.len();

/// Per-tag accumulator: outcome counters plus the raw latency samples.
///
/// Samples are kept unsorted while recording; sorting happens once per snapshot.
#[derive(Debug, Default, Clone)]
pub struct MetricSeries {
    by_kind: [u64; KINDS],
    latencies: Vec<Duration>,
}

impl MetricSeries {
    pub fn record(&mut self, kind: OutcomeKind, latency: Duration) {
        let slot = &mut self.by_kind[kind.index()];
        *slot = slot.saturating_add(1);

        if kind.has_latency() {
            self.latencies.push(latency);
        }
    }

    pub fn total(&self) -> u64 {
        self.by_kind.iter().sum()
    }

    pub fn summarize(&self) -> SeriesSummary {
        SeriesSummary::merge([self])
    }
}

/// Immutable, sorted view of one or more [`MetricSeries`].
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSummary {
    by_kind: [u64; KINDS],
    latencies: Arc<[Duration]>,
}

impl Default for SeriesSummary {
    fn default() -> Self {
        Self {
            by_kind: [0; KINDS],
            latencies: Arc::from(Vec::new()),
        }
    }
}

impl SeriesSummary {
    pub fn merge<'a>(series: impl IntoIterator<Item = &'a MetricSeries>) -> Self {
        let mut by_kind = [0u64; KINDS];
        let mut latencies = Vec::new();

        for s in series {
            for (acc, v) in by_kind.iter_mut().zip(s.by_kind.iter()) {
                *acc = acc.saturating_add(*v);
            }
            latencies.extend_from_slice(&s.latencies);
        }

        latencies.sort_unstable();

        Self {
            by_kind,
            latencies: Arc::from(latencies),
        }
    }

    pub fn total(&self) -> u64 {
        self.by_kind.iter().sum()
    }

    pub fn count(&self, kind: OutcomeKind) -> u64 {
        self.by_kind[kind.index()]
    }

    pub fn failed(&self) -> u64 {
        self.total()
            .saturating_sub(self.count(OutcomeKind::Success))
    }

    /// `failed / total`, or `0.0` when nothing was recorded.
    pub fn error_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.failed() as f64 / total as f64
    }

    /// Number of latency samples (outcomes that carried a measured round trip).
    pub fn sample_count(&self) -> usize {
        self.latencies.len()
    }

    /// Sorted latency samples.
    pub fn latencies(&self) -> &[Duration] {
        &self.latencies
    }

    /// Exact nearest-rank percentile: the smallest sample such that at least `p`% of the
    /// samples are less than or equal to it.
    pub fn percentile(&self, p: f64) -> Option<Duration> {
        let n = self.latencies.len();
        if n == 0 || !p.is_finite() {
            return None;
        }

        let p = p.clamp(0.0, 100.0);
        // The epsilon keeps exact ranks (e.g. 95% of 20) from rounding up to the next sample.
        let rank = ((p * n as f64) / 100.0 - 1e-9).ceil() as usize;
        let rank = rank.clamp(1, n);

        self.latencies.get(rank - 1).copied()
    }

    pub fn min(&self) -> Option<Duration> {
        self.latencies.first().copied()
    }

    pub fn max(&self) -> Option<Duration> {
        self.latencies.last().copied()
    }

    pub fn mean(&self) -> Option<Duration> {
        let n = self.latencies.len();
        if n == 0 {
            return None;
        }

        let sum: u128 = self.latencies.iter().map(Duration::as_nanos).sum();
        let mean = sum / n as u128;
        Some(Duration::from_nanos(mean.min(u64::MAX as u128) as u64))
    }
}
