use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

use crate::kind::OutcomeKind;
use crate::series::{MetricSeries, SeriesSummary};
use crate::snapshot::Snapshot;

/// Owns every [`MetricSeries`] of a run, keyed by tag.
///
/// `record` may be called from many tasks at once; each tag's series is guarded by its
/// DashMap shard, so counters stay exact regardless of completion order.
#[derive(Debug, Default)]
pub struct Registry {
    series: DashMap<Arc<str>, MetricSeries, ahash::RandomState>,
    dropped_arrivals: AtomicU64,
}

impl Registry {
    pub fn record(&self, tag: &str, kind: OutcomeKind, latency: Duration) {
        if let Some(mut s) = self.series.get_mut(tag) {
            s.record(kind, latency);
            return;
        }

        self.series
            .entry(Arc::from(tag))
            .or_default()
            .record(kind, latency);
    }

    /// Counts one arrival rejected by an exhausted pool. Its per-target `Dropped` outcomes
    /// are recorded separately through [`Registry::record`].
    pub fn record_dropped_arrival(&self) {
        self.dropped_arrivals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tags(&self) -> Vec<String> {
        let mut out: Vec<String> = self.series.iter().map(|e| e.key().to_string()).collect();
        out.sort();
        out
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Total outcomes recorded across every tag.
    pub fn total(&self) -> u64 {
        self.series.iter().map(|e| e.value().total()).sum()
    }

    /// Sorted, point-in-time view of all series. Never fails; no data yields zeroed values.
    pub fn snapshot(&self) -> Snapshot {
        let mut cloned: Vec<(String, MetricSeries)> = self
            .series
            .iter()
            .map(|e| (e.key().to_string(), e.value().clone()))
            .collect();
        cloned.sort_by(|a, b| a.0.cmp(&b.0));

        let global = SeriesSummary::merge(cloned.iter().map(|(_, s)| s));
        let by_tag: BTreeMap<String, SeriesSummary> = cloned
            .into_iter()
            .map(|(tag, s)| {
                let summary = s.summarize();
                (tag, summary)
            })
            .collect();

        Snapshot::new(global, by_tag)
            .with_dropped_arrivals(self.dropped_arrivals.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Metric;

    #[test]
    fn series_are_created_lazily_per_tag() {
        let reg = Registry::default();
        assert!(reg.is_empty());

        reg.record("/healthz", OutcomeKind::Success, Duration::from_millis(5));
        reg.record("/measurements", OutcomeKind::ProtocolFailure, Duration::from_millis(7));
        reg.record("/healthz", OutcomeKind::Success, Duration::from_millis(9));

        assert_eq!(reg.tags(), vec!["/healthz".to_string(), "/measurements".to_string()]);
        assert_eq!(reg.total(), 3);
    }

    #[test]
    fn snapshot_has_global_and_per_tag_views() {
        let reg = Registry::default();
        reg.record("a", OutcomeKind::Success, Duration::from_millis(10));
        reg.record("b", OutcomeKind::TransportFailure, Duration::from_millis(30));
        reg.record("b", OutcomeKind::Dropped, Duration::ZERO);

        let snap = reg.snapshot();
        assert_eq!(snap.value(&Metric::RequestsTotal, None), Some(3.0));
        assert_eq!(snap.value(&Metric::ErrorRate, Some("a")), Some(0.0));
        assert_eq!(snap.value(&Metric::ErrorRate, Some("b")), Some(1.0));
        assert_eq!(snap.value(&Metric::DroppedTotal, None), Some(1.0));
        assert_eq!(snap.value(&Metric::DroppedArrivals, None), Some(0.0));
        assert_eq!(snap.value(&Metric::ErrorRate, Some("missing")), None);
    }

    #[test]
    fn dropped_arrivals_reach_the_snapshot() {
        let reg = Registry::default();
        reg.record_dropped_arrival();
        for tag in ["/a", "/b", "/c"] {
            reg.record(tag, OutcomeKind::Dropped, Duration::ZERO);
        }

        let snap = reg.snapshot();
        assert_eq!(snap.dropped_arrivals(), 1);
        assert_eq!(snap.value(&Metric::DroppedArrivals, None), Some(1.0));
        assert_eq!(snap.value(&Metric::DroppedTotal, None), Some(3.0));
    }

    #[test]
    fn concurrent_records_are_all_counted() {
        let reg = Arc::new(Registry::default());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let reg = reg.clone();
                std::thread::spawn(move || {
                    let tag = if t % 2 == 0 { "even" } else { "odd" };
                    for i in 0..1000u64 {
                        let kind = if i % 10 == 0 {
                            OutcomeKind::ProtocolFailure
                        } else {
                            OutcomeKind::Success
                        };
                        reg.record(tag, kind, Duration::from_micros(i));
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap_or_else(|_| panic!("recorder thread panicked"));
        }

        let snap = reg.snapshot();
        assert_eq!(snap.global().total(), 8000);
        assert_eq!(snap.global().failed(), 800);
        assert_eq!(snap.global().sample_count(), 8000);
        assert_eq!(snap.value(&Metric::ErrorRate, None), Some(0.1));
    }
}
