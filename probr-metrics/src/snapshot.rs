use std::collections::BTreeMap;

use crate::metric::Metric;
use crate::series::SeriesSummary;

/// Point-in-time aggregate of a run: one global summary plus one summary per tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    global: SeriesSummary,
    by_tag: BTreeMap<String, SeriesSummary>,
    dropped_arrivals: u64,
}

impl Snapshot {
    pub fn new(global: SeriesSummary, by_tag: BTreeMap<String, SeriesSummary>) -> Self {
        Self {
            global,
            by_tag,
            dropped_arrivals: 0,
        }
    }

    #[must_use]
    pub fn with_dropped_arrivals(mut self, dropped_arrivals: u64) -> Self {
        self.dropped_arrivals = dropped_arrivals;
        self
    }

    /// Arrivals rejected by an exhausted pool, counted once each regardless of target count.
    pub fn dropped_arrivals(&self) -> u64 {
        self.dropped_arrivals
    }

    fn global_value(&self, metric: &Metric) -> f64 {
        match metric {
            Metric::DroppedArrivals => self.dropped_arrivals as f64,
            other => other.value(&self.global),
        }
    }

    pub fn global(&self) -> &SeriesSummary {
        &self.global
    }

    pub fn tag(&self, tag: &str) -> Option<&SeriesSummary> {
        self.by_tag.get(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = (&str, &SeriesSummary)> + '_ {
        self.by_tag.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Value of `metric` for the global scope (`None`) or a single tag.
    ///
    /// The global scope always yields a value; a tag that never recorded an outcome yields
    /// `None`.
    pub fn value(&self, metric: &Metric, tag: Option<&str>) -> Option<f64> {
        match tag {
            None => Some(self.global_value(metric)),
            Some(tag) => self.by_tag.get(tag).map(|s| metric.value(s)),
        }
    }

    /// Flat `metric name -> value` view of the standard metrics.
    ///
    /// Tag-scoped entries are keyed as `name{tag=<tag>}`.
    pub fn values(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();

        for metric in Metric::STANDARD {
            out.insert(metric.to_string(), self.global_value(&metric));
        }

        for (tag, summary) in &self.by_tag {
            for metric in Metric::STANDARD {
                out.insert(format!("{metric}{{tag={tag}}}"), metric.value(summary));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::OutcomeKind;
    use crate::series::MetricSeries;
    use std::time::Duration;

    #[test]
    fn values_cover_standard_metrics_even_without_data() {
        let values = Snapshot::default().values();
        assert_eq!(values.get("error_rate"), Some(&0.0));
        assert_eq!(values.get("latency_p95"), Some(&0.0));
        assert_eq!(values.get("requests_total"), Some(&0.0));
        assert_eq!(values.len(), Metric::STANDARD.len());
    }

    #[test]
    fn values_include_tag_scoped_keys() {
        let mut s = MetricSeries::default();
        s.record(OutcomeKind::Success, Duration::from_millis(50));
        let summary = s.summarize();

        let mut by_tag = BTreeMap::new();
        by_tag.insert("/healthz".to_string(), summary.clone());
        let snap = Snapshot::new(summary, by_tag);

        let values = snap.values();
        assert_eq!(values.get("latency_p95{tag=/healthz}"), Some(&50.0));
        assert_eq!(values.get("error_rate{tag=/healthz}"), Some(&0.0));
    }

    #[test]
    fn dropped_arrivals_are_counted_once_per_arrival() {
        let mut a = MetricSeries::default();
        let mut b = MetricSeries::default();
        for _ in 0..3 {
            a.record(OutcomeKind::Dropped, Duration::ZERO);
            b.record(OutcomeKind::Dropped, Duration::ZERO);
        }

        let mut by_tag = BTreeMap::new();
        by_tag.insert("/a".to_string(), a.summarize());
        by_tag.insert("/b".to_string(), b.summarize());
        let global = SeriesSummary::merge([&a, &b]);
        let snap = Snapshot::new(global, by_tag).with_dropped_arrivals(3);

        assert_eq!(snap.value(&Metric::DroppedTotal, None), Some(6.0));
        assert_eq!(snap.value(&Metric::DroppedArrivals, None), Some(3.0));
        assert_eq!(snap.value(&Metric::DroppedArrivals, Some("/a")), Some(3.0));
        assert_eq!(snap.values().get("dropped_arrivals"), Some(&3.0));
    }
}
