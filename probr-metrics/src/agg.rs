use std::time::Duration;

/// Request-rate bookkeeping across progress intervals.
///
/// Fed the cumulative request total once per interval; keeps the interval rate's running
/// mean and sample stdev (Welford) and its peak.
#[derive(Debug, Default, Clone, Copy)]
pub struct RateTracker {
    last_total: u64,
    intervals: u64,
    mean: f64,
    m2: f64,
    peak: f64,
}

impl RateTracker {
    /// Records the interval ending now, `dt` after the previous one. Returns its rate per second.
    pub fn observe(&mut self, total: u64, dt: Duration) -> f64 {
        let delta = total.saturating_sub(self.last_total);
        self.last_total = total;
        let rate = delta as f64 / dt.as_secs_f64().max(1e-9);

        self.intervals = self.intervals.saturating_add(1);
        let d = rate - self.mean;
        self.mean += d / self.intervals as f64;
        self.m2 += d * (rate - self.mean);
        self.peak = self.peak.max(rate);

        rate
    }

    pub fn intervals(&self) -> u64 {
        self.intervals
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn stdev(&self) -> f64 {
        match self.intervals {
            0 | 1 => 0.0,
            n => (self.m2 / (n - 1) as f64).sqrt(),
        }
    }

    pub fn peak(&self) -> f64 {
        self.peak
    }
}
