use std::sync::Arc;
use std::time::Duration;

use probr_metrics::agg::RateTracker;
use probr_metrics::{LatencyStat, Metric, OutcomeKind, Snapshot};

use crate::pool::PoolStats;
use crate::schedule::StageSnapshot;
use crate::state::RunState;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveMetrics {
    /// Requests/sec observed during the last progress interval.
    pub rps_now: f64,

    /// Aggregate requests/sec statistics across progress intervals.
    pub rps_avg: f64,
    pub rps_stdev: f64,
    pub rps_max: f64,

    pub requests_total: u64,
    pub failed_total: u64,
    pub dropped_total: u64,
    pub error_rate: f64,

    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_max_ms: f64,
}

impl LiveMetrics {
    pub(crate) fn compute(snapshot: &Snapshot, dt: Duration, rates: &mut RateTracker) -> Self {
        let global = snapshot.global();
        let rps_now = rates.observe(global.total(), dt);

        Self {
            rps_now,
            rps_avg: rates.mean(),
            rps_stdev: rates.stdev(),
            rps_max: rates.peak(),
            requests_total: global.total(),
            failed_total: global.failed(),
            dropped_total: global.count(OutcomeKind::Dropped),
            error_rate: global.error_rate(),
            latency_p50_ms: Metric::Latency(LatencyStat::Med).value(global),
            latency_p95_ms: Metric::Latency(LatencyStat::Percentile(95.0)).value(global),
            latency_max_ms: Metric::Latency(LatencyStat::Max).value(global),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageProgress {
    /// 1-based stage index.
    pub stage: usize,
    pub stages: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: f64,
    pub end_target: f64,
    pub current_target: f64,
}

impl From<StageSnapshot> for StageProgress {
    fn from(st: StageSnapshot) -> Self {
        Self {
            stage: st.index + 1,
            stages: st.count,
            stage_elapsed: st.stage_elapsed,
            stage_remaining: st.stage_remaining,
            start_target: st.start_target,
            end_target: st.end_target,
            current_target: st.current_target,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioProgress {
    ConstantVus {
        vus: u64,
        duration: Duration,
    },
    RampingArrivalRate {
        time_unit: Duration,
        total_duration: Duration,
        stage: Option<StageProgress>,
        pool: PoolStats,
        dispatched_total: u64,
        dropped_arrivals_total: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based) for progress emissions.
    pub tick: u64,
    pub interval: Duration,
    pub elapsed: Duration,
    pub scenario: String,
    pub state: RunState,
    pub metrics: LiveMetrics,
    pub progress: ScenarioProgress,
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;
