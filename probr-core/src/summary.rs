use std::time::Duration;

use probr_metrics::{OutcomeKind, Snapshot};

use crate::pool::PoolStats;
use crate::thresholds_eval::Verdict;

/// Why the run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RunEnd {
    /// The schedule ran to completion and in-flight work drained (or was abandoned).
    Completed,
    /// Stopped by an external cancellation.
    Cancelled,
    /// Stopped because an `abortOnFail` threshold failed mid-run.
    ThresholdAbort,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub scenario: String,
    pub snapshot: Snapshot,
    pub verdict: Verdict,
    pub elapsed: Duration,
    pub end: RunEnd,
    pub pool: PoolStats,
    /// Iterations started plus arrivals dropped for lack of a worker.
    pub dispatched: u64,
    /// Arrivals dropped for lack of a worker.
    pub dropped: u64,
    /// The grace period ran out with work still in flight.
    pub grace_expired: bool,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.end == RunEnd::Completed && self.verdict.passed()
    }

    pub fn abandoned(&self) -> u64 {
        self.snapshot.global().count(OutcomeKind::Abandoned)
    }

    pub fn cancelled(&self) -> u64 {
        self.snapshot.global().count(OutcomeKind::Cancelled)
    }
}
