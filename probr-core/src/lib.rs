mod config;
mod error;
mod outcome;
mod pool;
mod probe;
mod progress;
mod run;
mod schedule;
mod state;
mod summary;
mod thresholds;
mod thresholds_eval;

pub use config::{
    DEFAULT_EVALUATION_INTERVAL, DEFAULT_GRACE_PERIOD, DEFAULT_PROBE_TIMEOUT,
    DEFAULT_PROGRESS_INTERVAL, DEFAULT_SCENARIO_NAME, DEFAULT_TICK, DEFAULT_TIME_UNIT, MAX_TICK,
    PoolConfig, ProbeTarget, RunConfig, RunOptions, Scenario, ScenarioExecutor,
    ScenarioExecutorKind, ScenarioOptions, Stage, scenario_from_options,
};
pub use error::{Error, Result};
pub use outcome::{Outcome, classify_status};
pub use pool::{PoolExhausted, PoolStats, Worker, WorkerPool};
pub use probe::{Endpoint, HttpProber, ProbeError, ProbeRequest, Prober};
pub use progress::{LiveMetrics, ProgressFn, ProgressUpdate, ScenarioProgress, StageProgress};
pub use run::{Plan, RunContext, run};
pub use schedule::{RateSchedule, StageSnapshot};
pub use state::{RunState, StateMachine};
pub use summary::{RunEnd, RunReport};
pub use thresholds::{
    Threshold, ThresholdError, ThresholdOp, ThresholdScope, ThresholdSet, ThresholdSpec,
    compile_threshold_sets, parse_threshold_expr,
};
pub use thresholds_eval::{Status, ThresholdResult, Verdict, evaluate, validate_thresholds};

pub use probr_metrics::{LatencyStat, Metric, OutcomeKind, SeriesSummary, Snapshot};
pub use tokio_util::sync::CancellationToken;
