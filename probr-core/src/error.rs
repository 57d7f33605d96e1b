use std::time::Duration;

use crate::thresholds::ThresholdError;

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors. All of them are raised before the first probe is dispatched.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid `executor` `{0}` (expected `constant-vus` or `ramping-arrival-rate`)")]
    InvalidExecutor(String),

    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("`targets` must name at least one path")]
    NoTargets,

    #[error("invalid target path `{0}` (expected a path starting with `/`)")]
    InvalidTargetPath(String),

    #[error("`stages` must be a non-empty array of {{ duration, target }} with a positive total")]
    InvalidStages,

    #[error("stage {index}: `target` must be a finite, non-negative rate")]
    InvalidStageTarget { index: usize },

    #[error("`startRate` must be a finite, non-negative rate")]
    InvalidStartRate,

    #[error("`timeUnit` must be a positive duration")]
    InvalidTimeUnit,

    #[error("`maxVUs` must be >= `preAllocatedVUs` and >= 1")]
    InvalidMaxVus,

    #[error("`tick` must be in (0, 100ms], got {0:?}")]
    InvalidTick(Duration),

    #[error("`timeout` must be a positive duration")]
    InvalidTimeout,

    #[error("`evaluationInterval` must be a positive duration")]
    InvalidEvaluationInterval,

    #[error(transparent)]
    Threshold(#[from] ThresholdError),

    #[error("threshold `{threshold}` is scoped to tag `{tag}`, which no target uses")]
    UnknownThresholdTag { threshold: String, tag: String },
}
