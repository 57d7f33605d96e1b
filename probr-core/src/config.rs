use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_SCENARIO_NAME: &str = "default";
pub const DEFAULT_TIME_UNIT: Duration = Duration::from_secs(1);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_TICK: Duration = Duration::from_millis(10);
pub const MAX_TICK: Duration = Duration::from_millis(100);
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);
pub const DEFAULT_EVALUATION_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// One segment of a rate curve. `target` is in arrivals per `time_unit`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage {
    pub duration: Duration,
    pub target: f64,
}

/// An endpoint probed once per iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub path: String,
    /// Aggregation label; defaults to the path.
    pub tag: String,
}

impl ProbeTarget {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            tag: path.clone(),
            path,
        }
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub pre_allocated: u64,
    pub max: u64,
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max == 0 || self.max < self.pre_allocated {
            return Err(Error::InvalidMaxVus);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioExecutor {
    /// Closed model: `vus` loops, each running iterations back to back until `duration`.
    ConstantVus { vus: u64, duration: Duration },

    /// Open model: iterations started per `time_unit`, following a piecewise-linear curve.
    RampingArrivalRate {
        start_rate: f64,
        time_unit: Duration,
        pool: PoolConfig,
        stages: Vec<Stage>,
    },
}

/// Scenario executor kind (the string form used by scenario files and the CLI).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
pub enum ScenarioExecutorKind {
    #[strum(to_string = "constant-vus", serialize = "constant")]
    ConstantVus,

    #[strum(to_string = "ramping-arrival-rate", serialize = "ramping-rps")]
    RampingArrivalRate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub targets: Vec<ProbeTarget>,
    /// Pause after each iteration.
    pub think_time: Duration,
    pub executor: ScenarioExecutor,
}

impl Scenario {
    pub fn kind(&self) -> ScenarioExecutorKind {
        match self.executor {
            ScenarioExecutor::ConstantVus { .. } => ScenarioExecutorKind::ConstantVus,
            ScenarioExecutor::RampingArrivalRate { .. } => ScenarioExecutorKind::RampingArrivalRate,
        }
    }

    /// Length of the admission window; for rate curves this is the sum of stage durations.
    pub fn total_duration(&self) -> Duration {
        match &self.executor {
            ScenarioExecutor::ConstantVus { duration, .. } => *duration,
            ScenarioExecutor::RampingArrivalRate { stages, .. } => stages
                .iter()
                .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration)),
        }
    }

    /// Constant mode sizes the pool to exactly `vus`.
    pub fn pool_config(&self) -> PoolConfig {
        match &self.executor {
            ScenarioExecutor::ConstantVus { vus, .. } => PoolConfig {
                pre_allocated: *vus,
                max: *vus,
            },
            ScenarioExecutor::RampingArrivalRate { pool, .. } => *pool,
        }
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> + '_ {
        self.targets.iter().map(|t| t.tag.as_str())
    }

    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(Error::NoTargets);
        }
        for t in &self.targets {
            if !t.path.starts_with('/') {
                return Err(Error::InvalidTargetPath(t.path.clone()));
            }
        }

        match &self.executor {
            ScenarioExecutor::ConstantVus { vus, duration } => {
                if *vus == 0 {
                    return Err(Error::InvalidVus);
                }
                if duration.is_zero() {
                    return Err(Error::InvalidDuration);
                }
            }
            ScenarioExecutor::RampingArrivalRate {
                start_rate,
                time_unit,
                pool,
                stages,
            } => {
                if stages.is_empty() || self.total_duration().is_zero() {
                    return Err(Error::InvalidStages);
                }
                for (index, s) in stages.iter().enumerate() {
                    if !s.target.is_finite() || s.target < 0.0 {
                        return Err(Error::InvalidStageTarget { index });
                    }
                }
                if !start_rate.is_finite() || *start_rate < 0.0 {
                    return Err(Error::InvalidStartRate);
                }
                if time_unit.is_zero() {
                    return Err(Error::InvalidTimeUnit);
                }
                pool.validate()?;
            }
        }

        Ok(())
    }
}

/// Loosely-typed scenario as read from a file or preset, before defaults and validation.
#[derive(Debug, Clone, Default)]
pub struct ScenarioOptions {
    pub name: Option<String>,

    /// Scenario executor. If missing, defaults to constant VUs.
    pub executor: Option<String>,

    pub targets: Vec<ProbeTarget>,
    pub think_time: Option<Duration>,

    // Constant VUs
    pub vus: Option<u64>,
    pub duration: Option<Duration>,

    // Ramping arrival rate
    pub start_rate: Option<f64>,
    pub time_unit: Option<Duration>,
    pub pre_allocated_vus: Option<u64>,
    pub max_vus: Option<u64>,
    pub stages: Vec<Stage>,
}

/// Command-line overrides of the run shape.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub vus: Option<u64>,
    pub duration: Option<Duration>,
}

impl RunConfig {
    fn is_set(&self) -> bool {
        self.vus.is_some() || self.duration.is_some()
    }
}

pub fn scenario_from_options(opts: ScenarioOptions, cfg: RunConfig) -> Result<Scenario> {
    let name = opts
        .name
        .unwrap_or_else(|| DEFAULT_SCENARIO_NAME.to_string());
    let executor_name = opts.executor.as_deref().unwrap_or("constant-vus");
    let kind: ScenarioExecutorKind = executor_name
        .parse()
        .map_err(|_| Error::InvalidExecutor(executor_name.to_string()))?;

    // CLI flags have the highest priority. An explicit `--vus`/`--duration` turns a rate
    // curve into a constant VU scenario and ignores the ramping-specific fields.
    let kind = if cfg.is_set() {
        ScenarioExecutorKind::ConstantVus
    } else {
        kind
    };

    let executor = match kind {
        ScenarioExecutorKind::ConstantVus => {
            let vus = cfg.vus.or(opts.vus).unwrap_or(1);
            // A converted rate curve keeps its overall length unless `--duration` says otherwise.
            let stages_total = opts
                .stages
                .iter()
                .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration));
            let duration = cfg
                .duration
                .or(opts.duration)
                .or((!stages_total.is_zero()).then_some(stages_total))
                .ok_or(Error::InvalidDuration)?;
            ScenarioExecutor::ConstantVus { vus, duration }
        }
        ScenarioExecutorKind::RampingArrivalRate => {
            let start_rate = opts
                .start_rate
                .or_else(|| opts.stages.first().map(|s| s.target))
                .unwrap_or(0.0);
            let pre_allocated = opts.pre_allocated_vus.unwrap_or(1);
            let max = opts.max_vus.unwrap_or(pre_allocated.max(1));
            ScenarioExecutor::RampingArrivalRate {
                start_rate,
                time_unit: opts.time_unit.unwrap_or(DEFAULT_TIME_UNIT),
                pool: PoolConfig { pre_allocated, max },
                stages: opts.stages,
            }
        }
    };

    let scenario = Scenario {
        name,
        targets: opts.targets,
        think_time: opts.think_time.unwrap_or(Duration::ZERO),
        executor,
    };
    scenario.validate()?;
    Ok(scenario)
}

/// Engine knobs that are not part of the traffic shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub probe_timeout: Duration,
    /// Scheduler tick of the arrival-rate executor.
    pub tick: Duration,
    /// How long in-flight work may run after the admission window closes.
    pub grace_period: Duration,
    /// Cadence of mid-run evaluation for `abortOnFail` thresholds.
    pub evaluation_interval: Duration,
    pub progress_interval: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            tick: DEFAULT_TICK,
            grace_period: DEFAULT_GRACE_PERIOD,
            evaluation_interval: DEFAULT_EVALUATION_INTERVAL,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<()> {
        if self.tick.is_zero() || self.tick > MAX_TICK {
            return Err(Error::InvalidTick(self.tick));
        }
        if self.probe_timeout.is_zero() {
            return Err(Error::InvalidTimeout);
        }
        if self.evaluation_interval.is_zero() || self.progress_interval.is_zero() {
            return Err(Error::InvalidEvaluationInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthz() -> Vec<ProbeTarget> {
        vec![ProbeTarget::new("/api/healthz")]
    }

    #[test]
    fn constant_vus_defaults_to_one_vu() {
        let s = scenario_from_options(
            ScenarioOptions {
                targets: healthz(),
                duration: Some(Duration::from_secs(20)),
                ..Default::default()
            },
            RunConfig::default(),
        )
        .unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(s.name, DEFAULT_SCENARIO_NAME);
        assert_eq!(
            s.executor,
            ScenarioExecutor::ConstantVus {
                vus: 1,
                duration: Duration::from_secs(20)
            }
        );
        assert_eq!(
            s.pool_config(),
            PoolConfig {
                pre_allocated: 1,
                max: 1
            }
        );
    }

    #[test]
    fn constant_vus_requires_duration() {
        let err = scenario_from_options(
            ScenarioOptions {
                targets: healthz(),
                ..Default::default()
            },
            RunConfig::default(),
        );
        assert!(matches!(err, Err(Error::InvalidDuration)));
    }

    #[test]
    fn ramping_start_rate_defaults_to_first_stage() {
        let s = scenario_from_options(
            ScenarioOptions {
                executor: Some("ramping-arrival-rate".to_string()),
                targets: healthz(),
                stages: vec![Stage {
                    duration: Duration::from_secs(10),
                    target: 5.0,
                }],
                ..Default::default()
            },
            RunConfig::default(),
        )
        .unwrap_or_else(|e| panic!("{e}"));

        let ScenarioExecutor::RampingArrivalRate {
            start_rate,
            time_unit,
            pool,
            ..
        } = s.executor
        else {
            panic!("expected ramping executor");
        };
        assert_eq!(start_rate, 5.0);
        assert_eq!(time_unit, DEFAULT_TIME_UNIT);
        assert_eq!(
            pool,
            PoolConfig {
                pre_allocated: 1,
                max: 1
            }
        );
    }

    #[test]
    fn cli_overrides_turn_ramping_into_constant() {
        let s = scenario_from_options(
            ScenarioOptions {
                executor: Some("ramping-arrival-rate".to_string()),
                targets: healthz(),
                stages: vec![Stage {
                    duration: Duration::from_secs(10),
                    target: 5.0,
                }],
                ..Default::default()
            },
            RunConfig {
                vus: Some(3),
                duration: Some(Duration::from_secs(2)),
            },
        )
        .unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(s.kind(), ScenarioExecutorKind::ConstantVus);
        assert_eq!(s.total_duration(), Duration::from_secs(2));
    }

    #[test]
    fn rejects_invalid_rate_curves() {
        let base = ScenarioOptions {
            executor: Some("ramping-arrival-rate".to_string()),
            targets: healthz(),
            ..Default::default()
        };

        let empty = scenario_from_options(base.clone(), RunConfig::default());
        assert!(matches!(empty, Err(Error::InvalidStages)));

        let zero_len = scenario_from_options(
            ScenarioOptions {
                stages: vec![Stage {
                    duration: Duration::ZERO,
                    target: 1.0,
                }],
                ..base.clone()
            },
            RunConfig::default(),
        );
        assert!(matches!(zero_len, Err(Error::InvalidStages)));

        let negative = scenario_from_options(
            ScenarioOptions {
                stages: vec![
                    Stage {
                        duration: Duration::from_secs(1),
                        target: 1.0,
                    },
                    Stage {
                        duration: Duration::from_secs(1),
                        target: -1.0,
                    },
                ],
                ..base.clone()
            },
            RunConfig::default(),
        );
        assert!(matches!(
            negative,
            Err(Error::InvalidStageTarget { index: 1 })
        ));

        let bad_pool = scenario_from_options(
            ScenarioOptions {
                stages: vec![Stage {
                    duration: Duration::from_secs(1),
                    target: 1.0,
                }],
                pre_allocated_vus: Some(10),
                max_vus: Some(5),
                ..base
            },
            RunConfig::default(),
        );
        assert!(matches!(bad_pool, Err(Error::InvalidMaxVus)));
    }

    #[test]
    fn rejects_unknown_executor_and_bad_targets() {
        let err = scenario_from_options(
            ScenarioOptions {
                executor: Some("per-vu-iterations".to_string()),
                targets: healthz(),
                duration: Some(Duration::from_secs(1)),
                ..Default::default()
            },
            RunConfig::default(),
        );
        assert!(matches!(err, Err(Error::InvalidExecutor(_))));

        let err = scenario_from_options(
            ScenarioOptions {
                targets: vec![ProbeTarget::new("api/healthz")],
                duration: Some(Duration::from_secs(1)),
                ..Default::default()
            },
            RunConfig::default(),
        );
        assert!(matches!(err, Err(Error::InvalidTargetPath(_))));

        let err = scenario_from_options(
            ScenarioOptions {
                duration: Some(Duration::from_secs(1)),
                ..Default::default()
            },
            RunConfig::default(),
        );
        assert!(matches!(err, Err(Error::NoTargets)));
    }

    #[test]
    fn run_options_tick_bounds() {
        let mut opts = RunOptions::default();
        assert!(opts.validate().is_ok());

        opts.tick = Duration::ZERO;
        assert!(matches!(opts.validate(), Err(Error::InvalidTick(_))));

        opts.tick = Duration::from_millis(101);
        assert!(matches!(opts.validate(), Err(Error::InvalidTick(_))));

        opts.tick = MAX_TICK;
        assert!(opts.validate().is_ok());
    }
}
