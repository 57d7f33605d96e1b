use std::collections::BTreeMap;
use std::time::Duration;

use crate::scenario_yaml::{
    ScenarioDocYamlFlat, ScenarioYaml, StageYaml, TargetYaml, ThresholdExprYaml,
    ThresholdItemYaml,
};

/// Built-in scenarios for the gateway's read API.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum Preset {
    /// One VU walking the read endpoints for 20s.
    #[default]
    Smoke,
    /// A two-minute arrival-rate curve against the health endpoint.
    Stress,
}

impl Preset {
    pub(crate) fn document(self) -> ScenarioDocYamlFlat {
        match self {
            Self::Smoke => smoke(),
            Self::Stress => stress(),
        }
    }
}

fn thresholds(pairs: &[(&str, &str)]) -> BTreeMap<String, ThresholdExprYaml> {
    pairs
        .iter()
        .map(|(key, expr)| {
            (
                key.to_string(),
                ThresholdExprYaml::One(ThresholdItemYaml::Expr(expr.to_string())),
            )
        })
        .collect()
}

/// Each iteration probes all three endpoints back to back, then pauses 3s. The pause sits after
/// the probes, so the first request goes out at t=0 and iteration pacing is 3s plus probe time.
fn smoke() -> ScenarioDocYamlFlat {
    ScenarioDocYamlFlat {
        scenario: ScenarioYaml {
            name: Some("smoke".to_string()),
            executor: Some("constant-vus".to_string()),
            targets: ["/api/healthz", "/api/measurements?limit=5", "/api/observations?limit=5"]
                .into_iter()
                .map(|p| TargetYaml::Path(p.to_string()))
                .collect(),
            think_time: Some(Duration::from_secs(3).into()),
            vus: Some(1),
            duration: Some(Duration::from_secs(20).into()),
            ..ScenarioYaml::default()
        },
        thresholds: thresholds(&[("error_rate", "< 0.01"), ("latency_p95", "< 9000ms")]),
    }
}

fn stress() -> ScenarioDocYamlFlat {
    let stage = |target: f64, secs: u64| StageYaml {
        target,
        duration: Duration::from_secs(secs).into(),
    };

    ScenarioDocYamlFlat {
        scenario: ScenarioYaml {
            name: Some("stress".to_string()),
            executor: Some("ramping-arrival-rate".to_string()),
            targets: vec![TargetYaml::Path("/api/healthz".to_string())],
            think_time: Some(Duration::from_secs(1).into()),
            start_rate: Some(1.0),
            time_unit: Some(Duration::from_secs(1).into()),
            pre_allocated_vus: Some(10),
            max_vus: Some(20),
            stages: vec![stage(1.0, 45), stage(1.0, 45), stage(0.0, 30)],
            ..ScenarioYaml::default()
        },
        thresholds: thresholds(&[("error_rate", "< 0.01"), ("latency_p95", "< 7000ms")]),
    }
}
