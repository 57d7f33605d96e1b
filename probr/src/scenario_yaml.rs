use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScenarioYaml {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Executor kind: constant-vus | ramping-arrival-rate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub targets: Vec<TargetYaml>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub think_time: Option<YamlDuration>,

    // constant-vus
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vus: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration: Option<YamlDuration>,

    // ramping-arrival-rate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_rate: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub time_unit: Option<YamlDuration>,

    #[serde(rename = "preAllocatedVUs")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_allocated_vus: Option<u64>,

    #[serde(rename = "maxVUs")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_vus: Option<u64>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub stages: Vec<StageYaml>,
}

/// A probe target: either a bare path or `{path, tag}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum TargetYaml {
    Path(String),
    Tagged {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        tag: Option<String>,
    },
}

impl TargetYaml {
    fn into_target(self) -> probr_core::ProbeTarget {
        match self {
            Self::Path(path) | Self::Tagged { path, tag: None } => {
                probr_core::ProbeTarget::new(path)
            }
            Self::Tagged {
                path,
                tag: Some(tag),
            } => probr_core::ProbeTarget::new(path).with_tag(tag),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StageYaml {
    pub target: f64,

    #[serde(default)]
    pub duration: YamlDuration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl From<Duration> for YamlDuration {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl Serialize for YamlDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(self.0).to_string())
    }
}

/// Accepts whole or fractional seconds, or a humantime string such as `1m30s`.
impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Secs(u64),
            Fractional(f64),
            Text(String),
        }

        let parsed = match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Fractional(secs) => Duration::try_from_secs_f64(secs)
                .map_err(|_| format!("invalid duration {secs}: must be a non-negative number")),
            Raw::Text(text) => match text.trim() {
                "0" => Ok(Duration::ZERO),
                t => humantime::parse_duration(t).map_err(|e| format!("invalid duration `{t}`: {e}")),
            },
        };
        parsed.map(Self).map_err(serde::de::Error::custom)
    }
}

/// One threshold entry. The short form is just the expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdItemYaml {
    Expr(String),
    Detailed(ThresholdDetailYaml),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ThresholdDetailYaml {
    pub threshold: String,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub abort_on_fail: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub allow_missing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdExprYaml {
    One(ThresholdItemYaml),
    Many(Vec<ThresholdItemYaml>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioDocYamlNested {
    pub scenario: ScenarioYaml,

    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdExprYaml>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScenarioDocYamlFlat {
    #[serde(flatten)]
    pub scenario: ScenarioYaml,

    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub thresholds: BTreeMap<String, ThresholdExprYaml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ScenarioDocYaml {
    Nested(ScenarioDocYamlNested),
    Flat(ScenarioDocYamlFlat),
}

/// A scenario document resolved into core options, before CLI overrides apply.
#[derive(Debug, Clone)]
pub(crate) struct LoadedScenario {
    pub options: probr_core::ScenarioOptions,
    pub thresholds: Vec<probr_core::ThresholdSet>,
}

pub fn looks_like_yaml_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()).map(|s| s.to_ascii_lowercase()),
        Some(ext) if ext == "yml" || ext == "yaml"
    )
}

pub(crate) async fn load_scenario_file(path: &Path) -> anyhow::Result<LoadedScenario> {
    if !looks_like_yaml_path(path) {
        anyhow::bail!(
            "unsupported scenario file `{}` (expected .yaml or .yml)",
            path.display()
        );
    }

    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read scenario YAML: {}", path.display()))?;

    let default_name = path.file_stem().and_then(|s| s.to_str());
    parse_scenario_doc(&raw, default_name)
        .with_context(|| format!("failed to parse YAML: {}", path.display()))
}

pub(crate) fn parse_scenario_doc(
    raw: &str,
    default_name: Option<&str>,
) -> anyhow::Result<LoadedScenario> {
    let doc: ScenarioDocYaml = serde_yaml::from_str(raw)?;
    let doc = match doc {
        ScenarioDocYaml::Nested(d) => ScenarioDocYamlFlat {
            scenario: d.scenario,
            thresholds: d.thresholds,
        },
        ScenarioDocYaml::Flat(d) => d,
    };
    resolve_doc(doc, default_name)
}

pub(crate) fn resolve_doc(
    doc: ScenarioDocYamlFlat,
    default_name: Option<&str>,
) -> anyhow::Result<LoadedScenario> {
    let thresholds = parse_thresholds_map(doc.thresholds)?;
    let options = scenario_yaml_into_options(doc.scenario, default_name);
    Ok(LoadedScenario {
        options,
        thresholds,
    })
}

fn scenario_yaml_into_options(
    scenario: ScenarioYaml,
    default_name: Option<&str>,
) -> probr_core::ScenarioOptions {
    let ScenarioYaml {
        name,
        executor,
        targets,
        think_time,
        vus,
        duration,
        start_rate,
        time_unit,
        pre_allocated_vus,
        max_vus,
        stages,
    } = scenario;

    probr_core::ScenarioOptions {
        name: name.or_else(|| default_name.map(str::to_string)),
        executor,
        targets: targets.into_iter().map(TargetYaml::into_target).collect(),
        think_time: think_time.map(YamlDuration::into_inner),
        vus,
        duration: duration.map(YamlDuration::into_inner),
        start_rate,
        time_unit: time_unit.map(YamlDuration::into_inner),
        pre_allocated_vus,
        max_vus,
        stages: stages
            .into_iter()
            .map(|s| probr_core::Stage {
                duration: s.duration.into_inner(),
                target: s.target,
            })
            .collect(),
    }
}

fn parse_thresholds_map(
    raw: BTreeMap<String, ThresholdExprYaml>,
) -> anyhow::Result<Vec<probr_core::ThresholdSet>> {
    let mut out = Vec::new();

    for (metric_key, v) in raw {
        let items = match v {
            ThresholdExprYaml::One(item) => vec![item],
            ThresholdExprYaml::Many(items) => items,
        };

        if items.is_empty() {
            anyhow::bail!("invalid thresholds for `{metric_key}`: empty list");
        }

        let expressions = items
            .into_iter()
            .map(|item| match item {
                ThresholdItemYaml::Expr(expression) => probr_core::ThresholdSpec::new(expression),
                ThresholdItemYaml::Detailed(d) => probr_core::ThresholdSpec {
                    expression: d.threshold,
                    abort_on_fail: d.abort_on_fail,
                    allow_missing: d.allow_missing,
                },
            })
            .collect();

        out.push(probr_core::ThresholdSet {
            metric: metric_key,
            expressions,
        });
    }

    Ok(out)
}

pub(crate) async fn write_yaml_file<T: Serialize>(path: &Path, doc: &T) -> anyhow::Result<()> {
    let s = serde_yaml::to_string(doc).context("failed to serialize YAML")?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    tokio::fs::write(path, s)
        .await
        .with_context(|| format!("failed to write file: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use probr_core::{RunConfig, ScenarioExecutor, compile_threshold_sets, scenario_from_options};

    fn fixture_path(name: &str) -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("scenario_yaml")
            .join(name)
    }

    #[test]
    fn yaml_extension_check() {
        assert!(looks_like_yaml_path(Path::new("a.yml")));
        assert!(looks_like_yaml_path(Path::new("dir/a.YAML")));
        assert!(!looks_like_yaml_path(Path::new("a.json")));
        assert!(!looks_like_yaml_path(Path::new("smoke")));
    }

    #[test]
    fn durations_accept_strings_and_numbers() {
        let doc: ScenarioDocYamlFlat = serde_yaml::from_str(
            r#"
duration: 1m30s
thinkTime: 2
timeUnit: 0.5
"#,
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        assert_eq!(
            doc.scenario.duration,
            Some(YamlDuration(Duration::from_secs(90)))
        );
        assert_eq!(
            doc.scenario.think_time,
            Some(YamlDuration(Duration::from_secs(2)))
        );
        assert_eq!(
            doc.scenario.time_unit,
            Some(YamlDuration(Duration::from_millis(500)))
        );

        let bad = serde_yaml::from_str::<ScenarioDocYamlFlat>("duration: -3");
        assert!(bad.is_err());
    }

    #[test]
    fn targets_accept_paths_and_tagged_entries() {
        let loaded = parse_scenario_doc(
            r#"
vus: 1
duration: 5s
targets:
  - /api/healthz
  - path: /api/measurements?limit=5
    tag: measurements
"#,
            None,
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        let t = &loaded.options.targets;
        assert_eq!(t.len(), 2);
        assert_eq!(t[0].path, "/api/healthz");
        assert_eq!(t[0].tag, "/api/healthz");
        assert_eq!(t[1].path, "/api/measurements?limit=5");
        assert_eq!(t[1].tag, "measurements");
    }

    #[test]
    fn thresholds_accept_all_three_shapes() {
        let loaded = parse_scenario_doc(
            r#"
vus: 1
duration: 5s
targets: [/api/healthz]
thresholds:
  http_req_failed: rate<0.01
  http_req_duration:
    - p(95)<9000
    - threshold: max<20000
      abortOnFail: true
  error_rate{tag=/api/other}:
    threshold: < 0.5
    allowMissing: true
"#,
            None,
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        assert_eq!(loaded.thresholds.len(), 3);
        let compiled =
            compile_threshold_sets(&loaded.thresholds).unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(compiled.len(), 4);
        assert_eq!(compiled.iter().filter(|t| t.abort_on_fail).count(), 1);
        assert_eq!(compiled.iter().filter(|t| t.allow_missing).count(), 1);
    }

    #[test]
    fn empty_threshold_list_is_rejected() {
        let err = parse_scenario_doc(
            r#"
vus: 1
duration: 5s
targets: [/a]
thresholds:
  error_rate: []
"#,
            None,
        );
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn loads_flat_yaml() {
        let loaded = load_scenario_file(&fixture_path("flat.yaml"))
            .await
            .unwrap_or_else(|e| panic!("{e:#}"));

        let s = scenario_from_options(loaded.options, RunConfig::default())
            .unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(s.name, "smoke");
        assert_eq!(s.targets.len(), 3);
        assert_eq!(s.think_time, Duration::from_secs(3));
        assert!(matches!(
            s.executor,
            ScenarioExecutor::ConstantVus { vus: 1, duration } if duration == Duration::from_secs(20)
        ));
        assert_eq!(loaded.thresholds.len(), 2);
    }

    #[tokio::test]
    async fn loads_nested_yaml_and_names_it_after_the_file() {
        let loaded = load_scenario_file(&fixture_path("nested.yaml"))
            .await
            .unwrap_or_else(|e| panic!("{e:#}"));

        let s = scenario_from_options(loaded.options, RunConfig::default())
            .unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(s.name, "nested");
        assert_eq!(s.total_duration(), Duration::from_secs(120));
        match s.executor {
            ScenarioExecutor::RampingArrivalRate {
                start_rate, pool, ..
            } => {
                assert_eq!(start_rate, 1.0);
                assert_eq!(pool.pre_allocated, 10);
                assert_eq!(pool.max, 20);
            }
            ScenarioExecutor::ConstantVus { .. } => panic!("expected ramping-arrival-rate"),
        }
    }

    #[tokio::test]
    async fn non_yaml_paths_are_rejected() {
        let err = load_scenario_file(Path::new("scenario.json")).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn written_documents_load_back() {
        let doc = ScenarioDocYamlFlat {
            scenario: ScenarioYaml {
                name: Some("rt".to_string()),
                executor: Some("ramping-arrival-rate".to_string()),
                targets: vec![TargetYaml::Path("/api/healthz".to_string())],
                start_rate: Some(2.5),
                time_unit: Some(Duration::from_secs(1).into()),
                pre_allocated_vus: Some(2),
                max_vus: Some(4),
                stages: vec![StageYaml {
                    target: 2.5,
                    duration: Duration::from_secs(90).into(),
                }],
                ..ScenarioYaml::default()
            },
            thresholds: [(
                "error_rate".to_string(),
                ThresholdExprYaml::One(ThresholdItemYaml::Expr("< 0.01".to_string())),
            )]
            .into_iter()
            .collect(),
        };

        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e:#}"));
        let path = dir.path().join("out").join("rt.yaml");
        write_yaml_file(&path, &doc)
            .await
            .unwrap_or_else(|e| panic!("{e:#}"));

        let loaded = load_scenario_file(&path)
            .await
            .unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(loaded.options.name.as_deref(), Some("rt"));
        assert_eq!(loaded.options.start_rate, Some(2.5));
        assert_eq!(loaded.options.stages.len(), 1);
        assert_eq!(loaded.options.stages[0].duration, Duration::from_secs(90));
        assert_eq!(loaded.thresholds.len(), 1);
    }
}
