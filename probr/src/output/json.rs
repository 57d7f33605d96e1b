use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::sync::Arc;

use probr_core::{OutcomeKind, SeriesSummary};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _plan: &probr_core::Plan) {}

    fn progress(&self) -> Option<probr_core::ProgressFn> {
        Some(Arc::new(move |u: probr_core::ProgressUpdate| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, report: &probr_core::RunReport) -> anyhow::Result<()> {
        let line = build_summary_line(report);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub scenario: String,
    pub state: String,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub interval_secs: f64,

    pub requests_per_sec: f64,
    pub req_per_sec_avg: f64,
    pub req_per_sec_stdev: f64,
    pub req_per_sec_max: f64,

    pub total_requests: u64,
    pub failed_total: u64,
    pub dropped_total: u64,
    pub error_rate: f64,

    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_max_ms: f64,

    /// Concurrency: VUs in constant mode, busy workers in arrival-rate mode.
    pub workers_in_use: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers_max: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<usize>,
}

fn build_progress_line(u: &probr_core::ProgressUpdate) -> JsonProgressLine {
    let (workers_in_use, workers_max, current_rate, stage) = match &u.progress {
        probr_core::ScenarioProgress::ConstantVus { vus, .. } => (*vus, Some(*vus), None, None),
        probr_core::ScenarioProgress::RampingArrivalRate { stage, pool, .. } => (
            pool.in_use,
            Some(pool.max),
            stage.as_ref().map(|s| s.current_target),
            stage.as_ref().map(|s| s.stage),
        ),
    };

    JsonProgressLine {
        kind: "progress",
        scenario: u.scenario.clone(),
        state: u.state.to_string(),
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        interval_secs: u.interval.as_secs_f64(),

        requests_per_sec: u.metrics.rps_now,
        req_per_sec_avg: u.metrics.rps_avg,
        req_per_sec_stdev: u.metrics.rps_stdev,
        req_per_sec_max: u.metrics.rps_max,

        total_requests: u.metrics.requests_total,
        failed_total: u.metrics.failed_total,
        dropped_total: u.metrics.dropped_total,
        error_rate: u.metrics.error_rate,

        latency_p50_ms: u.metrics.latency_p50_ms,
        latency_p95_ms: u.metrics.latency_p95_ms,
        latency_max_ms: u.metrics.latency_max_ms,

        workers_in_use,
        workers_max,
        current_rate,
        stage,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub scenario: String,
    pub end: String,
    pub passed: bool,
    pub elapsed_secs: f64,
    pub dispatched: u64,
    pub dropped: u64,
    pub grace_expired: bool,
    pub workers: JsonWorkers,
    /// Flat metric map, global and `name{tag=...}` keys.
    pub metrics: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, JsonTagSummary>,
    pub thresholds: Vec<JsonThresholdResult>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonWorkers {
    pub created: u64,
    pub peak_in_use: u64,
    pub max: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonTagSummary {
    pub requests_total: u64,
    pub failed_total: u64,
    pub error_rate: f64,
    pub outcomes: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThresholdResult {
    pub threshold: String,
    pub observed: Option<f64>,
    pub status: String,
}

fn tag_summary(s: &SeriesSummary) -> JsonTagSummary {
    JsonTagSummary {
        requests_total: s.total(),
        failed_total: s.failed(),
        error_rate: s.error_rate(),
        outcomes: OutcomeKind::ALL
            .iter()
            .filter(|k| s.count(**k) > 0)
            .map(|k| (k.to_string(), s.count(*k)))
            .collect(),
    }
}

fn build_summary_line(report: &probr_core::RunReport) -> JsonSummaryLine {
    JsonSummaryLine {
        kind: "summary",
        scenario: report.scenario.clone(),
        end: report.end.to_string(),
        passed: report.passed(),
        elapsed_secs: report.elapsed.as_secs_f64(),
        dispatched: report.dispatched,
        dropped: report.dropped,
        grace_expired: report.grace_expired,
        workers: JsonWorkers {
            created: report.pool.size,
            peak_in_use: report.pool.peak_in_use,
            max: report.pool.max,
        },
        metrics: report.snapshot.values(),
        tags: report
            .snapshot
            .tags()
            .map(|(tag, s)| (tag.to_string(), tag_summary(s)))
            .collect(),
        thresholds: report
            .verdict
            .results
            .iter()
            .map(|r| JsonThresholdResult {
                threshold: r.threshold.to_string(),
                observed: r.observed,
                status: r.status.to_string(),
            })
            .collect(),
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probr_core::{
        LiveMetrics, PoolStats, ProgressUpdate, RunEnd, RunReport, RunState, ScenarioProgress,
        Snapshot, Status, Verdict,
    };
    use serde_json::Value;
    use std::time::Duration;

    #[test]
    fn progress_line_has_kind_and_state() {
        let update = ProgressUpdate {
            tick: 3,
            interval: Duration::from_secs(1),
            elapsed: Duration::from_secs(3),
            scenario: "smoke".to_string(),
            state: RunState::Running,
            metrics: LiveMetrics {
                requests_total: 9,
                ..LiveMetrics::default()
            },
            progress: ScenarioProgress::ConstantVus {
                vus: 1,
                duration: Duration::from_secs(20),
            },
        };

        let v: Value = match serde_json::to_value(build_progress_line(&update)) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        };
        assert_eq!(v.get("kind").and_then(Value::as_str), Some("progress"));
        assert_eq!(v.get("state").and_then(Value::as_str), Some("running"));
        assert_eq!(v.get("total_requests").and_then(Value::as_u64), Some(9));
        assert_eq!(v.get("workers_max").and_then(Value::as_u64), Some(1));
        assert!(v.get("current_rate").is_none());
    }

    #[test]
    fn summary_line_carries_verdict_and_metrics() {
        let report = RunReport {
            scenario: "stress".to_string(),
            snapshot: Snapshot::new(SeriesSummary::default(), BTreeMap::new()),
            verdict: Verdict {
                overall: Status::Pass,
                results: Vec::new(),
            },
            elapsed: Duration::from_secs(120),
            end: RunEnd::Completed,
            pool: PoolStats {
                size: 3,
                in_use: 0,
                peak_in_use: 2,
                max: 20,
            },
            dispatched: 105,
            dropped: 0,
            grace_expired: false,
        };

        let v: Value = match serde_json::to_value(build_summary_line(&report)) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        };

        assert_eq!(v.get("kind").and_then(Value::as_str), Some("summary"));
        assert_eq!(v.get("end").and_then(Value::as_str), Some("completed"));
        assert_eq!(v.get("passed").and_then(Value::as_bool), Some(true));
        assert_eq!(v.pointer("/workers/peak_in_use").and_then(Value::as_u64), Some(2));
        assert_eq!(
            v.pointer("/metrics/requests_total").and_then(Value::as_f64),
            Some(0.0)
        );
        assert_eq!(
            v.pointer("/metrics/error_rate").and_then(Value::as_f64),
            Some(0.0)
        );
    }
}
