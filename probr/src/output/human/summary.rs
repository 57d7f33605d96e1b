use std::fmt::Write as _;

use probr_core::{LatencyStat, Metric, OutcomeKind, RunEnd, RunReport, SeriesSummary};

use super::format::{format_duration, format_ms, format_percent, format_rate};

pub(crate) fn render(report: &RunReport) -> String {
    let mut out = String::new();

    writeln!(
        &mut out,
        "summary: {} ({}) elapsed {}",
        report.scenario,
        report.end,
        format_duration(report.elapsed)
    )
    .ok();

    for (tag, s) in report.snapshot.tags() {
        writeln!(&mut out, "tag: {tag}").ok();
        render_series(s, &mut out);
    }

    let global = report.snapshot.global();
    out.push_str("totals\n");
    render_series(global, &mut out);

    let secs = report.elapsed.as_secs_f64().max(1e-9);
    writeln!(
        &mut out,
        "  rates: rps={} dispatched={} dropped={}",
        format_rate(global.total() as f64 / secs),
        report.dispatched,
        report.dropped
    )
    .ok();
    writeln!(
        &mut out,
        "  workers: created={} peak={} max={}",
        report.pool.size, report.pool.peak_in_use, report.pool.max
    )
    .ok();
    if report.grace_expired {
        writeln!(
            &mut out,
            "  grace period expired: {} probes abandoned",
            report.abandoned()
        )
        .ok();
    }

    if !report.verdict.results.is_empty() {
        out.push_str("thresholds\n");
        for r in &report.verdict.results {
            let observed = r
                .observed
                .map_or_else(|| "-".to_string(), |v| format!("{v:.3}"));
            writeln!(
                &mut out,
                "  [{}] {} (observed {observed})",
                r.status, r.threshold
            )
            .ok();
        }
    }

    let verdict = match report.end {
        RunEnd::Cancelled => "CANCELLED",
        _ if report.passed() => "PASS",
        _ => "FAIL",
    };
    writeln!(&mut out, "verdict: {verdict}").ok();

    out
}

fn render_series(s: &SeriesSummary, out: &mut String) {
    writeln!(
        out,
        "  requests: {} (failed {}, error rate {})",
        s.total(),
        s.failed(),
        format_percent(s.error_rate())
    )
    .ok();

    let breakdown = OutcomeKind::ALL
        .iter()
        .filter(|k| !k.is_success())
        .filter_map(|k| {
            let n = s.count(*k);
            (n > 0).then(|| format!("{k}={n}"))
        })
        .collect::<Vec<_>>();
    if !breakdown.is_empty() {
        writeln!(out, "  failures: {}", breakdown.join(" ")).ok();
    }

    if s.sample_count() == 0 {
        out.push_str("  latency: n/a\n");
        return;
    }

    let ms = |stat| format_ms(Metric::Latency(stat).value(s));
    writeln!(
        out,
        "  latency: p50={} p90={} p95={} p99={} mean={} max={} (n={})",
        ms(LatencyStat::Med),
        ms(LatencyStat::Percentile(90.0)),
        ms(LatencyStat::Percentile(95.0)),
        ms(LatencyStat::Percentile(99.0)),
        ms(LatencyStat::Avg),
        ms(LatencyStat::Max),
        s.sample_count()
    )
    .ok();
}
