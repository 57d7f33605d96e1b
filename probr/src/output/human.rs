use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::{format_duration, format_ms, format_percent, format_rate};
use progress::HumanProgress;
use summary::render;

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, plan: &probr_core::Plan) {
        let s = plan.scenario();
        println!(
            "scenario: {} executor={} duration={} think_time={}",
            s.name,
            s.kind(),
            format_duration(s.total_duration()),
            format_duration(s.think_time)
        );
        println!("base_url: {}", plan.endpoint().base_url);
        for t in &s.targets {
            if t.tag == t.path {
                println!("  target: {}", t.path);
            } else {
                println!("  target: {} (tag {})", t.path, t.tag);
            }
        }
        for t in plan.thresholds() {
            println!("  threshold: {t}");
        }
        println!();
    }

    fn progress(&self) -> Option<probr_core::ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |u: probr_core::ProgressUpdate| {
            let m = &u.metrics;
            let rates = format!(
                " rps={} errors={}/{} ({}) p95={}",
                format_rate(m.rps_now),
                m.failed_total,
                m.requests_total,
                format_percent(m.error_rate),
                format_ms(m.latency_p95_ms)
            );

            let (total, message) = match &u.progress {
                probr_core::ScenarioProgress::ConstantVus { vus, duration } => (
                    *duration,
                    format!(
                        "{} vus={vus} elapsed={}{rates}",
                        u.state,
                        format_duration(u.elapsed)
                    ),
                ),
                probr_core::ScenarioProgress::RampingArrivalRate {
                    total_duration,
                    stage,
                    pool,
                    dropped_arrivals_total,
                    ..
                } => {
                    let mut msg = format!(
                        "{} workers={}/{} dropped={dropped_arrivals_total} elapsed={}{rates}",
                        u.state,
                        pool.in_use,
                        pool.max,
                        format_duration(u.elapsed)
                    );
                    if let Some(stage) = stage {
                        msg.push_str(&format!(
                            " stage={}/{} rate={:.2}",
                            stage.stage, stage.stages, stage.current_target
                        ));
                    }
                    (*total_duration, msg)
                }
            };

            progress.update(&u.scenario, total, u.elapsed, message);
        }))
    }

    fn print_summary(&self, report: &probr_core::RunReport) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(report));

        let violations: Vec<_> = report.verdict.violations().collect();
        if !violations.is_empty() {
            eprintln!("thresholds failed:");
            for v in violations {
                match v.observed {
                    Some(obs) => eprintln!("  {} (observed {obs})", v.threshold),
                    None => eprintln!("  {} (missing series)", v.threshold),
                }
            }
        }

        Ok(())
    }
}
