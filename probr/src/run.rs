use probr_core::{
    CancellationToken, HttpProber, Plan, RunConfig, RunContext, RunOptions,
    compile_threshold_sets, scenario_from_options,
};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;
use crate::scenario_yaml::{self, LoadedScenario};

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);
    let plan = build_plan(&args).await?;

    out.print_header(&plan);

    let cancel = CancellationToken::new();
    let ctrl_c = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let mut ctx = RunContext::new().with_cancel(cancel);
    if let Some(progress) = out.progress() {
        ctx = ctx.with_progress(progress);
    }

    let report = probr_core::run(&plan, HttpProber::default(), ctx).await;
    ctrl_c.abort();

    out.print_summary(&report)
        .map_err(|e| RunError::runtime(e, "failed to write summary"))?;

    Ok(ExitCode::from_report(&report))
}

/// Resolves the scenario source, applies CLI overrides and validates everything up front.
async fn build_plan(args: &RunArgs) -> Result<Plan, RunError> {
    let loaded = load_scenario(args).await?;

    let cfg = RunConfig {
        vus: args.vus,
        duration: args.duration,
    };
    let scenario = scenario_from_options(loaded.options, cfg)
        .map_err(|e| RunError::invalid(e, "invalid scenario config"))?;
    let thresholds = compile_threshold_sets(&loaded.thresholds)
        .map_err(|e| RunError::invalid(e, "invalid thresholds"))?;
    let endpoint = args
        .target
        .endpoint()
        .map_err(|e| RunError::invalid(e, "invalid target"))?;

    Plan::new(scenario, thresholds, run_options(args), endpoint)
        .map_err(|e| RunError::invalid(e, "invalid run configuration"))
}

async fn load_scenario(args: &RunArgs) -> Result<LoadedScenario, RunError> {
    match &args.scenario {
        Some(path) => scenario_yaml::load_scenario_file(path)
            .await
            .map_err(|e| RunError::invalid(e, "invalid scenario file")),
        None => {
            let preset = args.preset.unwrap_or_default();
            tracing::debug!(%preset, "using built-in preset");
            scenario_yaml::resolve_doc(preset.document(), None)
                .map_err(|e| RunError::invalid(e, "invalid preset"))
        }
    }
}

fn run_options(args: &RunArgs) -> RunOptions {
    let defaults = RunOptions::default();
    RunOptions {
        probe_timeout: args.timeout.unwrap_or(defaults.probe_timeout),
        tick: args.tick.unwrap_or(defaults.tick),
        grace_period: args.grace_period.unwrap_or(defaults.grace_period),
        ..defaults
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::warn!("interrupted, stopping run");
            cancel.cancel();
        }
        Err(err) => tracing::error!(error = %err, "failed to listen for Ctrl-C"),
    }
}
