use crate::cli::ExportArgs;
use crate::exit_codes::ExitCode;
use crate::run_error::RunError;
use crate::scenario_yaml;

pub async fn export_scenario(args: ExportArgs) -> Result<ExitCode, RunError> {
    if !scenario_yaml::looks_like_yaml_path(&args.out) {
        return Err(RunError::invalid(
            anyhow::anyhow!("{} does not end in .yaml or .yml", args.out.display()),
            "invalid output file",
        ));
    }

    let doc = args.preset.document();
    scenario_yaml::write_yaml_file(&args.out, &doc)
        .await
        .map_err(|e| RunError::runtime(e, "failed to write scenario YAML"))?;

    tracing::info!(preset = %args.preset, out = %args.out.display(), "scenario exported");
    Ok(ExitCode::Success)
}
