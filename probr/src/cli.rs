use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::presets::Preset;
use crate::target::TargetArgs;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    // Bare numbers are seconds.
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}' ({err}; expected e.g. 10s, 250ms, 1m)"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable progress and summary.
    HumanReadable,
    /// Emit JSON progress and summary lines (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "probr",
    author,
    version,
    about = "Synthetic availability and latency probing for HTTP APIs",
    long_about = "probr drives synthetic traffic against an HTTP API, measures every request, and judges the run against thresholds.\n\nA scenario is either a fixed number of virtual users looping over the targets, or a staged arrival-rate curve served by a bounded worker pool. The exit code is the verdict.",
    after_help = "Examples:\n  probr run --preset smoke\n  probr run --preset stress --base-url https://api.example.com\n  probr run scenario.yaml --vus 5 --duration 1m --output json\n  probr export --preset stress stress.yaml\n\nExit codes: 0 pass, 11 thresholds failed, 13 cancelled, 30 invalid input, 40 runtime error"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a scenario and judge it against its thresholds
    #[command(
        long_about = "Run a scenario file or a built-in preset (smoke when neither is given).\n\n--vus/--duration override the scenario and turn an arrival-rate curve into a constant-VU run."
    )]
    Run(RunArgs),

    /// Write a built-in preset as an editable scenario YAML file
    Export(ExportArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to a scenario file (.yaml/.yml)
    pub scenario: Option<PathBuf>,

    /// Built-in scenario to run instead of a file
    #[arg(long, value_enum, conflicts_with = "scenario")]
    pub preset: Option<Preset>,

    /// Number of virtual users (forces the constant-vus executor)
    #[arg(long)]
    pub vus: Option<u64>,

    /// Test duration (e.g. 10s, 250ms, 1m; forces the constant-vus executor)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Per-probe timeout [default: 60s]
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// How long in-flight probes may finish after the schedule ends [default: 30s]
    #[arg(long, value_parser = parse_duration)]
    pub grace_period: Option<Duration>,

    /// Arrival scheduler tick, at most 100ms [default: 10ms]
    #[arg(long, value_parser = parse_duration)]
    pub tick: Option<Duration>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Preset to export
    #[arg(long, value_enum)]
    pub preset: Preset,

    /// Output file (.yaml/.yml)
    pub out: PathBuf,
}
