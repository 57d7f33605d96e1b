mod cli;
mod exit_codes;
mod export_scenario;
mod output;
mod presets;
mod run;
mod run_error;
mod scenario_yaml;
mod target;

use clap::Parser;
use mimalloc::MiMalloc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Diagnostics go to stderr so `--output json` keeps stdout machine-readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = match cli::Cli::try_parse() {
        Ok(v) => v,
        Err(err) => {
            use clap::error::ErrorKind;
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    exit_codes::ExitCode::Success.as_i32()
                }
                _ => exit_codes::ExitCode::InvalidInput.as_i32(),
            };
            std::process::exit(code);
        }
    };

    init_tracing();

    let res = match cli.command {
        cli::Command::Run(args) => run::run(args).await,
        cli::Command::Export(args) => export_scenario::export_scenario(args).await,
    };

    let code = match res {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err}");
            err.exit_code()
        }
    };

    std::process::exit(code.as_i32());
}
