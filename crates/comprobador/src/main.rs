//! Comprobador CLI: run role-aware UI verification scenarios
//!
//! ## Usage
//!
//! ```bash
//! comprobador run scenarios/*.yaml           # Run against the default base URL
//! comprobador run suite.yaml -j 2 -r out.json # Two browsers, JSON batch report
//! comprobador validate scenarios/*.yaml      # Parse and check refs offline
//! comprobador refs                           # List the selector table
//! comprobador machine --format dot           # Login state machine as DOT
//! ```

use clap::Parser;
use comprobador::{
    handlers, logging, Cli, CliConfig, CliError, CliResult, ColorChoice, Commands, RunArgs,
    Verbosity,
};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::warn;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = build_config(&cli);
    if let Err(e) = logging::init_logging(&config) {
        eprintln!("Error: {e}");
    }

    match run(&config, cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let color: ColorChoice = cli.color.into();
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(color)
        .with_log_json(cli.log_json)
}

fn run(config: &CliConfig, command: Commands) -> CliResult<ExitCode> {
    match command {
        Commands::Run(args) => run_scenarios(config, &args),
        Commands::Validate(args) => {
            handlers::execute_validate(config, &args)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Refs(args) => {
            handlers::execute_refs(&args)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Machine(args) => {
            handlers::execute_machine(&args)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_scenarios(config: &CliConfig, args: &RunArgs) -> CliResult<ExitCode> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::config(format!("Failed to create runtime: {e}")))?;

    rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling running scenarios");
                on_signal.cancel();
            }
        });

        let report = handlers::execute_run(config, args, &cancel).await?;
        let code = u8::try_from(report.exit_code()).unwrap_or(comprobador::EXIT_SCENARIO_FAILURE);
        Ok(ExitCode::from(code))
    })
}
