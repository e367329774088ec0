//! Comprobador: command-line front end for Comprobar
//!
//! Runs scenario files in batch, validates them offline, and inspects the
//! selector table and login state machine.

#![warn(missing_docs)]

mod commands;
mod config;
mod error;
pub mod handlers;
pub mod logging;
mod output;

pub use commands::{
    Cli, ColorArg, Commands, DiagramFormat, MachineArgs, RefsArgs, RefsFormat, RunArgs,
    ValidateArgs,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult, EXIT_SCENARIO_FAILURE, EXIT_USAGE};
pub use output::ProgressReporter;
