//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Comprobador: run role-aware UI verification scenarios against a browser
#[derive(Parser, Debug)]
#[command(name = "comprobador")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run scenario files against a browser
    Run(RunArgs),

    /// Check scenario files without launching a browser
    Validate(ValidateArgs),

    /// List logical UI references and their selector strategies
    Refs(RefsArgs),

    /// Show the login state machine
    Machine(MachineArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Scenario files (one scenario or a suite per file)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Harness configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Base URL relative navigations resolve against
    #[arg(long)]
    pub base_url: Option<String>,

    /// Directory for screenshots, HTML snapshots and per-scenario reports
    #[arg(short, long)]
    pub artifacts: Option<PathBuf>,

    /// Scenarios run concurrently
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Wall-clock budget per scenario in milliseconds
    #[arg(long)]
    pub deadline_ms: Option<u64>,

    /// Extra selector table merged over the defaults (repeatable)
    #[arg(long = "selectors")]
    pub selectors: Vec<PathBuf>,

    /// Write the batch report as JSON to this path
    #[arg(short, long)]
    pub report: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Scenario files to check
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Harness configuration file (for selector overrides)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Extra selector table merged over the defaults (repeatable)
    #[arg(long = "selectors")]
    pub selectors: Vec<PathBuf>,
}

/// Arguments for the refs command
#[derive(Parser, Debug)]
pub struct RefsArgs {
    /// Harness configuration file (for selector overrides)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Extra selector table merged over the defaults (repeatable)
    #[arg(long = "selectors")]
    pub selectors: Vec<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: RefsFormat,
}

/// Output format for the refs command
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RefsFormat {
    /// One reference per line with its strategies
    #[default]
    Text,
    /// Selector table YAML, loadable with --selectors
    Yaml,
}

/// Arguments for the machine command
#[derive(Parser, Debug)]
pub struct MachineArgs {
    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: DiagramFormat,
}

/// Output format for the machine command
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DiagramFormat {
    /// Transition list and validation result
    #[default]
    Text,
    /// Graphviz DOT
    Dot,
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColorChoice;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "comprobador",
            "-v",
            "run",
            "a.yaml",
            "b.yaml",
            "--jobs",
            "2",
            "--base-url",
            "http://localhost:8080",
            "--selectors",
            "extra.yaml",
            "--headed",
        ]);
        assert_eq!(cli.verbose, 1);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.jobs, Some(2));
        assert_eq!(args.base_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(args.selectors, vec![PathBuf::from("extra.yaml")]);
        assert!(args.headed);
        assert!(args.report.is_none());
    }

    #[test]
    fn test_run_requires_files() {
        assert!(Cli::try_parse_from(["comprobador", "run"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["comprobador", "refs", "--color", "never", "--log-json"]);
        assert!(cli.log_json);
        assert_eq!(ColorChoice::from(cli.color), ColorChoice::Never);
    }

    #[test]
    fn test_formats() {
        let cli = Cli::parse_from(["comprobador", "machine", "--format", "dot"]);
        let Commands::Machine(args) = cli.command else {
            panic!("expected machine");
        };
        assert_eq!(args.format, DiagramFormat::Dot);

        let cli = Cli::parse_from(["comprobador", "refs", "-f", "yaml"]);
        let Commands::Refs(args) = cli.command else {
            panic!("expected refs");
        };
        assert_eq!(args.format, RefsFormat::Yaml);
    }
}
