//! Validate command handler.
//!
//! Parses scenario files and checks every reference against the selector
//! table, without launching a browser.

use super::load_harness_config;
use crate::commands::ValidateArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use comprobar::{load_scenarios, LoginMachine, SelectorTable};
use std::path::{Path, PathBuf};

/// Outcome of checking one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCheck {
    /// File checked
    pub path: PathBuf,
    /// Scenarios parsed from it
    pub scenarios: usize,
    /// Problems found; empty when the file is valid
    pub problems: Vec<String>,
}

impl FileCheck {
    /// No problems found
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Check one scenario file against a selector table
#[must_use]
pub fn validate_file(path: &Path, table: &SelectorTable) -> FileCheck {
    let mut check = FileCheck {
        path: path.to_path_buf(),
        scenarios: 0,
        problems: Vec::new(),
    };
    let scenarios = match load_scenarios(path) {
        Ok(scenarios) => scenarios,
        Err(e) => {
            check.problems.push(e.to_string());
            return check;
        }
    };
    check.scenarios = scenarios.len();
    for scenario in &scenarios {
        for ui_ref in scenario.unknown_refs(table) {
            check.problems.push(format!(
                "{}: unknown UI reference '{ui_ref}'",
                scenario.name
            ));
        }
    }
    check
}

/// Execute the validate command.
pub fn execute_validate(config: &CliConfig, args: &ValidateArgs) -> CliResult<Vec<FileCheck>> {
    let harness = load_harness_config(args.config.as_deref(), &args.selectors)?;
    let table = harness.selector_table()?;
    let reporter = ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());

    let machine = LoginMachine::standard().validate();
    for issue in &machine.issues {
        reporter.failure(&format!("login machine: {issue}"));
    }

    let checks: Vec<FileCheck> = args
        .files
        .iter()
        .map(|path| validate_file(path, &table))
        .collect();
    for check in &checks {
        if check.is_valid() {
            reporter.success(&format!(
                "{} ({} scenarios)",
                check.path.display(),
                check.scenarios
            ));
        } else {
            reporter.failure(&check.path.display().to_string());
            for problem in &check.problems {
                reporter.failure(&format!("  {problem}"));
            }
        }
    }

    let invalid = checks.iter().filter(|c| !c.is_valid()).count();
    if invalid > 0 || !machine.is_valid() {
        return Err(CliError::validation(format!(
            "{invalid} of {} files have problems",
            checks.len()
        )));
    }
    Ok(checks)
}
