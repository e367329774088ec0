//! Run command handler.
//!
//! Orchestrates: load config -> apply flags -> load scenarios -> run batch ->
//! print and persist the report.

use super::load_harness_config;
use crate::commands::RunArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use comprobar::{
    check_unique_slugs, load_scenarios, BatchReport, BatchRunner, ComprobarError, DriverFactory,
    HarnessConfig, Scenario, ScenarioRunner,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Fold command-line flags over the loaded config
pub fn apply_run_overrides(mut config: HarnessConfig, args: &RunArgs) -> CliResult<HarnessConfig> {
    if let Some(ref url) = args.base_url {
        config = config.with_base_url(url.clone());
    }
    if let Some(ref dir) = args.artifacts {
        config = config.with_artifacts_dir(dir.clone());
    }
    if let Some(jobs) = args.jobs {
        if jobs == 0 {
            return Err(CliError::invalid_argument("--jobs must be at least 1"));
        }
        config = config.with_max_concurrency(jobs);
    }
    if let Some(ms) = args.deadline_ms {
        config = config.with_scenario_deadline(Duration::from_millis(ms));
    }
    if args.headed {
        config.driver.headless = false;
    }
    config.validate()?;
    Ok(config)
}

/// Load every scenario from every file, in argument order
pub fn load_all(files: &[impl AsRef<Path>]) -> CliResult<Vec<Scenario>> {
    let mut scenarios = Vec::new();
    for file in files {
        let file = file.as_ref();
        if !file.exists() {
            return Err(CliError::invalid_argument(format!(
                "scenario file not found: {}",
                file.display()
            )));
        }
        scenarios.extend(load_scenarios(file)?);
    }
    check_unique_slugs(&scenarios).map_err(ComprobarError::from)?;
    Ok(scenarios)
}

#[cfg(feature = "browser")]
fn driver_factory(config: &HarnessConfig) -> CliResult<Arc<dyn DriverFactory>> {
    Ok(Arc::new(comprobar::ChromiumFactory::new(config.driver.clone())))
}

#[cfg(not(feature = "browser"))]
fn driver_factory(_config: &HarnessConfig) -> CliResult<Arc<dyn DriverFactory>> {
    Err(CliError::config(
        "browser support not enabled. Rebuild with --features browser",
    ))
}

/// Execute the run command.
pub async fn execute_run(
    config: &CliConfig,
    args: &RunArgs,
    cancel: &CancellationToken,
) -> CliResult<BatchReport> {
    let harness = load_harness_config(args.config.as_deref(), &args.selectors)?;
    let harness = apply_run_overrides(harness, args)?;
    let scenarios = load_all(&args.files)?;

    let table = harness.selector_table()?;
    for scenario in &scenarios {
        let unknown = scenario.unknown_refs(&table);
        if !unknown.is_empty() {
            let unknown: Vec<String> = unknown.iter().map(ToString::to_string).collect();
            warn!(
                scenario = %scenario.name,
                refs = %unknown.join(", "),
                "refs missing from the selector table"
            );
        }
    }

    let factory = driver_factory(&harness)?;
    info!(
        scenarios = scenarios.len(),
        base_url = %harness.base_url,
        jobs = harness.max_concurrency,
        "starting run"
    );
    let batch = BatchRunner::new(ScenarioRunner::new(harness)?, factory);

    let mut reporter =
        ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet())
            .with_verbose(config.verbosity.is_verbose());
    reporter.header("Running Scenarios");
    reporter.start_progress(scenarios.len() as u64, "scenarios");
    let report = batch
        .run_observed(&scenarios, cancel, |scenario| reporter.scenario(scenario))
        .await;
    reporter.finish();
    reporter.summary(&report);

    if let Some(ref path) = args.report {
        if path.as_os_str() == "-" {
            let json = serde_json::to_string_pretty(&report).map_err(ComprobarError::from)?;
            println!("{json}");
        } else {
            report.write(path)?;
            reporter.info(&format!("report written to {}", path.display()));
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["run", "scenario.yaml"];
        argv.extend_from_slice(extra);
        RunArgs::parse_from(argv)
    }

    mod override_tests {
        use super::*;

        #[test]
        fn test_flags_override_config() {
            let config = apply_run_overrides(
                HarnessConfig::default(),
                &args(&[
                    "--base-url",
                    "http://127.0.0.1:4000",
                    "--jobs",
                    "8",
                    "--deadline-ms",
                    "30000",
                    "--artifacts",
                    "out",
                    "--headed",
                ]),
            )
            .unwrap();
            assert_eq!(config.base_url, "http://127.0.0.1:4000");
            assert_eq!(config.max_concurrency, 8);
            assert_eq!(config.scenario_deadline(), Duration::from_secs(30));
            assert_eq!(config.artifacts_dir, Path::new("out"));
            assert!(!config.driver.headless);
        }

        #[test]
        fn test_no_flags_keep_config() {
            let config = apply_run_overrides(HarnessConfig::default(), &args(&[])).unwrap();
            assert_eq!(config, HarnessConfig::default());
        }

        #[test]
        fn test_zero_jobs_rejected() {
            let err = apply_run_overrides(HarnessConfig::default(), &args(&["--jobs", "0"]))
                .unwrap_err();
            assert!(err.to_string().contains("--jobs"));
        }

        #[test]
        fn test_empty_base_url_rejected() {
            let err = apply_run_overrides(HarnessConfig::default(), &args(&["--base-url", " "]))
                .unwrap_err();
            assert!(err.to_string().contains("base_url"));
        }
    }

    mod load_tests {
        use super::*;

        #[test]
        fn test_load_all_keeps_order() {
            let dir = TempDir::new().unwrap();
            let suite = dir.path().join("suite.yaml");
            std::fs::write(
                &suite,
                "scenarios:\n  - name: one\n    steps:\n      - kind: navigate\n        url: /\n  - name: two\n    steps:\n      - kind: pause\n        ms: 1\n",
            )
            .unwrap();
            let single = dir.path().join("single.yaml");
            std::fs::write(
                &single,
                "name: three\nsteps:\n  - kind: capture\n    label: landing\n",
            )
            .unwrap();

            let scenarios = load_all(&[suite, single]).unwrap();
            let names: Vec<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
            assert_eq!(names, ["one", "two", "three"]);
        }

        #[test]
        fn test_same_slug_across_files_rejected() {
            let dir = TempDir::new().unwrap();
            let first = dir.path().join("teacher.yaml");
            std::fs::write(
                &first,
                "name: Acceso profesor\nsteps:\n  - kind: navigate\n    url: /\n",
            )
            .unwrap();
            let second = dir.path().join("teacher-again.yaml");
            std::fs::write(
                &second,
                "name: acceso-profesor\nsteps:\n  - kind: pause\n    ms: 1\n",
            )
            .unwrap();

            let err = load_all(&[first, second]).unwrap_err();
            assert_eq!(err.exit_code(), 2);
            assert!(err.to_string().contains("acceso-profesor"));
        }

        #[test]
        fn test_missing_file() {
            let err = load_all(&[Path::new("/nonexistent/s.yaml")]).unwrap_err();
            assert!(err.to_string().contains("scenario file not found"));
        }
    }
}
