//! Concurrent execution of many scenarios.
//!
//! Each scenario gets its own driver from a [`DriverFactory`] and its own
//! session; no two scenarios share a browser or an artifact directory.
//! Launching counts against the scenario deadline, and every driver the
//! factory hands out is closed before its scenario's report is returned.

use crate::driver::Driver;
use crate::login::LoginState;
use crate::report::{
    BatchReport, JsonSink, MemorySink, ReportSink, ScenarioReport, StepOutcome, StepResult,
};
use crate::result::{ComprobarError, ComprobarResult};
use crate::runner::ScenarioRunner;
use crate::scenario::Scenario;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Upper bound on releasing a driver after its scenario
pub const DRIVER_CLOSE_TIMEOUT_MS: u64 = 5000;

/// Hands out a fresh driver per scenario
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Launch or connect a new driver
    async fn create(&self) -> ComprobarResult<Box<dyn Driver>>;
}

/// Runs scenarios concurrently, bounded by `max_concurrency`
#[derive(Clone)]
pub struct BatchRunner {
    runner: ScenarioRunner,
    factory: Arc<dyn DriverFactory>,
}

impl std::fmt::Debug for BatchRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRunner")
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}

impl BatchRunner {
    /// Create a batch runner
    #[must_use]
    pub fn new(runner: ScenarioRunner, factory: Arc<dyn DriverFactory>) -> Self {
        Self { runner, factory }
    }

    /// The per-scenario runner
    #[must_use]
    pub const fn runner(&self) -> &ScenarioRunner {
        &self.runner
    }

    /// Run every scenario; reports keep the input order
    pub async fn run(&self, scenarios: &[Scenario], cancel: &CancellationToken) -> BatchReport {
        self.run_observed(scenarios, cancel, |_| {}).await
    }

    /// Like [`Self::run`], calling `on_finished` as each scenario completes
    pub async fn run_observed<F>(
        &self,
        scenarios: &[Scenario],
        cancel: &CancellationToken,
        on_finished: F,
    ) -> BatchReport
    where
        F: Fn(&ScenarioReport) + Sync,
    {
        let started_at = Utc::now();
        let start = Instant::now();
        let jobs = self.runner.config().max_concurrency.max(1);
        info!(scenarios = scenarios.len(), jobs, "batch started");

        let mut owners: HashMap<String, &str> = HashMap::with_capacity(scenarios.len());
        let claims: Vec<Option<&str>> = scenarios
            .iter()
            .map(|scenario| {
                let slug = scenario.slug();
                if let Some(first) = owners.get(&slug) {
                    return Some(*first);
                }
                owners.insert(slug, &scenario.name);
                None
            })
            .collect();

        let on_finished = &on_finished;
        let mut indexed: Vec<(usize, ScenarioReport)> =
            stream::iter(scenarios.iter().zip(claims).enumerate())
                .map(|(index, (scenario, taken_by))| async move {
                    let report = match taken_by {
                        Some(first) => Self::collision(scenario, first),
                        None => self.run_one(scenario, cancel).await,
                    };
                    on_finished(&report);
                    (index, report)
                })
                .buffer_unordered(jobs)
                .collect()
                .await;
        indexed.sort_by_key(|(index, _)| *index);

        let report = BatchReport::new(
            started_at,
            start.elapsed(),
            indexed.into_iter().map(|(_, report)| report).collect(),
        );
        info!(run_id = %report.run_id, summary = %report.summary_line(), "batch finished");
        report
    }

    fn sink(&self) -> Box<dyn ReportSink> {
        if self.runner.config().write_reports {
            Box::new(JsonSink::new(&self.runner.config().artifacts_dir))
        } else {
            Box::new(MemorySink::new())
        }
    }

    async fn run_one(&self, scenario: &Scenario, cancel: &CancellationToken) -> ScenarioReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut sink = self.sink();

        let deadline_ms = self.runner.config().scenario_deadline_ms;
        let launch = tokio::time::timeout_at(
            start + self.runner.config().scenario_deadline(),
            self.factory.create(),
        );
        let launched = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                Err(ComprobarError::cancelled("scenario cancelled during driver launch"))
            }
            res = launch => res.unwrap_or_else(|_| {
                Err(ComprobarError::cancelled(format!(
                    "driver launch exceeded the {deadline_ms}ms scenario deadline"
                )))
            }),
        };

        let mut driver = match launched {
            Ok(driver) => driver,
            Err(err) => {
                error!(scenario = %scenario.name, error = %err, "driver unavailable");
                let step = StepResult::new(
                    0,
                    "launch driver",
                    StepOutcome::from_kind(err.failure_kind(), err.to_string()),
                    start.elapsed(),
                );
                return Self::settle(scenario, sink.as_mut(), vec![step], started_at, start);
            }
        };

        let report = self
            .runner
            .run_from(scenario, driver.as_mut(), sink.as_mut(), cancel, (started_at, start))
            .await;

        let close_timeout = Duration::from_millis(DRIVER_CLOSE_TIMEOUT_MS);
        match tokio::time::timeout(close_timeout, driver.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(
                scenario = %scenario.name,
                driver = driver.name(),
                error = %err,
                "driver close failed"
            ),
            Err(_) => warn!(
                scenario = %scenario.name,
                driver = driver.name(),
                timeout_ms = DRIVER_CLOSE_TIMEOUT_MS,
                "driver close timed out"
            ),
        }
        report
    }

    /// Report a scenario that ended before its first step ran
    fn settle(
        scenario: &Scenario,
        sink: &mut dyn ReportSink,
        steps: Vec<StepResult>,
        started_at: DateTime<Utc>,
        start: Instant,
    ) -> ScenarioReport {
        for step in &steps {
            if let Err(err) = sink.record(&scenario.name, step) {
                warn!(scenario = %scenario.name, error = %err, "report sink rejected result");
            }
        }
        let report = ScenarioReport::new(
            &scenario.name,
            scenario.expect,
            LoginState::INITIAL,
            steps,
            started_at,
            start.elapsed(),
        );
        if let Err(err) = sink.flush(&report) {
            warn!(scenario = %scenario.name, error = %err, "report sink flush failed");
        }
        report
    }

    /// Scenario that would reuse an earlier scenario's artifact directory
    fn collision(scenario: &Scenario, first: &str) -> ScenarioReport {
        let err = ComprobarError::invalid_scenario(format!(
            "'{}' shares the artifact directory '{}' with '{first}'",
            scenario.name,
            scenario.slug()
        ));
        warn!(scenario = %scenario.name, error = %err, "scenario skipped");
        let step = StepResult::new(
            0,
            "reserve artifact directory",
            StepOutcome::from_kind(err.failure_kind(), err.to_string()),
            Duration::ZERO,
        );
        ScenarioReport::new(
            &scenario.name,
            scenario.expect,
            LoginState::INITIAL,
            vec![step],
            Utc::now(),
            Duration::ZERO,
        )
    }
}
