//! Scenario runner.
//!
//! Executes one scenario against one driver, strictly in order, stopping at
//! the first step that does not pass.
//!
//! ```text
//! ┌──────────┐  step   ┌────────────────────────────────────────┐
//! │ Scenario │ ──────▶ │ navigate / authenticate / assert / ... │
//! └──────────┘         └───────────────────┬────────────────────┘
//!                                          │ StepResult
//!                      ┌───────────────────▼────────────────────┐
//!                      │ Session (append-only) ──▶ ReportSink   │
//!                      └───────────────────┬────────────────────┘
//!                          failed/errored  │ forensic capture
//!                                          ▼
//!                                   ScenarioReport
//! ```
//!
//! A scenario deadline and an external [`CancellationToken`] both abort the
//! in-flight driver call; the current step is then recorded as cancelled.

use crate::assertion::{AssertionEngine, Expectation, Outcome};
use crate::capture::ArtifactStore;
use crate::config::HarnessConfig;
use crate::driver::{ArtifactRef, Driver};
use crate::login::{AuthRequest, Authenticator, LoginMachine, LoginState};
use crate::report::{ReportSink, ScenarioReport, StepOutcome, StepResult};
use crate::result::{ComprobarResult, FailureKind};
use crate::scenario::{AuthMethod, Interaction, Role, Scenario, Step, Variables};
use crate::selector::{SelectorResolver, UiRef};
use crate::session::Session;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on a forensic capture after a failure
pub const FORENSIC_CAPTURE_TIMEOUT_MS: u64 = 5000;

/// Label of the trailing expected-state record
pub const FINAL_STATE_LABEL: &str = "final-state";

/// Outcome of executing one step, before it is stamped
struct StepRun {
    outcome: StepOutcome,
    artifacts: Vec<ArtifactRef>,
}

impl StepRun {
    const fn passed() -> Self {
        Self {
            outcome: StepOutcome::Passed,
            artifacts: Vec::new(),
        }
    }

    fn failed(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            outcome: StepOutcome::from_kind(kind, detail),
            artifacts: Vec::new(),
        }
    }
}

impl From<Outcome> for StepRun {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Satisfied => Self::passed(),
            Outcome::Failed { kind, detail } | Outcome::Errored { kind, detail } => {
                Self::failed(kind, detail)
            }
        }
    }
}

/// Runs scenarios against drivers
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    config: HarnessConfig,
    resolver: SelectorResolver,
    engine: AssertionEngine,
    machine: LoginMachine,
    store: ArtifactStore,
    variables: Variables,
}

impl ScenarioRunner {
    /// Build a runner from configuration, loading selector overrides
    ///
    /// # Errors
    ///
    /// Returns error if a selector override table cannot be loaded
    pub fn new(config: HarnessConfig) -> ComprobarResult<Self> {
        let resolver = config.resolver()?;
        Ok(Self::with_resolver(config, resolver))
    }

    /// Build a runner with an explicit resolver
    #[must_use]
    pub fn with_resolver(config: HarnessConfig, resolver: SelectorResolver) -> Self {
        Self {
            engine: config.engine(),
            store: ArtifactStore::new(&config.artifacts_dir),
            variables: config.variables(),
            machine: LoginMachine::standard(),
            resolver,
            config,
        }
    }

    /// Replace the placeholder values
    #[must_use]
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Active resolver
    #[must_use]
    pub const fn resolver(&self) -> &SelectorResolver {
        &self.resolver
    }

    /// Artifact layout
    #[must_use]
    pub const fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Run a scenario with no external cancellation
    pub async fn run(
        &self,
        scenario: &Scenario,
        driver: &mut dyn Driver,
        sink: &mut dyn ReportSink,
    ) -> ScenarioReport {
        self.run_until(scenario, driver, sink, &CancellationToken::new())
            .await
    }

    /// Run a scenario, aborting when `cancel` fires or the deadline passes.
    ///
    /// The driver is borrowed; releasing it is the caller's job.
    pub async fn run_until(
        &self,
        scenario: &Scenario,
        driver: &mut dyn Driver,
        sink: &mut dyn ReportSink,
        cancel: &CancellationToken,
    ) -> ScenarioReport {
        self.run_from(scenario, driver, sink, cancel, (Utc::now(), Instant::now()))
            .await
    }

    /// Like [`Self::run_until`] with the deadline counted from `start`, so
    /// time spent launching the driver is charged to the scenario
    pub(crate) async fn run_from(
        &self,
        scenario: &Scenario,
        driver: &mut dyn Driver,
        sink: &mut dyn ReportSink,
        cancel: &CancellationToken,
        (started_at, start): (DateTime<Utc>, Instant),
    ) -> ScenarioReport {
        let deadline = start + self.config.scenario_deadline();
        let mut session = Session::new(&scenario.name);
        info!(scenario = %scenario.name, steps = scenario.steps.len(), "scenario started");

        let mut halted = false;
        for (index, step) in scenario.steps.iter().enumerate() {
            let label = step.label();
            let step_start = Instant::now();
            debug!(scenario = %scenario.name, step = index, %label, "step started");

            let run = {
                let exec = tokio::time::timeout_at(
                    deadline,
                    self.execute(scenario, index, step, &mut *driver, &mut session),
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        StepRun::failed(FailureKind::Cancelled, "scenario cancelled")
                    }
                    res = exec => res.unwrap_or_else(|_| {
                        StepRun::failed(
                            FailureKind::Cancelled,
                            format!(
                                "scenario deadline of {}ms exceeded",
                                self.config.scenario_deadline_ms
                            ),
                        )
                    }),
                }
            };

            let ui_ref = step.target().cloned();
            let result = self
                .finish_step(scenario, index, &label, ui_ref, run, step_start, driver)
                .await;
            halted = !result.outcome.is_passed();
            self.record(&mut session, sink, result);
            if halted {
                break;
            }
        }

        if !halted {
            if let Some(expected) = scenario.expect {
                self.check_final_state(scenario, expected, driver, &mut session, sink)
                    .await;
            }
        }

        let final_state = session.login_state();
        let report = ScenarioReport::new(
            &scenario.name,
            scenario.expect,
            final_state,
            session.into_results(),
            started_at,
            start.elapsed(),
        );
        if let Err(err) = sink.flush(&report) {
            warn!(scenario = %scenario.name, error = %err, "report sink flush failed");
        }
        info!(
            scenario = %scenario.name,
            status = %report.status,
            state = %final_state,
            duration_ms = report.duration_ms,
            "scenario finished"
        );
        report
    }

    async fn execute(
        &self,
        scenario: &Scenario,
        index: usize,
        step: &Step,
        driver: &mut dyn Driver,
        session: &mut Session,
    ) -> StepRun {
        match step {
            Step::Navigate { url } => {
                let url = self.config.resolve_url(url);
                match driver.navigate(&url).await {
                    Ok(()) => {
                        session.note_navigation();
                        StepRun::passed()
                    }
                    Err(err) => StepRun::failed(err.failure_kind(), err.to_string()),
                }
            }
            Step::AuthenticateAs {
                role,
                method,
                username,
                password,
            } => {
                let credentials = (username.as_deref(), password.as_deref());
                self.authenticate(*role, *method, credentials, driver, session)
                    .await
            }
            Step::AssertVisible { target, timeout_ms } => {
                self.assert(driver, target, Expectation::Visible, *timeout_ms)
                    .await
            }
            Step::AssertNotVisible { target, timeout_ms } => {
                self.assert(driver, target, Expectation::NotVisible, *timeout_ms)
                    .await
            }
            Step::Interact { target, action } => self.interact(driver, target, action).await,
            Step::Capture { label } => {
                match self.store.capture(driver, &scenario.name, index, label).await {
                    Ok(artifacts) => {
                        info!(scenario = %scenario.name, step = index, %label, "captured");
                        StepRun {
                            outcome: StepOutcome::Passed,
                            artifacts,
                        }
                    }
                    Err(err) => StepRun::failed(err.failure_kind(), err.to_string()),
                }
            }
            Step::Pause { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                StepRun::passed()
            }
        }
    }

    async fn authenticate(
        &self,
        role: Role,
        method: AuthMethod,
        (username, password): (Option<&str>, Option<&str>),
        driver: &mut dyn Driver,
        session: &mut Session,
    ) -> StepRun {
        let substitute =
            |value: Option<&str>| value.map(|v| self.variables.substitute(v)).transpose();
        let (username, password) = match (substitute(username), substitute(password)) {
            (Ok(u), Ok(p)) => (u, p),
            (Err(err), _) | (_, Err(err)) => {
                return StepRun::failed(FailureKind::TransportFault, err.to_string())
            }
        };
        let request = AuthRequest {
            role,
            method,
            username,
            password,
        };

        // Forms and the SSO hand-off do not survive a reload; start over.
        let from = session.login_state();
        if !from.is_authenticated() && from != LoginState::AnonymousLanding {
            if let Err(err) = driver.navigate(&self.config.resolve_url("/")).await {
                return StepRun::failed(err.failure_kind(), err.to_string());
            }
            session.note_navigation();
        }

        let authenticator = Authenticator::new(&self.machine, &self.resolver, &self.engine)
            .with_guard_probe(self.config.guard_probe())
            .with_outcome_timeout(self.config.login_timeout())
            .with_resolve_budget(self.config.resolve_budget())
            .with_poll_interval(self.config.poll_interval());

        match authenticator
            .authenticate(driver, session.login_state(), &request)
            .await
        {
            Ok(attempt) => {
                session.apply_login(&attempt);
                let expected = expected_login_state(role, method);
                info!(
                    scenario = %session.scenario(),
                    %role,
                    state = %attempt.reached,
                    path = %attempt.path_string(),
                    "authentication finished"
                );
                if attempt.reached == expected {
                    StepRun::passed()
                } else {
                    StepRun::failed(
                        FailureKind::RoleMismatch,
                        format!(
                            "role mismatch: expected {expected}, reached {} ({})",
                            attempt.reached,
                            attempt.path_string()
                        ),
                    )
                }
            }
            Err(err) => StepRun::failed(err.failure_kind(), err.to_string()),
        }
    }

    async fn assert(
        &self,
        driver: &dyn Driver,
        target: &UiRef,
        expectation: Expectation,
        timeout_ms: Option<u64>,
    ) -> StepRun {
        let timeout =
            timeout_ms.map_or_else(|| self.config.assert_timeout(), Duration::from_millis);
        self.engine
            .await_condition(driver, &self.resolver, target, expectation, timeout)
            .await
            .into()
    }

    async fn interact(
        &self,
        driver: &mut dyn Driver,
        target: &UiRef,
        action: &Interaction,
    ) -> StepRun {
        let located = match self
            .resolver
            .locate(&*driver, target, self.config.resolve_budget())
            .await
        {
            Ok(located) => located,
            Err(err) => return StepRun::failed(err.failure_kind(), err.to_string()),
        };
        let result = match action {
            Interaction::Click => driver.click(&located.selector).await,
            Interaction::Fill { text } => match self.variables.substitute(text) {
                Ok(text) => driver.fill(&located.selector, &text).await,
                Err(err) => return StepRun::failed(FailureKind::TransportFault, err.to_string()),
            },
        };
        match result {
            Ok(()) => StepRun::passed(),
            Err(err) => StepRun::failed(err.failure_kind(), err.to_string()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish_step(
        &self,
        scenario: &Scenario,
        index: usize,
        label: &str,
        ui_ref: Option<UiRef>,
        mut run: StepRun,
        started: Instant,
        driver: &mut dyn Driver,
    ) -> StepResult {
        if !run.outcome.is_passed() {
            warn!(
                scenario = %scenario.name,
                step = index,
                %label,
                kind = ?run.outcome.kind(),
                detail = run.outcome.detail().unwrap_or_default(),
                "step did not pass"
            );
            if run.artifacts.is_empty() {
                run.artifacts = self.forensic_capture(scenario, index, driver).await;
            }
        }
        StepResult::new(index, label, run.outcome, started.elapsed())
            .with_ref(ui_ref)
            .with_artifacts(run.artifacts)
    }

    async fn check_final_state(
        &self,
        scenario: &Scenario,
        expected: Role,
        driver: &mut dyn Driver,
        session: &mut Session,
        sink: &mut dyn ReportSink,
    ) {
        let started = Instant::now();
        let index = scenario.steps.len();
        let actual = session.role();
        let run = if actual == expected {
            StepRun::passed()
        } else {
            StepRun::failed(
                FailureKind::FinalStateMismatch,
                format!(
                    "expected final role {expected}, session ended as {actual} ({})",
                    session.login_state()
                ),
            )
        };
        let result = self
            .finish_step(scenario, index, FINAL_STATE_LABEL, None, run, started, driver)
            .await;
        self.record(session, sink, result);
    }

    async fn forensic_capture(
        &self,
        scenario: &Scenario,
        index: usize,
        driver: &mut dyn Driver,
    ) -> Vec<ArtifactRef> {
        let capture = self.store.capture(driver, &scenario.name, index, "failure");
        let limit = Duration::from_millis(FORENSIC_CAPTURE_TIMEOUT_MS);
        match tokio::time::timeout(limit, capture).await {
            Ok(Ok(artifacts)) => artifacts,
            Ok(Err(err)) => {
                warn!(
                    scenario = %scenario.name,
                    step = index,
                    error = %err,
                    "forensic capture failed"
                );
                Vec::new()
            }
            Err(_) => {
                warn!(scenario = %scenario.name, step = index, "forensic capture timed out");
                Vec::new()
            }
        }
    }

    fn record(&self, session: &mut Session, sink: &mut dyn ReportSink, result: StepResult) {
        if let Err(err) = sink.record(session.scenario(), &result) {
            warn!(
                scenario = %session.scenario(),
                step = result.index,
                error = %err,
                "report sink rejected result"
            );
        }
        session.record(result);
    }
}

/// State a successful `authenticate_as` ends in
#[must_use]
pub const fn expected_login_state(role: Role, method: AuthMethod) -> LoginState {
    match (role, method) {
        (Role::Teacher | Role::SuperAdmin, AuthMethod::Sso) => LoginState::ExternalSsoPending,
        _ => LoginState::for_role(role),
    }
}
