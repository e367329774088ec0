//! Run-time state of one scenario execution.

use crate::login::{LoginAttempt, LoginState};
use crate::report::StepResult;
use crate::scenario::Role;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Screen the session believes the application is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalView {
    /// Entry page with the two access buttons
    Landing,
    /// Staff sign-in choice
    RolePicker,
    /// Staff username/password form
    ManualForm,
    /// Student name form
    StudentForm,
    /// Handed off to the external identity provider
    SsoPending,
    /// Signed-in home for a role
    Dashboard(Role),
    /// After a rejected login or an unmodelled page
    Unknown,
}

impl LogicalView {
    /// View implied by a login state
    #[must_use]
    pub const fn for_login_state(state: LoginState) -> Self {
        match state {
            LoginState::AnonymousLanding => Self::Landing,
            LoginState::StudentCredentialForm => Self::StudentForm,
            LoginState::RolePicker => Self::RolePicker,
            LoginState::ManualCredentialForm => Self::ManualForm,
            LoginState::ExternalSsoPending => Self::SsoPending,
            LoginState::AuthenticatedStudent => Self::Dashboard(Role::Student),
            LoginState::AuthenticatedTeacher => Self::Dashboard(Role::Teacher),
            LoginState::AuthenticatedSuperAdmin => Self::Dashboard(Role::SuperAdmin),
            LoginState::LoginFailed => Self::Unknown,
        }
    }
}

impl fmt::Display for LogicalView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Landing => f.write_str("landing"),
            Self::RolePicker => f.write_str("role-picker"),
            Self::ManualForm => f.write_str("manual-form"),
            Self::StudentForm => f.write_str("student-form"),
            Self::SsoPending => f.write_str("sso-pending"),
            Self::Dashboard(role) => write!(f, "dashboard({role})"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Authentication and view state for one in-progress scenario.
///
/// Created when a scenario starts and dropped when it ends. Results are
/// append-only.
#[derive(Debug, Clone)]
pub struct Session {
    scenario: String,
    login_state: LoginState,
    view: LogicalView,
    results: Vec<StepResult>,
}

impl Session {
    /// Fresh anonymous session
    #[must_use]
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            login_state: LoginState::INITIAL,
            view: LogicalView::Landing,
            results: Vec::new(),
        }
    }

    /// Scenario name
    #[must_use]
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    /// Signed-in role, `Anonymous` when nobody is
    #[must_use]
    pub fn role(&self) -> Role {
        self.login_state.role().unwrap_or(Role::Anonymous)
    }

    /// Current login state
    #[must_use]
    pub const fn login_state(&self) -> LoginState {
        self.login_state
    }

    /// Current logical view
    #[must_use]
    pub const fn view(&self) -> LogicalView {
        self.view
    }

    /// Adopt the outcome of a login attempt
    pub fn apply_login(&mut self, attempt: &LoginAttempt) {
        self.login_state = attempt.reached;
        self.view = LogicalView::for_login_state(attempt.reached);
    }

    /// A page load discards unfinished login forms; a signed-in session survives
    pub fn note_navigation(&mut self) {
        if !self.login_state.is_authenticated() {
            self.login_state = LoginState::AnonymousLanding;
            self.view = LogicalView::Landing;
        }
    }

    /// Append a step result
    pub fn record(&mut self, result: StepResult) {
        self.results.push(result);
    }

    /// Results so far
    #[must_use]
    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    /// Consume the session, keeping its results
    #[must_use]
    pub fn into_results(self) -> Vec<StepResult> {
        self.results
    }
}
