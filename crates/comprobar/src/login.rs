//! Login state machine.
//!
//! The application's login flow is a small deterministic machine. The
//! transition table is static data ([`LoginMachine::standard`]); the
//! [`Authenticator`] walks it against a live driver, evaluating guards in a
//! fixed order so that the same page always yields the same path.
//!
//! ```text
//! AnonymousLanding --SelectStudentEntry--> StudentCredentialForm --SubmitStudent--> AuthenticatedStudent
//!        |                                          \--SubmitRejected--> LoginFailed
//!        \--SelectTeacherEntry--> RolePicker --ManualToggleClicked / ManualFormAlreadyOpen--> ManualCredentialForm
//!                                      \--ManualToggleAbsent--> ExternalSsoPending
//! ManualCredentialForm --SubmitResolvedSuperAdmin--> AuthenticatedSuperAdmin
//!                      --SubmitResolvedTeacher-->    AuthenticatedTeacher
//!                      --SubmitRejected-->           LoginFailed
//! Authenticated* --SignOut--> AnonymousLanding
//! ```

use crate::assertion::{AssertionEngine, Expectation, Outcome};
use crate::driver::{Driver, DEFAULT_POLL_INTERVAL_MS};
use crate::result::{ComprobarError, FailureKind};
use crate::scenario::{AuthMethod, Role};
use crate::selector::{ResolveError, SelectorResolver, UiRef};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::{self, Write as _};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// UI references the login flow depends on
pub mod refs {
    /// Landing button leading to the staff role picker
    pub const TEACHER_ENTRY: &str = "teacher-entry";
    /// Landing button leading to the student name form
    pub const STUDENT_ENTRY: &str = "student-entry";
    /// Role-picker control revealing the manual credential form
    pub const MANUAL_TOGGLE: &str = "manual-login-toggle";
    /// Manual form username field
    pub const MANUAL_USERNAME: &str = "manual-username";
    /// Manual form password field
    pub const MANUAL_PASSWORD: &str = "manual-password";
    /// Manual form submit control
    pub const MANUAL_SUBMIT: &str = "manual-submit";
    /// Student form name field
    pub const STUDENT_USERNAME: &str = "student-username";
    /// Student form submit control
    pub const STUDENT_SUBMIT: &str = "student-submit";
    /// Present only on the superadmin dashboard
    pub const SUPERADMIN_MARKER: &str = "superadmin-marker";
    /// Present only on the teacher dashboard
    pub const TEACHER_MARKER: &str = "teacher-marker";
    /// Present only on the student home
    pub const STUDENT_MARKER: &str = "student-marker";
    /// Sign-out control
    pub const LOGOUT: &str = "logout";

    /// Every reference used by the login flow
    pub const ALL: [&str; 12] = [
        TEACHER_ENTRY,
        STUDENT_ENTRY,
        MANUAL_TOGGLE,
        MANUAL_USERNAME,
        MANUAL_PASSWORD,
        MANUAL_SUBMIT,
        STUDENT_USERNAME,
        STUDENT_SUBMIT,
        SUPERADMIN_MARKER,
        TEACHER_MARKER,
        STUDENT_MARKER,
        LOGOUT,
    ];
}

/// Login flow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginState {
    /// Landing page, nobody signed in
    AnonymousLanding,
    /// Student name form shown
    StudentCredentialForm,
    /// Staff entry chosen; SSO widget and/or manual toggle shown
    RolePicker,
    /// Manual username/password form shown
    ManualCredentialForm,
    /// Waiting on the external identity provider
    ExternalSsoPending,
    /// Student home shown
    AuthenticatedStudent,
    /// Teacher dashboard shown
    AuthenticatedTeacher,
    /// Superadmin dashboard shown
    AuthenticatedSuperAdmin,
    /// Credentials rejected
    LoginFailed,
}

impl LoginState {
    /// Every state
    pub const ALL: [Self; 9] = [
        Self::AnonymousLanding,
        Self::StudentCredentialForm,
        Self::RolePicker,
        Self::ManualCredentialForm,
        Self::ExternalSsoPending,
        Self::AuthenticatedStudent,
        Self::AuthenticatedTeacher,
        Self::AuthenticatedSuperAdmin,
        Self::LoginFailed,
    ];

    /// Initial state
    pub const INITIAL: Self = Self::AnonymousLanding;

    /// States with no outgoing transitions
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::ExternalSsoPending | Self::LoginFailed)
    }

    /// Whether a user is signed in
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        self.role().is_some()
    }

    /// Signed-in role, if any
    #[must_use]
    pub const fn role(self) -> Option<Role> {
        match self {
            Self::AuthenticatedStudent => Some(Role::Student),
            Self::AuthenticatedTeacher => Some(Role::Teacher),
            Self::AuthenticatedSuperAdmin => Some(Role::SuperAdmin),
            _ => None,
        }
    }

    /// State reached by a successful login as `role`
    #[must_use]
    pub const fn for_role(role: Role) -> Self {
        match role {
            Role::Anonymous => Self::AnonymousLanding,
            Role::Student => Self::AuthenticatedStudent,
            Role::Teacher => Self::AuthenticatedTeacher,
            Role::SuperAdmin => Self::AuthenticatedSuperAdmin,
        }
    }

    /// State name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AnonymousLanding => "AnonymousLanding",
            Self::StudentCredentialForm => "StudentCredentialForm",
            Self::RolePicker => "RolePicker",
            Self::ManualCredentialForm => "ManualCredentialForm",
            Self::ExternalSsoPending => "ExternalSsoPending",
            Self::AuthenticatedStudent => "AuthenticatedStudent",
            Self::AuthenticatedTeacher => "AuthenticatedTeacher",
            Self::AuthenticatedSuperAdmin => "AuthenticatedSuperAdmin",
            Self::LoginFailed => "LoginFailed",
        }
    }
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event moving the login flow between states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginTrigger {
    /// Student entry clicked
    SelectStudentEntry,
    /// Staff entry clicked
    SelectTeacherEntry,
    /// Student name accepted
    SubmitStudent,
    /// No dashboard marker appeared after submit
    SubmitRejected,
    /// Manual toggle clicked
    ManualToggleClicked,
    /// Manual form was already open
    ManualFormAlreadyOpen,
    /// Neither toggle nor form available, or SSO requested
    ManualToggleAbsent,
    /// Superadmin marker appeared after submit
    SubmitResolvedSuperAdmin,
    /// Teacher marker appeared after submit
    SubmitResolvedTeacher,
    /// Logout clicked
    SignOut,
}

impl LoginTrigger {
    /// Trigger name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SelectStudentEntry => "SelectStudentEntry",
            Self::SelectTeacherEntry => "SelectTeacherEntry",
            Self::SubmitStudent => "SubmitStudent",
            Self::SubmitRejected => "SubmitRejected",
            Self::ManualToggleClicked => "ManualToggleClicked",
            Self::ManualFormAlreadyOpen => "ManualFormAlreadyOpen",
            Self::ManualToggleAbsent => "ManualToggleAbsent",
            Self::SubmitResolvedSuperAdmin => "SubmitResolvedSuperAdmin",
            Self::SubmitResolvedTeacher => "SubmitResolvedTeacher",
            Self::SignOut => "SignOut",
        }
    }
}

impl fmt::Display for LoginTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition that must hold for a transition to fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Guard {
    /// The reference resolves to an element
    Resolvable(&'static str),
    /// The reference is visible
    Visible(&'static str),
    /// `absent` is not visible and `present` is
    AbsentThenVisible {
        /// Reference that must not be visible
        absent: &'static str,
        /// Reference that must be visible
        present: &'static str,
    },
    /// Neither manual entry point is visible, or SSO was requested
    SsoOnly,
    /// No outcome marker appeared before the timeout
    NoMarkerBeforeTimeout,
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolvable(r) => write!(f, "{r} resolvable"),
            Self::Visible(r) => write!(f, "{r} visible"),
            Self::AbsentThenVisible { absent, present } => {
                write!(f, "{absent} absent, {present} visible")
            }
            Self::SsoOnly => f.write_str("sso only"),
            Self::NoMarkerBeforeTimeout => f.write_str("no marker before timeout"),
        }
    }
}

/// One edge of the login machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoginTransition {
    /// Source state
    pub from: LoginState,
    /// Trigger
    pub trigger: LoginTrigger,
    /// Target state
    pub to: LoginState,
    /// Guard
    pub guard: Guard,
}

impl LoginTransition {
    const fn new(from: LoginState, trigger: LoginTrigger, to: LoginState, guard: Guard) -> Self {
        Self {
            from,
            trigger,
            to,
            guard,
        }
    }
}

/// Problems found by [`LoginMachine::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineIssue {
    /// State cannot be reached from the initial state
    Unreachable {
        /// The state
        state: LoginState,
    },
    /// Two transitions share a source and trigger
    NonDeterministic {
        /// Source state
        state: LoginState,
        /// Shared trigger
        trigger: LoginTrigger,
        /// Conflicting targets
        targets: Vec<LoginState>,
    },
    /// A terminal state has outgoing transitions
    TerminalWithExit {
        /// The state
        state: LoginState,
    },
    /// A non-terminal state has no outgoing transitions
    DeadEnd {
        /// The state
        state: LoginState,
    },
}

impl fmt::Display for MachineIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable { state } => write!(f, "{state} is unreachable"),
            Self::NonDeterministic {
                state,
                trigger,
                targets,
            } => {
                let targets: Vec<_> = targets.iter().map(|t| t.as_str()).collect();
                write!(
                    f,
                    "{state} on {trigger} is non-deterministic ({})",
                    targets.join(", ")
                )
            }
            Self::TerminalWithExit { state } => {
                write!(f, "terminal state {state} has outgoing transitions")
            }
            Self::DeadEnd { state } => write!(f, "{state} has no outgoing transitions"),
        }
    }
}

/// Result of validating the machine
#[derive(Debug, Clone, Default)]
pub struct MachineReport {
    /// States reachable from the initial state
    pub reachable: HashSet<LoginState>,
    /// Detected issues
    pub issues: Vec<MachineIssue>,
}

impl MachineReport {
    /// No issues found
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Static transition table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginMachine {
    transitions: Vec<LoginTransition>,
}

impl Default for LoginMachine {
    fn default() -> Self {
        Self::standard()
    }
}

impl LoginMachine {
    /// The application's login flow
    #[must_use]
    pub fn standard() -> Self {
        use LoginState as S;
        use LoginTrigger as T;

        Self::from_transitions(vec![
            LoginTransition::new(
                S::AnonymousLanding,
                T::SelectStudentEntry,
                S::StudentCredentialForm,
                Guard::Resolvable(refs::STUDENT_ENTRY),
            ),
            LoginTransition::new(
                S::AnonymousLanding,
                T::SelectTeacherEntry,
                S::RolePicker,
                Guard::Resolvable(refs::TEACHER_ENTRY),
            ),
            LoginTransition::new(
                S::StudentCredentialForm,
                T::SubmitStudent,
                S::AuthenticatedStudent,
                Guard::Visible(refs::STUDENT_MARKER),
            ),
            LoginTransition::new(
                S::StudentCredentialForm,
                T::SubmitRejected,
                S::LoginFailed,
                Guard::NoMarkerBeforeTimeout,
            ),
            LoginTransition::new(
                S::RolePicker,
                T::ManualToggleClicked,
                S::ManualCredentialForm,
                Guard::Visible(refs::MANUAL_TOGGLE),
            ),
            LoginTransition::new(
                S::RolePicker,
                T::ManualFormAlreadyOpen,
                S::ManualCredentialForm,
                Guard::AbsentThenVisible {
                    absent: refs::MANUAL_TOGGLE,
                    present: refs::MANUAL_USERNAME,
                },
            ),
            LoginTransition::new(
                S::RolePicker,
                T::ManualToggleAbsent,
                S::ExternalSsoPending,
                Guard::SsoOnly,
            ),
            LoginTransition::new(
                S::ManualCredentialForm,
                T::SubmitResolvedSuperAdmin,
                S::AuthenticatedSuperAdmin,
                Guard::Visible(refs::SUPERADMIN_MARKER),
            ),
            LoginTransition::new(
                S::ManualCredentialForm,
                T::SubmitResolvedTeacher,
                S::AuthenticatedTeacher,
                Guard::Visible(refs::TEACHER_MARKER),
            ),
            LoginTransition::new(
                S::ManualCredentialForm,
                T::SubmitRejected,
                S::LoginFailed,
                Guard::NoMarkerBeforeTimeout,
            ),
            LoginTransition::new(
                S::AuthenticatedStudent,
                T::SignOut,
                S::AnonymousLanding,
                Guard::Visible(refs::LOGOUT),
            ),
            LoginTransition::new(
                S::AuthenticatedTeacher,
                T::SignOut,
                S::AnonymousLanding,
                Guard::Visible(refs::LOGOUT),
            ),
            LoginTransition::new(
                S::AuthenticatedSuperAdmin,
                T::SignOut,
                S::AnonymousLanding,
                Guard::Visible(refs::LOGOUT),
            ),
        ])
    }

    /// Build a machine from an arbitrary table
    #[must_use]
    pub const fn from_transitions(transitions: Vec<LoginTransition>) -> Self {
        Self { transitions }
    }

    /// All transitions
    #[must_use]
    pub fn transitions(&self) -> &[LoginTransition] {
        &self.transitions
    }

    /// Outgoing transitions of `state`, in table order
    pub fn transitions_from(&self, state: LoginState) -> impl Iterator<Item = &LoginTransition> {
        self.transitions.iter().filter(move |t| t.from == state)
    }

    /// Target of `trigger` from `from`
    #[must_use]
    pub fn next(&self, from: LoginState, trigger: LoginTrigger) -> Option<LoginState> {
        self.transitions
            .iter()
            .find(|t| t.from == from && t.trigger == trigger)
            .map(|t| t.to)
    }

    /// Check reachability, determinism and terminal states
    #[must_use]
    pub fn validate(&self) -> MachineReport {
        let mut issues = Vec::new();
        let reachable = self.compute_reachability();

        for state in LoginState::ALL {
            if !reachable.contains(&state) {
                issues.push(MachineIssue::Unreachable { state });
            }
        }

        let mut by_key: HashMap<(LoginState, LoginTrigger), Vec<LoginState>> = HashMap::new();
        for t in &self.transitions {
            by_key.entry((t.from, t.trigger)).or_default().push(t.to);
        }
        let mut conflicts: Vec<_> = by_key
            .into_iter()
            .filter(|(_, targets)| targets.len() > 1)
            .collect();
        conflicts.sort_by_key(|((state, trigger), _)| (*state, *trigger));
        for ((state, trigger), targets) in conflicts {
            issues.push(MachineIssue::NonDeterministic {
                state,
                trigger,
                targets,
            });
        }

        for state in LoginState::ALL {
            let has_exit = self.transitions_from(state).next().is_some();
            if state.is_terminal() && has_exit {
                issues.push(MachineIssue::TerminalWithExit { state });
            } else if !state.is_terminal() && !has_exit {
                issues.push(MachineIssue::DeadEnd { state });
            }
        }

        MachineReport { reachable, issues }
    }

    /// Compute which states are reachable from the initial state using BFS.
    fn compute_reachability(&self) -> HashSet<LoginState> {
        let mut reachable = HashSet::new();
        let mut queue = VecDeque::new();
        reachable.insert(LoginState::INITIAL);
        queue.push_back(LoginState::INITIAL);

        while let Some(current) = queue.pop_front() {
            for t in self.transitions_from(current) {
                if reachable.insert(t.to) {
                    queue.push_back(t.to);
                }
            }
        }
        reachable
    }

    /// Generate a state diagram in DOT format for visualization.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph Login {\n  rankdir=LR;\n");
        let _ = writeln!(
            dot,
            "  __start [shape=point];\n  __start -> \"{}\";",
            LoginState::INITIAL
        );
        for state in LoginState::ALL {
            let shape = if state.is_terminal() {
                "doublecircle"
            } else {
                "ellipse"
            };
            let _ = writeln!(dot, "  \"{state}\" [shape={shape}];");
        }
        for t in &self.transitions {
            let _ = writeln!(
                dot,
                "  \"{}\" -> \"{}\" [label=\"{} [{}]\"];",
                t.from, t.to, t.trigger, t.guard
            );
        }
        dot.push_str("}\n");
        dot
    }
}

/// Login request after credential substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    /// Role to reach
    pub role: Role,
    /// Staff login method; ignored for students
    pub method: AuthMethod,
    /// Username or student name
    pub username: Option<String>,
    /// Password (staff manual login)
    pub password: Option<String>,
}

impl AuthRequest {
    fn credential(&self, field: &'static str) -> Result<&str, LoginError> {
        let value = match field {
            "password" => self.password.as_deref(),
            _ => self.username.as_deref(),
        };
        value.ok_or(LoginError::MissingCredential {
            role: self.role,
            field,
        })
    }
}

/// States visited by one login attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttempt {
    /// Final state
    pub reached: LoginState,
    /// Every state visited, starting with the one the attempt began in
    pub path: Vec<LoginState>,
}

impl LoginAttempt {
    /// `A -> B -> C`
    #[must_use]
    pub fn path_string(&self) -> String {
        self.path
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// Why a login attempt could not complete
#[derive(Debug, Error)]
pub enum LoginError {
    /// A control the flow needs could not be found
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// Driver fault while acting
    #[error(transparent)]
    Driver(#[from] ComprobarError),
    /// Driver fault while probing a guard
    #[error("{detail}")]
    Probe {
        /// Failure kind
        kind: FailureKind,
        /// Cause
        detail: String,
    },
    /// Request lacks a credential the flow needs
    #[error("missing {field} for {role} login")]
    MissingCredential {
        /// Requested role
        role: Role,
        /// Missing field
        field: &'static str,
    },
    /// The table has no edge for a step the flow needs
    #[error("no login transition from {from} on {trigger}")]
    IllegalTransition {
        /// Source state
        from: LoginState,
        /// Trigger
        trigger: LoginTrigger,
    },
}

impl LoginError {
    /// Step-level failure kind
    #[must_use]
    pub const fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Resolve(err) => err.failure_kind(),
            Self::Driver(err) => err.failure_kind(),
            Self::Probe { kind, .. } => *kind,
            Self::MissingCredential { .. } | Self::IllegalTransition { .. } => {
                FailureKind::TransportFault
            }
        }
    }
}

struct Walk<'m> {
    machine: &'m LoginMachine,
    state: LoginState,
    path: Vec<LoginState>,
}

impl<'m> Walk<'m> {
    fn new(machine: &'m LoginMachine, start: LoginState) -> Self {
        Self {
            machine,
            state: start,
            path: vec![start],
        }
    }

    fn fire(&mut self, trigger: LoginTrigger) -> Result<LoginState, LoginError> {
        let to = self
            .machine
            .next(self.state, trigger)
            .ok_or(LoginError::IllegalTransition {
                from: self.state,
                trigger,
            })?;
        info!(from = %self.state, %trigger, to = %to, "login transition");
        self.state = to;
        self.path.push(to);
        Ok(to)
    }

    fn restart(&mut self) {
        debug!(from = %self.state, "restarting login from landing");
        self.state = LoginState::AnonymousLanding;
        self.path.push(LoginState::AnonymousLanding);
    }

    fn finish(self) -> LoginAttempt {
        LoginAttempt {
            reached: self.state,
            path: self.path,
        }
    }
}

/// Drives the login machine against a live page
#[derive(Debug, Clone)]
pub struct Authenticator<'a> {
    machine: &'a LoginMachine,
    resolver: &'a SelectorResolver,
    engine: &'a AssertionEngine,
    guard_probe: Duration,
    outcome_timeout: Duration,
    resolve_budget: Duration,
    poll_interval: Duration,
}

impl<'a> Authenticator<'a> {
    /// Create an authenticator with default timings
    #[must_use]
    pub const fn new(
        machine: &'a LoginMachine,
        resolver: &'a SelectorResolver,
        engine: &'a AssertionEngine,
    ) -> Self {
        Self {
            machine,
            resolver,
            engine,
            guard_probe: Duration::from_millis(1000),
            outcome_timeout: Duration::from_millis(5000),
            resolve_budget: Duration::from_millis(3000),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    /// How long to wait on each role-picker guard
    #[must_use]
    pub const fn with_guard_probe(mut self, guard_probe: Duration) -> Self {
        self.guard_probe = guard_probe;
        self
    }

    /// How long to wait for a dashboard marker after submitting
    #[must_use]
    pub const fn with_outcome_timeout(mut self, outcome_timeout: Duration) -> Self {
        self.outcome_timeout = outcome_timeout;
        self
    }

    /// Budget for locating each control
    #[must_use]
    pub const fn with_resolve_budget(mut self, resolve_budget: Duration) -> Self {
        self.resolve_budget = resolve_budget;
        self
    }

    /// Interval between outcome polls
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Walk from `from` toward the state for `request.role`.
    ///
    /// A signed-in session is signed out first; any other state restarts at
    /// the landing page. Reaching a different state than requested is not an
    /// error here: the caller compares [`LoginAttempt::reached`].
    ///
    /// # Errors
    ///
    /// Returns error if a control cannot be resolved, the driver faults, or
    /// the request lacks a required credential.
    pub async fn authenticate(
        &self,
        driver: &mut dyn Driver,
        from: LoginState,
        request: &AuthRequest,
    ) -> Result<LoginAttempt, LoginError> {
        let mut walk = Walk::new(self.machine, from);
        if from.is_authenticated() {
            self.click(driver, refs::LOGOUT).await?;
            walk.fire(LoginTrigger::SignOut)?;
        } else if from != LoginState::AnonymousLanding {
            walk.restart();
        }

        match request.role {
            Role::Anonymous => {}
            Role::Student => self.student(driver, &mut walk, request).await?,
            Role::Teacher | Role::SuperAdmin => self.staff(driver, &mut walk, request).await?,
        }
        Ok(walk.finish())
    }

    async fn student(
        &self,
        driver: &mut dyn Driver,
        walk: &mut Walk<'_>,
        request: &AuthRequest,
    ) -> Result<(), LoginError> {
        let name = request.credential("username")?;
        self.click(driver, refs::STUDENT_ENTRY).await?;
        walk.fire(LoginTrigger::SelectStudentEntry)?;

        self.fill(driver, refs::STUDENT_USERNAME, name).await?;
        self.click(driver, refs::STUDENT_SUBMIT).await?;
        let trigger = self
            .await_marker(driver, &[(refs::STUDENT_MARKER, LoginTrigger::SubmitStudent)])
            .await?;
        walk.fire(trigger)?;
        Ok(())
    }

    async fn staff(
        &self,
        driver: &mut dyn Driver,
        walk: &mut Walk<'_>,
        request: &AuthRequest,
    ) -> Result<(), LoginError> {
        self.click(driver, refs::TEACHER_ENTRY).await?;
        walk.fire(LoginTrigger::SelectTeacherEntry)?;

        if request.method == AuthMethod::Sso {
            walk.fire(LoginTrigger::ManualToggleAbsent)?;
            return Ok(());
        }

        // Toggle first, then an already-open form, then SSO.
        if self.visible(driver, refs::MANUAL_TOGGLE, self.guard_probe).await? {
            self.click(driver, refs::MANUAL_TOGGLE).await?;
            walk.fire(LoginTrigger::ManualToggleClicked)?;
        } else if self.visible(driver, refs::MANUAL_USERNAME, self.guard_probe).await? {
            walk.fire(LoginTrigger::ManualFormAlreadyOpen)?;
        } else {
            walk.fire(LoginTrigger::ManualToggleAbsent)?;
            return Ok(());
        }

        let username = request.credential("username")?;
        let password = request.credential("password")?;
        self.fill(driver, refs::MANUAL_USERNAME, username).await?;
        self.fill(driver, refs::MANUAL_PASSWORD, password).await?;
        self.click(driver, refs::MANUAL_SUBMIT).await?;

        // The superadmin dashboard also carries the teacher's controls.
        let trigger = self
            .await_marker(
                driver,
                &[
                    (refs::SUPERADMIN_MARKER, LoginTrigger::SubmitResolvedSuperAdmin),
                    (refs::TEACHER_MARKER, LoginTrigger::SubmitResolvedTeacher),
                ],
            )
            .await?;
        walk.fire(trigger)?;
        Ok(())
    }

    /// Poll markers in order until one is visible; `SubmitRejected` on timeout.
    async fn await_marker(
        &self,
        driver: &dyn Driver,
        markers: &[(&'static str, LoginTrigger)],
    ) -> Result<LoginTrigger, LoginError> {
        let start = tokio::time::Instant::now();
        loop {
            for (marker, trigger) in markers {
                if self.visible(driver, marker, Duration::ZERO).await? {
                    return Ok(*trigger);
                }
            }
            let elapsed = start.elapsed();
            if elapsed >= self.outcome_timeout {
                debug!(elapsed_ms = elapsed.as_millis() as u64, "no login marker appeared");
                return Ok(LoginTrigger::SubmitRejected);
            }
            tokio::time::sleep(
                self.poll_interval
                    .min(self.outcome_timeout.saturating_sub(elapsed)),
            )
            .await;
        }
    }

    async fn visible(
        &self,
        driver: &dyn Driver,
        name: &str,
        timeout: Duration,
    ) -> Result<bool, LoginError> {
        let outcome = self
            .engine
            .await_condition(
                driver,
                self.resolver,
                &UiRef::new(name),
                Expectation::Visible,
                timeout,
            )
            .await;
        match outcome {
            Outcome::Satisfied => Ok(true),
            Outcome::Failed { .. } => Ok(false),
            Outcome::Errored { kind, detail } => Err(LoginError::Probe { kind, detail }),
        }
    }

    async fn click(&self, driver: &mut dyn Driver, name: &str) -> Result<(), LoginError> {
        let located = self
            .resolver
            .locate(&*driver, &UiRef::new(name), self.resolve_budget)
            .await?;
        driver.click(&located.selector).await?;
        Ok(())
    }

    async fn fill(
        &self,
        driver: &mut dyn Driver,
        name: &str,
        text: &str,
    ) -> Result<(), LoginError> {
        let located = self
            .resolver
            .locate(&*driver, &UiRef::new(name), self.resolve_budget)
            .await?;
        driver.fill(&located.selector, text).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ClickEffect, MockDriver, MockElement};

    mod machine_tests {
        use super::*;

        #[test]
        fn test_standard_machine_is_valid() {
            let report = LoginMachine::standard().validate();
            assert!(report.is_valid(), "issues: {:?}", report.issues);
            assert_eq!(report.reachable.len(), LoginState::ALL.len());
        }

        #[test]
        fn test_next() {
            let machine = LoginMachine::standard();
            assert_eq!(
                machine.next(LoginState::AnonymousLanding, LoginTrigger::SelectTeacherEntry),
                Some(LoginState::RolePicker)
            );
            assert_eq!(
                machine.next(LoginState::RolePicker, LoginTrigger::ManualFormAlreadyOpen),
                Some(LoginState::ManualCredentialForm)
            );
            assert_eq!(
                machine.next(LoginState::LoginFailed, LoginTrigger::SignOut),
                None
            );
        }

        #[test]
        fn test_terminal_states_have_no_exits() {
            let machine = LoginMachine::standard();
            for state in LoginState::ALL.into_iter().filter(|s| s.is_terminal()) {
                assert_eq!(machine.transitions_from(state).count(), 0, "{state}");
            }
        }

        #[test]
        fn test_detect_non_deterministic() {
            let mut transitions = LoginMachine::standard().transitions().to_vec();
            transitions.push(LoginTransition::new(
                LoginState::RolePicker,
                LoginTrigger::ManualToggleClicked,
                LoginState::ExternalSsoPending,
                Guard::SsoOnly,
            ));
            let report = LoginMachine::from_transitions(transitions).validate();
            assert!(!report.is_valid());
            assert!(report.issues.iter().any(|i| matches!(
                i,
                MachineIssue::NonDeterministic {
                    state: LoginState::RolePicker,
                    trigger: LoginTrigger::ManualToggleClicked,
                    ..
                }
            )));
        }

        #[test]
        fn test_detect_unreachable_and_dead_end() {
            let transitions: Vec<_> = LoginMachine::standard()
                .transitions()
                .iter()
                .copied()
                .filter(|t| t.trigger != LoginTrigger::SelectStudentEntry)
                .collect();
            let report = LoginMachine::from_transitions(transitions).validate();
            assert!(report.issues.contains(&MachineIssue::Unreachable {
                state: LoginState::StudentCredentialForm
            }));

            let report = LoginMachine::from_transitions(vec![]).validate();
            assert!(report.issues.contains(&MachineIssue::DeadEnd {
                state: LoginState::AnonymousLanding
            }));
        }

        #[test]
        fn test_detect_terminal_exit() {
            let mut transitions = LoginMachine::standard().transitions().to_vec();
            transitions.push(LoginTransition::new(
                LoginState::LoginFailed,
                LoginTrigger::SignOut,
                LoginState::AnonymousLanding,
                Guard::Visible(refs::LOGOUT),
            ));
            let report = LoginMachine::from_transitions(transitions).validate();
            assert!(report.issues.contains(&MachineIssue::TerminalWithExit {
                state: LoginState::LoginFailed
            }));
        }

        #[test]
        fn test_dot_generation() {
            let dot = LoginMachine::standard().to_dot();
            assert!(dot.starts_with("digraph Login"));
            assert!(dot.contains("\"LoginFailed\" [shape=doublecircle]"));
            assert!(dot.contains("SubmitResolvedSuperAdmin"));
        }

        #[test]
        fn test_state_roles() {
            assert_eq!(LoginState::AuthenticatedTeacher.role(), Some(Role::Teacher));
            assert!(LoginState::AnonymousLanding.role().is_none());
            assert_eq!(
                LoginState::for_role(Role::SuperAdmin),
                LoginState::AuthenticatedSuperAdmin
            );
        }
    }

    mod authenticator_tests {
        use super::*;

        struct Fixture {
            machine: LoginMachine,
            resolver: SelectorResolver,
            engine: AssertionEngine,
        }

        impl Fixture {
            fn new() -> Self {
                Self {
                    machine: LoginMachine::standard(),
                    resolver: SelectorResolver::default()
                        .with_probe_timeout(Duration::from_millis(100)),
                    engine: AssertionEngine::new(),
                }
            }

            fn authenticator(&self) -> Authenticator<'_> {
                Authenticator::new(&self.machine, &self.resolver, &self.engine)
                    .with_guard_probe(Duration::from_millis(200))
                    .with_outcome_timeout(Duration::from_millis(500))
                    .with_resolve_budget(Duration::from_millis(500))
            }
        }

        fn manual(role: Role, username: &str, password: &str) -> AuthRequest {
            AuthRequest {
                role,
                method: AuthMethod::Manual,
                username: Some(username.to_string()),
                password: Some(password.to_string()),
            }
        }

        async fn at_landing(mut driver: MockDriver) -> MockDriver {
            driver.navigate("http://localhost:5173").await.unwrap();
            driver
        }

        #[tokio::test(start_paused = true)]
        async fn test_superadmin_via_toggle() {
            let fx = Fixture::new();
            let mut driver = at_landing(MockDriver::school_library()).await;
            let attempt = fx
                .authenticator()
                .authenticate(
                    &mut driver,
                    LoginState::AnonymousLanding,
                    &manual(Role::SuperAdmin, "superadmin", "admin123"),
                )
                .await
                .unwrap();
            assert_eq!(attempt.reached, LoginState::AuthenticatedSuperAdmin);
            assert_eq!(
                attempt.path,
                vec![
                    LoginState::AnonymousLanding,
                    LoginState::RolePicker,
                    LoginState::ManualCredentialForm,
                    LoginState::AuthenticatedSuperAdmin,
                ]
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_form_already_open() {
            let fx = Fixture::new();
            let mut driver = at_landing(
                MockDriver::school_library().with_view(
                    "role-picker",
                    vec![
                        MockElement::input("username", "Usuario"),
                        MockElement::password("password", "••••••••"),
                        MockElement::submit("Entrar").on_click(ClickEffect::Submit {
                            username_field: "username".to_string(),
                            password_field: Some("password".to_string()),
                            on_reject: "manual-form-rejected".to_string(),
                        }),
                    ],
                ),
            )
            .await;
            let attempt = fx
                .authenticator()
                .authenticate(
                    &mut driver,
                    LoginState::AnonymousLanding,
                    &manual(Role::Teacher, "profe.juan", "profe123"),
                )
                .await
                .unwrap();
            assert_eq!(attempt.reached, LoginState::AuthenticatedTeacher);
            assert_eq!(attempt.path[2], LoginState::ManualCredentialForm);
        }

        #[tokio::test(start_paused = true)]
        async fn test_no_manual_path_goes_to_sso() {
            let fx = Fixture::new();
            let mut driver = at_landing(MockDriver::school_library().with_view(
                "role-picker",
                vec![MockElement::new("iframe", "").with_css("iframe[src*='accounts.google.com']")],
            ))
            .await;
            let attempt = fx
                .authenticator()
                .authenticate(
                    &mut driver,
                    LoginState::AnonymousLanding,
                    &manual(Role::Teacher, "profe.juan", "profe123"),
                )
                .await
                .unwrap();
            assert_eq!(attempt.reached, LoginState::ExternalSsoPending);
        }

        #[tokio::test(start_paused = true)]
        async fn test_sso_method() {
            let fx = Fixture::new();
            let mut driver = at_landing(MockDriver::school_library()).await;
            let request = AuthRequest {
                role: Role::Teacher,
                method: AuthMethod::Sso,
                username: None,
                password: None,
            };
            let attempt = fx
                .authenticator()
                .authenticate(&mut driver, LoginState::AnonymousLanding, &request)
                .await
                .unwrap();
            assert_eq!(attempt.reached, LoginState::ExternalSsoPending);
            assert_eq!(attempt.path_string(), "AnonymousLanding -> RolePicker -> ExternalSsoPending");
        }

        #[tokio::test(start_paused = true)]
        async fn test_wrong_password_login_failed() {
            let fx = Fixture::new();
            let mut driver = at_landing(MockDriver::school_library()).await;
            let attempt = fx
                .authenticator()
                .authenticate(
                    &mut driver,
                    LoginState::AnonymousLanding,
                    &manual(Role::SuperAdmin, "superadmin", "wrong"),
                )
                .await
                .unwrap();
            assert_eq!(attempt.reached, LoginState::LoginFailed);
        }

        #[tokio::test(start_paused = true)]
        async fn test_student_login() {
            let fx = Fixture::new();
            let mut driver = at_landing(MockDriver::school_library()).await;
            let request = AuthRequest {
                role: Role::Student,
                method: AuthMethod::Manual,
                username: Some("juan.garcia".to_string()),
                password: None,
            };
            let attempt = fx
                .authenticator()
                .authenticate(&mut driver, LoginState::AnonymousLanding, &request)
                .await
                .unwrap();
            assert_eq!(attempt.reached, LoginState::AuthenticatedStudent);
            assert_eq!(attempt.path[1], LoginState::StudentCredentialForm);
        }

        #[tokio::test(start_paused = true)]
        async fn test_signs_out_before_switching_role() {
            let fx = Fixture::new();
            let mut driver = at_landing(MockDriver::school_library()).await;
            let auth = fx.authenticator();
            let first = auth
                .authenticate(
                    &mut driver,
                    LoginState::AnonymousLanding,
                    &manual(Role::Teacher, "profe.juan", "profe123"),
                )
                .await
                .unwrap();
            assert_eq!(first.reached, LoginState::AuthenticatedTeacher);

            let second = auth
                .authenticate(
                    &mut driver,
                    first.reached,
                    &manual(Role::SuperAdmin, "superadmin", "admin123"),
                )
                .await
                .unwrap();
            assert_eq!(second.path[1], LoginState::AnonymousLanding);
            assert_eq!(second.reached, LoginState::AuthenticatedSuperAdmin);
        }

        #[tokio::test(start_paused = true)]
        async fn test_missing_entry_is_not_resolved() {
            let fx = Fixture::new();
            let mut driver = at_landing(MockDriver::new()).await;
            let err = fx
                .authenticator()
                .authenticate(
                    &mut driver,
                    LoginState::AnonymousLanding,
                    &manual(Role::Teacher, "profe.juan", "profe123"),
                )
                .await
                .unwrap_err();
            assert_eq!(err.failure_kind(), FailureKind::ElementNotResolved);
        }

        #[tokio::test]
        async fn test_missing_password() {
            let fx = Fixture::new();
            let mut driver = at_landing(MockDriver::school_library()).await;
            let request = AuthRequest {
                role: Role::SuperAdmin,
                method: AuthMethod::Manual,
                username: Some("superadmin".to_string()),
                password: None,
            };
            let err = fx
                .authenticator()
                .authenticate(&mut driver, LoginState::AnonymousLanding, &request)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                LoginError::MissingCredential {
                    field: "password",
                    ..
                }
            ));
        }

        #[tokio::test(start_paused = true)]
        async fn test_same_page_same_path() {
            let fx = Fixture::new();
            let request = manual(Role::SuperAdmin, "superadmin", "admin123");
            let mut paths = Vec::new();
            for _ in 0..3 {
                let mut driver = at_landing(MockDriver::school_library()).await;
                let attempt = fx
                    .authenticator()
                    .authenticate(&mut driver, LoginState::AnonymousLanding, &request)
                    .await
                    .unwrap();
                paths.push(attempt.path);
            }
            assert!(paths.windows(2).all(|w| w[0] == w[1]));
        }
    }
}
