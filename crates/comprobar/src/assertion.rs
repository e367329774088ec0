//! Assertion engine: poll a semantic reference until a visibility
//! condition holds or its timeout elapses.
//!
//! Assertions only ever query the driver. Running one twice against an
//! unchanged page yields the same outcome.

use crate::driver::{Driver, DEFAULT_POLL_INTERVAL_MS};
use crate::result::{ComprobarError, FailureKind};
use crate::selector::{ResolveError, Selector, SelectorResolver, UiRef};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default assertion timeout (5 seconds)
pub const DEFAULT_ASSERT_TIMEOUT_MS: u64 = 5000;

/// Condition an assertion waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// Some strategy resolves to an attached, rendered element
    Visible,
    /// No strategy resolves to a rendered element
    NotVisible,
}

/// What satisfies a `NotVisible` assertion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotVisiblePolicy {
    /// Absent from the DOM, or present but not rendered
    #[default]
    AbsentOrHidden,
    /// Absent from the DOM
    AbsentOnly,
}

/// Result of waiting on a condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The condition held
    Satisfied,
    /// The condition never held; expected and reportable
    Failed {
        /// Failure kind
        kind: FailureKind,
        /// Human-readable detail naming the reference
        detail: String,
    },
    /// The driver faulted or the wait was cancelled
    Errored {
        /// Failure kind
        kind: FailureKind,
        /// Underlying cause
        detail: String,
    },
}

impl Outcome {
    /// Whether the condition held
    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }

    /// Fold a library error into an outcome
    #[must_use]
    pub fn from_error(err: &ComprobarError) -> Self {
        let kind = err.failure_kind();
        if kind.is_error() {
            Self::Errored {
                kind,
                detail: err.to_string(),
            }
        } else {
            Self::Failed {
                kind,
                detail: err.to_string(),
            }
        }
    }

    fn from_resolve(err: ResolveError) -> Self {
        match err {
            ResolveError::Driver(err) => Self::from_error(&err),
            not_resolved @ ResolveError::NotResolved { .. } => Self::Failed {
                kind: not_resolved.failure_kind(),
                detail: not_resolved.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Probe {
    attached: bool,
    rendered: bool,
}

/// Polls the driver for visibility conditions
#[derive(Debug, Clone)]
pub struct AssertionEngine {
    poll_interval: Duration,
    not_visible_policy: NotVisiblePolicy,
}

impl Default for AssertionEngine {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            not_visible_policy: NotVisiblePolicy::default(),
        }
    }
}

impl AssertionEngine {
    /// Create an engine with default polling
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the `NotVisible` policy
    #[must_use]
    pub const fn with_not_visible_policy(mut self, policy: NotVisiblePolicy) -> Self {
        self.not_visible_policy = policy;
        self
    }

    /// The active `NotVisible` policy
    #[must_use]
    pub const fn not_visible_policy(&self) -> NotVisiblePolicy {
        self.not_visible_policy
    }

    /// Wait until `expectation` holds for `ui_ref`, or `timeout` elapses.
    ///
    /// A `Visible` wait whose reference never attached reports
    /// `ElementNotResolved`; one that attached but never rendered reports
    /// `AssertionTimeout`. Timeouts are never `Errored`.
    pub async fn await_condition(
        &self,
        driver: &dyn Driver,
        resolver: &SelectorResolver,
        ui_ref: &UiRef,
        expectation: Expectation,
        timeout: Duration,
    ) -> Outcome {
        let strategies = match resolver.resolve(ui_ref) {
            Ok(strategies) => strategies,
            Err(err) => return Outcome::from_resolve(err),
        };

        let start = tokio::time::Instant::now();
        let mut ever_attached = false;
        let mut polls = 0_u32;
        loop {
            polls += 1;
            let probe = match probe(driver, strategies).await {
                Ok(probe) => probe,
                Err(err) => return Outcome::from_error(&err),
            };
            ever_attached |= probe.attached;
            if self.holds(expectation, probe) {
                debug!(%ui_ref, ?expectation, polls, "condition satisfied");
                return Outcome::Satisfied;
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                break;
            }
            tokio::time::sleep(self.poll_interval.min(timeout.saturating_sub(elapsed))).await;
        }

        let ms = timeout.as_millis();
        debug!(%ui_ref, ?expectation, polls, ever_attached, "condition timed out");
        match expectation {
            Expectation::Visible if !ever_attached => Outcome::Failed {
                kind: FailureKind::ElementNotResolved,
                detail: format!("'{ui_ref}' never attached within {ms}ms"),
            },
            Expectation::Visible => Outcome::Failed {
                kind: FailureKind::AssertionTimeout,
                detail: format!("'{ui_ref}' attached but not visible within {ms}ms"),
            },
            Expectation::NotVisible => Outcome::Failed {
                kind: FailureKind::AssertionTimeout,
                detail: match self.not_visible_policy {
                    NotVisiblePolicy::AbsentOrHidden => {
                        format!("'{ui_ref}' still visible after {ms}ms")
                    }
                    NotVisiblePolicy::AbsentOnly => {
                        format!("'{ui_ref}' still attached after {ms}ms")
                    }
                },
            },
        }
    }

    const fn holds(&self, expectation: Expectation, probe: Probe) -> bool {
        match (expectation, self.not_visible_policy) {
            (Expectation::Visible, _) => probe.rendered,
            (Expectation::NotVisible, NotVisiblePolicy::AbsentOrHidden) => !probe.rendered,
            (Expectation::NotVisible, NotVisiblePolicy::AbsentOnly) => !probe.attached,
        }
    }
}

async fn probe(driver: &dyn Driver, strategies: &[Selector]) -> Result<Probe, ComprobarError> {
    let mut result = Probe::default();
    for selector in strategies {
        if let Some(element) = driver.query(selector).await? {
            result.attached = true;
            if element.is_rendered() {
                result.rendered = true;
                break;
            }
        }
    }
    Ok(result)
}
