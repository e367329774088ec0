//! Result and error types for Comprobar.
//!
//! Two layers live here. [`ComprobarError`] is what library calls return
//! (driver transport, parsing, configuration, I/O). [`FailureKind`] is the
//! step-level taxonomy recorded in reports: every caught error is folded into
//! one of its variants before it reaches a [`crate::StepResult`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for Comprobar operations
pub type ComprobarResult<T> = Result<T, ComprobarError>;

/// Errors that can occur in Comprobar
#[derive(Debug, Error)]
pub enum ComprobarError {
    /// Browser executable not found
    #[error("Browser not found. Install Chromium or set CHROMIUM_PATH")]
    BrowserNotFound,

    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunchError {
        /// Error message
        message: String,
    },

    /// Driver-level crash or disconnect
    #[error("Driver transport fault: {message}")]
    Transport {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    NavigationError {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// A concrete selector matched nothing when the driver tried to act on it
    #[error("No element matches {selector}")]
    ElementNotFound {
        /// Selector description
        selector: String,
    },

    /// Screenshot error
    #[error("Screenshot failed: {message}")]
    ScreenshotError {
        /// Error message
        message: String,
    },

    /// Operation aborted by a cancellation signal or scenario deadline
    #[error("Cancelled: {reason}")]
    Cancelled {
        /// What triggered the cancellation
        reason: String,
    },

    /// Scenario document is malformed or violates a constraint
    #[error("Invalid scenario: {message}")]
    InvalidScenario {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid state error (operation called in wrong state)
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl ComprobarError {
    /// Create a transport fault
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an invalid-scenario error
    #[must_use]
    pub fn invalid_scenario(message: impl Into<String>) -> Self {
        Self::InvalidScenario {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Map this error onto the step-level failure taxonomy.
    ///
    /// Anything the driver could not complete for reasons outside the
    /// application's rendered state is a transport fault.
    #[must_use]
    pub const fn failure_kind(&self) -> FailureKind {
        match self {
            Self::ElementNotFound { .. } => FailureKind::ElementNotResolved,
            Self::Cancelled { .. } => FailureKind::Cancelled,
            _ => FailureKind::TransportFault,
        }
    }
}

/// Step-level failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Selector resolver exhausted every strategy for a reference
    ElementNotResolved,
    /// Condition never held within its timeout
    AssertionTimeout,
    /// Authentication reached a different role than requested
    RoleMismatch,
    /// Scenario ended in a state other than the declared one
    FinalStateMismatch,
    /// Driver crash, disconnect, or navigation failure
    TransportFault,
    /// External abort or scenario deadline
    Cancelled,
}

impl FailureKind {
    /// Whether this kind is reported as `Errored` rather than `Failed`.
    ///
    /// `Failed` outcomes are expected and testable; `Errored` outcomes are
    /// suite-level problems for an operator.
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::TransportFault | Self::Cancelled)
    }

    /// Stable identifier used in reports
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ElementNotResolved => "element_not_resolved",
            Self::AssertionTimeout => "assertion_timeout",
            Self::RoleMismatch => "role_mismatch",
            Self::FinalStateMismatch => "final_state_mismatch",
            Self::TransportFault => "transport_fault",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
