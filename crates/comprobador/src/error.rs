//! Error types for the CLI

use comprobar::ComprobarError;
use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Exit code for a batch with failing or errored scenarios
pub const EXIT_SCENARIO_FAILURE: u8 = 1;

/// Exit code for bad input: arguments, configuration or scenario files
pub const EXIT_USAGE: u8 = 2;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// One or more scenario files failed validation
    #[error("Validation failed: {message}")]
    Validation {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Harness library error
    #[error("{0}")]
    Comprobar(#[from] ComprobarError),
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a validation error
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Process exit code for this error
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config { .. } | Self::InvalidArgument { .. } | Self::Validation { .. } => {
                EXIT_USAGE
            }
            Self::Comprobar(
                ComprobarError::Config { .. }
                | ComprobarError::InvalidScenario { .. }
                | ComprobarError::Yaml(_),
            ) => EXIT_USAGE,
            Self::Io(_) | Self::Comprobar(_) => EXIT_SCENARIO_FAILURE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let err = CliError::config("bad config");
        assert!(err.to_string().contains("Configuration"));
        assert!(err.to_string().contains("bad config"));
        assert_eq!(err.exit_code(), EXIT_USAGE);
    }

    #[test]
    fn test_validation_error() {
        let err = CliError::validation("2 of 3 files invalid");
        assert!(err.to_string().starts_with("Validation failed"));
        assert_eq!(err.exit_code(), EXIT_USAGE);
    }

    #[test]
    fn test_library_errors() {
        let err: CliError = ComprobarError::invalid_scenario("no steps").into();
        assert_eq!(err.exit_code(), EXIT_USAGE);
        assert!(err.to_string().contains("no steps"));

        let err: CliError = ComprobarError::BrowserNotFound.into();
        assert_eq!(err.exit_code(), EXIT_SCENARIO_FAILURE);
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cli_err: CliError = io_err.into();
        assert!(cli_err.to_string().contains("I/O"));
        assert_eq!(cli_err.exit_code(), EXIT_SCENARIO_FAILURE);
    }
}
