//! Error types for harness operations.
//!
//! The variants follow the failure taxonomy of a scenario: an instance that
//! never starts, an instance that never becomes ready, a client command that
//! fails, and an observed result that does not match the expected literal.
//! Cleanup failures are not represented here; they are logged and dropped
//! by the resource guards.

use std::time::Duration;

use crate::instance::InstanceState;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Result alias used throughout the harness.
pub type HarnessResult<T> = Result<T, Error>;

/// Errors that can occur while driving a database instance.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The container runtime could not be reached.
    ///
    /// Usually means the Docker daemon is not running or the socket is not
    /// accessible to the current user.
    #[error("Container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// The instance could not be created or started.
    ///
    /// The runtime returned no usable handle, so the scenario aborts before
    /// any polling happens.
    #[error("Instance '{name}' failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    /// The instance stopped running before its readiness signal appeared.
    ///
    /// `logs` holds the tail of the instance output at the time the exit
    /// was noticed.
    #[error("Instance '{name}' exited before becoming ready. Last log lines:\n{logs}")]
    InstanceExited { name: String, logs: String },

    /// The readiness signal did not appear within the configured bound.
    #[error(
        "Instance '{name}' did not log a line matching '{pattern}' within {timeout:?}. Last log lines:\n{logs}"
    )]
    ReadinessTimeout {
        name: String,
        pattern: String,
        timeout: Duration,
        logs: String,
    },

    /// A client command ran but exited with a non-zero status.
    #[error("Client command against '{name}' exited with code {exit_code}: {output}")]
    CommandFailed {
        name: String,
        exit_code: i64,
        output: String,
    },

    /// Observed output did not match the expected literal.
    #[error("Assertion failed: expected {expected:?}, got {actual:?}")]
    AssertionFailed { expected: String, actual: String },

    /// An instance was moved through its lifecycle out of order.
    #[error("Instance '{name}' cannot move from {from} to {to}")]
    InvalidTransition {
        name: String,
        from: InstanceState,
        to: InstanceState,
    },

    /// The readiness pattern is not a valid regular expression.
    #[error("Invalid readiness pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Harness configuration was rejected.
    #[error("Invalid harness configuration: {0}")]
    Configuration(String),

    /// A call to the Docker API failed.
    #[error("Docker API error: {0}")]
    Runtime(#[from] bollard::errors::Error),
}

impl Error {
    /// Returns true when the error means the scenario never reached a ready
    /// instance.
    pub fn is_startup_related(&self) -> bool {
        matches!(
            self,
            Error::StartupFailed { .. }
                | Error::InstanceExited { .. }
                | Error::ReadinessTimeout { .. }
        )
    }
}
