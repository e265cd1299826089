//! Error types for jailed execution

use thiserror::Error;

/// Errors surfaced by [`crate::SafeExec::execute`]
#[derive(Debug, Error)]
pub enum ExecError {
    /// The foreign code raised, or the far side exited non-zero.
    ///
    /// Carries runner stderr on the isolated path and `Kind: message` on the
    /// debug path.
    #[error("Couldn't execute jailed code: {0}")]
    Execution(String),

    /// The request was rejected before anything was invoked
    #[error("Invalid execution request: {0}")]
    Packaging(String),

    /// The runner reported success but its stdout is not four well-formed frames
    #[error("Jailed code produced malformed output: {0}")]
    Protocol(String),

    /// The isolation runner could not be invoked at all
    #[error("Isolation runner failed: {0:#}")]
    Runner(#[source] anyhow::Error),

    /// Files could not be staged into the scratch directory
    #[error("Failed to stage files: {0}")]
    Staging(#[from] std::io::Error),

    /// The embedded interpreter failed outside of the caller's code
    #[error("Embedded interpreter error: {0}")]
    Interpreter(String),
}

impl ExecError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        ExecError::Protocol(message.into())
    }

    pub(crate) fn packaging(message: impl Into<String>) -> Self {
        ExecError::Packaging(message.into())
    }

    /// Whether the failure originated in the foreign code itself
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, ExecError::Execution(_))
    }
}
