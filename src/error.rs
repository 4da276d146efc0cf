//! Error types for deployment runs

use crate::core::condition::Observation;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while executing commands, waiting for readiness or running
/// the pipeline
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("command `{command}` exited with status {exit_status}: {stderr}")]
    CommandFailed {
        command: String,
        exit_status: i32,
        stderr: String,
    },

    #[error("command `{command}` did not finish within {}s", .timeout.as_secs())]
    CommandTimedOut { command: String, timeout: Duration },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "timed out waiting for {condition} after {}s (last observed: {last_observed})",
        .elapsed.as_secs()
    )]
    TimeoutExceeded {
        condition: String,
        elapsed: Duration,
        last_observed: Observation,
    },

    #[error("step {step_index} ({step_name}) failed: {cause}")]
    RunAborted {
        step_index: usize,
        step_name: String,
        #[source]
        cause: Box<DeployError>,
    },

    #[error("aborted: {0}")]
    Aborted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl DeployError {
    /// Create an explicit abort from stage logic
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted(reason.into())
    }

    /// The underlying cause when this is a run-level failure
    pub fn root_cause(&self) -> &DeployError {
        match self {
            Self::RunAborted { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}
