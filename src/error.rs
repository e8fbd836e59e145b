//! Error types for the status layer.

use thiserror::Error;

/// Errors from the backend API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The requested entity does not exist on the server.
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// The request could not be completed (network, timeout, 5xx).
    #[error("request failed: {reason}")]
    RequestFailed { reason: String },

    /// The server answered but the body was not what we expected.
    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::InvalidResponse {
                reason: err.to_string(),
            }
        } else {
            ApiError::RequestFailed {
                reason: err.to_string(),
            }
        }
    }
}

/// Invariant violations in the pipeline state machine.
///
/// These are programmer/logic errors, not user-facing conditions: callers are
/// expected to log them and leave the pipeline untouched rather than display
/// them as normal error text.
#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error("unknown stage '{id}'")]
    UnknownStage { id: String },

    #[error("stage '{stage}' cannot begin before '{prior}' is terminal")]
    OutOfOrder { stage: String, prior: String },

    #[error("stage '{stage}' is {status}, expected {expected}")]
    InvalidTransition {
        stage: String,
        status: String,
        expected: String,
    },

    #[error("stage '{stage}' progress went backwards ({from} -> {to})")]
    ProgressRegression { stage: String, from: f64, to: f64 },

    #[error("run {expected} was superseded by run {actual}")]
    RunSuperseded { expected: u64, actual: u64 },
}

/// Errors from the demo driver.
#[derive(Debug, Error, PartialEq)]
pub enum DemoError {
    #[error("a demo run is already active")]
    AlreadyRunning,
}
