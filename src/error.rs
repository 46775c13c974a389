use std::time::Duration;

use llgym_benchmark::BenchmarkError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cost::{BaselinePolicy, CostFunction};
use crate::session::SessionId;

pub type Result<T> = std::result::Result<T, GymError>;

#[derive(Debug, Error)]
pub enum GymError {
    /// Malformed or unverifiable IR. Fatal to the operation, not the session.
    #[error("invalid module: {reason}")]
    InvalidModule { reason: String },

    #[error("unknown action `{action}` at index {index}")]
    UnknownAction { index: usize, action: String },

    /// A known action whose pass pipeline LLVM refused to run.
    #[error("action `{action}` at index {index} failed: {reason}")]
    ActionFailed {
        index: usize,
        action: String,
        reason: String,
    },

    #[error("computing {cost_function} failed in the backend: {reason}")]
    BackendCompilationFailed {
        cost_function: CostFunction,
        reason: String,
    },

    #[error("baseline {policy} could not be computed: {reason}")]
    BaselineComputationFailed {
        policy: BaselinePolicy,
        reason: String,
    },

    #[error("code generation target unavailable: {0}")]
    TargetUnavailable(String),

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("session {0} has been terminated")]
    SessionTerminated(SessionId),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        session: Option<SessionId>,
        operation: &'static str,
        elapsed: Duration,
    },

    #[error(transparent)]
    Benchmark(#[from] BenchmarkError),
}

/// Wire-level discriminant of a [`GymError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidModule,
    UnknownAction,
    ActionFailed,
    BackendCompilationFailed,
    BaselineComputationFailed,
    TargetUnavailable,
    SessionNotFound,
    SessionTerminated,
    ResourceExhausted,
    Timeout,
    Benchmark,
    InvalidRequest,
}

impl GymError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidModule { .. } => ErrorKind::InvalidModule,
            Self::UnknownAction { .. } => ErrorKind::UnknownAction,
            Self::ActionFailed { .. } => ErrorKind::ActionFailed,
            Self::BackendCompilationFailed { .. } => ErrorKind::BackendCompilationFailed,
            Self::BaselineComputationFailed { .. } => ErrorKind::BaselineComputationFailed,
            Self::TargetUnavailable(_) => ErrorKind::TargetUnavailable,
            Self::SessionNotFound(_) => ErrorKind::SessionNotFound,
            Self::SessionTerminated(_) => ErrorKind::SessionTerminated,
            Self::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Benchmark(_) => ErrorKind::Benchmark,
        }
    }
}
