//! Dispatcher error types.

use std::time::Duration;

use thiserror::Error;

use crate::job::JobStatus;
use crate::trigger::TriggerSymbol;

/// Errors returned to callers of the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown trigger: {0}")]
    UnknownTrigger(String),

    #[error("Invalid dispatch options: {0}")]
    InvalidOptions(String),

    #[error("No executor registered for trigger '{0}'")]
    NoExecutor(TriggerSymbol),

    #[error(transparent)]
    Core(#[from] workclaw_core::WorkClawError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors raised by an executor body.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutorError {
    #[error("{0}")]
    Failed(String),

    /// The executor noticed its cancellation token and stopped early.
    #[error("cancelled")]
    Cancelled,

    #[error("timed out after {}s", .0.as_secs_f64())]
    TimedOut(Duration),
}

/// A lifecycle transition the state machine does not allow.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("invalid transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}
