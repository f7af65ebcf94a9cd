//! Scheduler type definitions.
//!
//! This module contains the error type and the resolved execution settings
//! shared by every execution task.

use std::time::Duration;
use thiserror::Error;

use crate::config::SchedulerConfig;
use crate::core::state::{JobState, TerminalPolicy};
use crate::core::types::JobExecutionId;
use crate::lifetime::LifetimeError;
use crate::registry::RegistryError;
use crate::storage::StorageError;

/// Name of the transaction that moves a job to Running.
pub(crate) const START_EXECUTION_TX: &str = "start-execution";

/// Name of the transaction that moves a job to its terminal state.
pub(crate) const FINISH_EXECUTION_TX: &str = "finish-execution";

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No job execution with this id exists in storage.
    #[error("job execution {0} is not found")]
    NotFound(JobExecutionId),

    /// The job execution exists but this scheduler cannot run its kind.
    #[error("job execution {id} has unsupported kind '{kind}'")]
    TypeMismatch {
        id: JobExecutionId,
        kind: &'static str,
    },

    /// A termination request names a job that is not running.
    #[error("job execution {0} is not running")]
    NotRunning(JobExecutionId),

    /// The operation is disabled or not implemented.
    #[error("{0} is not supported")]
    Unsupported(String),

    /// No status handler has been subscribed.
    #[error("no status update handler subscribed")]
    NoSubscriber,

    /// The state machine does not allow this transition.
    #[error("invalid transition for job execution {id}: {from} -> {to}")]
    InvalidTransition {
        id: JobExecutionId,
        from: String,
        to: JobState,
    },

    /// The scheduler's root lifetime has been terminated.
    #[error("scheduler is shutting down")]
    ShuttingDown,

    /// There is no Tokio runtime to spawn work on.
    #[error("no async runtime available to dispatch work")]
    NoRuntime,

    /// Registry error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Lifetime cleanup error.
    #[error("lifetime error: {0}")]
    Lifetime(#[from] LifetimeError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Resolved settings used by execution tasks.
#[derive(Debug, Clone)]
pub(crate) struct ExecutionSettings {
    pub(crate) tick_interval: Duration,
    pub(crate) ticks_to_complete: u32,
    pub(crate) terminal_policy: TerminalPolicy,
    pub(crate) allow_termination: bool,
    pub(crate) shutdown_timeout: Duration,
}

impl From<&SchedulerConfig> for ExecutionSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            ticks_to_complete: config.ticks_to_complete,
            terminal_policy: config.terminal_policy(),
            allow_termination: config.allow_termination,
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}
