//! Job and graph state machines.
//!
//! A job execution moves `Starting -> Running -> {Finished, Failed}`. The
//! starting state is never persisted: a job with no stored state has not
//! started yet.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default image-name suffix that makes the simulated workload fail.
pub const DEFAULT_FAILURE_MARKER: &str = "_toFail";

/// Persisted state of a job execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    /// The workload is executing.
    Running,
    /// The workload exited on its own.
    Finished {
        /// Exit code reported by the workload.
        exit_code: i32,
    },
    /// The workload failed.
    Failed {
        /// Human-readable failure reason.
        reason: String,
    },
}

impl JobState {
    /// Create a Finished state.
    pub fn finished(exit_code: i32) -> Self {
        JobState::Finished { exit_code }
    }

    /// Create a Failed state.
    pub fn failed(reason: impl Into<String>) -> Self {
        JobState::Failed {
            reason: reason.into(),
        }
    }

    /// Whether no further transitions may leave this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished { .. } | JobState::Failed { .. })
    }

    /// Check whether moving from `current` to `next` is a valid transition.
    ///
    /// `None` stands for the unpersisted starting state.
    pub fn allows(current: Option<&JobState>, next: &JobState) -> bool {
        match (current, next) {
            (None, JobState::Running) => true,
            (Some(JobState::Running), next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Running => write!(f, "running"),
            JobState::Finished { exit_code } => write!(f, "finished (exit: {})", exit_code),
            JobState::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Aggregate status of a graph execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphStatus {
    /// No job of the graph has started.
    Pending,
    /// At least one job is still in flight.
    Running,
    /// Every job reached a terminal state and none failed.
    Finished,
    /// Every job reached a terminal state and at least one failed.
    Failed,
}

impl GraphStatus {
    /// Whether the graph has reached a terminal status.
    pub fn is_finished(&self) -> bool {
        matches!(self, GraphStatus::Finished | GraphStatus::Failed)
    }

    /// Compute the graph status from the states of its jobs.
    pub fn aggregate<'a>(states: impl IntoIterator<Item = Option<&'a JobState>>) -> Self {
        let mut total = 0usize;
        let mut started = 0usize;
        let mut terminal = 0usize;
        let mut failed = false;

        for state in states {
            total += 1;
            if let Some(state) = state {
                started += 1;
                if state.is_terminal() {
                    terminal += 1;
                }
                if matches!(state, JobState::Failed { .. }) {
                    failed = true;
                }
            }
        }

        if total == 0 || started == 0 {
            GraphStatus::Pending
        } else if terminal < total {
            GraphStatus::Running
        } else if failed {
            GraphStatus::Failed
        } else {
            GraphStatus::Finished
        }
    }
}

impl fmt::Display for GraphStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GraphStatus::Pending => "pending",
            GraphStatus::Running => "running",
            GraphStatus::Finished => "finished",
            GraphStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Decides the terminal state of a simulated workload from its image name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalPolicy {
    failure_marker: String,
}

impl TerminalPolicy {
    /// Create a policy with a custom failure marker.
    pub fn new(failure_marker: impl Into<String>) -> Self {
        Self {
            failure_marker: failure_marker.into(),
        }
    }

    /// The image-name suffix that yields a failure.
    pub fn failure_marker(&self) -> &str {
        &self.failure_marker
    }

    /// Compute the terminal state for a workload that ran `image`.
    pub fn final_state(&self, image: &str) -> JobState {
        if !self.failure_marker.is_empty() && image.ends_with(&self.failure_marker) {
            return JobState::failed(format!(
                "Should fail because of the image name {}",
                image
            ));
        }
        JobState::finished(0)
    }
}

impl Default for TerminalPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_MARKER)
    }
}
