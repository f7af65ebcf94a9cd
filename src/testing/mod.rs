//! Testing utilities for users of the jobexec library.
//!
//! This module provides recording implementations of the collaborator
//! traits, so tests can assert on what the scheduler did:
//!
//! - [`RecordingStatusHandler`]: captures every status update and its transaction
//! - [`RecordingObserver`]: captures graph and job hook invocations
//! - [`RecordingHost`]: captures host termination signals
//! - [`RecordingProgressLog`]: captures progress lines
//! - [`eventually`]: polls a condition until it holds or a timeout expires

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::core::job::JobExecutionEntity;
use crate::core::state::JobState;
use crate::core::types::JobExecutionId;
use crate::events::{
    ExecutionObserver, GraphStatusChangedEvent, JobExecutionStatusUpdateHandler,
    JobStatusChangedEvent, StatusUpdateEvent,
};
use crate::host::{HostProcess, ProgressLog};
use crate::storage::{InMemoryExecutionStorage, StorageError, StorageTransaction};

fn snapshot<T: Clone>(items: &Mutex<Vec<T>>) -> Vec<T> {
    items.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

fn record<T>(items: &Mutex<Vec<T>>, item: T) {
    items.lock().unwrap_or_else(PoisonError::into_inner).push(item);
}

/// A status update handler that records every event it receives.
///
/// # Example
///
/// ```
/// use jobexec::testing::RecordingStatusHandler;
///
/// let handler = RecordingStatusHandler::new();
/// // scheduler.subscribe(handler.clone());
/// assert!(handler.events().is_empty());
/// assert_eq!(handler.terminal_count(), 0);
/// ```
#[derive(Debug, Default)]
pub struct RecordingStatusHandler {
    received: Mutex<Vec<(String, StatusUpdateEvent)>>,
}

impl RecordingStatusHandler {
    /// Create a new recording handler.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every event received, in order.
    pub fn events(&self) -> Vec<StatusUpdateEvent> {
        snapshot(&self.received)
            .into_iter()
            .map(|(_, event)| event)
            .collect()
    }

    /// Name of the transaction each event was delivered in, in order.
    pub fn transactions(&self) -> Vec<String> {
        snapshot(&self.received)
            .into_iter()
            .map(|(tx, _)| tx)
            .collect()
    }

    /// States received for one job execution, in order.
    pub fn states_for(&self, id: JobExecutionId) -> Vec<JobState> {
        self.events()
            .into_iter()
            .filter(|e| e.job_id() == id)
            .map(|e| e.new_state)
            .collect()
    }

    /// Number of terminal states received across all jobs.
    pub fn terminal_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| e.new_state.is_terminal())
            .count()
    }
}

impl JobExecutionStatusUpdateHandler for RecordingStatusHandler {
    fn handle(
        &self,
        tx: &mut dyn StorageTransaction,
        events: &[StatusUpdateEvent],
    ) -> Result<(), StorageError> {
        for event in events {
            record(&self.received, (tx.name().to_string(), event.clone()));
        }
        Ok(())
    }
}

/// An observer that records every hook invocation.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    graph_events: Mutex<Vec<GraphStatusChangedEvent>>,
    job_events: Mutex<Vec<JobStatusChangedEvent>>,
}

impl RecordingObserver {
    /// Create a new recording observer.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Graph events received, in order.
    pub fn graph_events(&self) -> Vec<GraphStatusChangedEvent> {
        snapshot(&self.graph_events)
    }

    /// Job events received, in order.
    pub fn job_events(&self) -> Vec<JobStatusChangedEvent> {
        snapshot(&self.job_events)
    }
}

impl ExecutionObserver for RecordingObserver {
    fn on_before_graph_status_changed(
        &self,
        _tx: &mut dyn StorageTransaction,
        events: &[GraphStatusChangedEvent],
    ) {
        for event in events {
            record(&self.graph_events, event.clone());
        }
    }

    fn on_before_job_status_changed(
        &self,
        _tx: &mut dyn StorageTransaction,
        events: &[JobStatusChangedEvent],
    ) {
        for event in events {
            record(&self.job_events, event.clone());
        }
    }
}

/// A host process that records termination signals.
#[derive(Debug, Default)]
pub struct RecordingHost {
    exit_codes: Mutex<Vec<i32>>,
}

impl RecordingHost {
    /// Create a new recording host.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Exit codes received, in order.
    pub fn exit_codes(&self) -> Vec<i32> {
        snapshot(&self.exit_codes)
    }
}

impl HostProcess for RecordingHost {
    fn notify_process_terminated(&self, exit_code: i32) {
        record(&self.exit_codes, exit_code);
    }
}

/// A progress log that records every line.
#[derive(Debug, Default)]
pub struct RecordingProgressLog {
    lines: Mutex<Vec<String>>,
}

impl RecordingProgressLog {
    /// Create a new recording progress log.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Lines logged, in order.
    pub fn lines(&self) -> Vec<String> {
        snapshot(&self.lines)
    }
}

impl ProgressLog for RecordingProgressLog {
    fn log(&self, line: String) {
        record(&self.lines, line);
    }
}

/// Create in-memory storage holding `entities`.
pub async fn storage_with(
    entities: impl IntoIterator<Item = JobExecutionEntity>,
) -> Result<Arc<InMemoryExecutionStorage>, StorageError> {
    let storage = InMemoryExecutionStorage::new();
    for entity in entities {
        storage.save_job_execution(entity).await?;
    }
    Ok(Arc::new(storage))
}

/// Poll `condition` every 10ms until it holds or `timeout` expires.
///
/// Returns whether the condition held.
pub async fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
