//! Status events and the traits that receive them.
//!
//! Every event is delivered synchronously inside the storage transaction
//! that produced it, so handlers can read and write through that same
//! transaction and their failure aborts it.

use serde::{Deserialize, Serialize};

use crate::core::job::JobExecutionEntity;
use crate::core::state::{GraphStatus, JobState};
use crate::core::types::{GraphExecutionId, JobExecutionId};
use crate::storage::{StorageError, StorageTransaction};

/// A job execution moved to a new state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdateEvent {
    /// The job execution that changed.
    pub entity: JobExecutionEntity,
    /// The state it moved to.
    pub new_state: JobState,
}

impl StatusUpdateEvent {
    /// Create a status update event.
    pub fn new(entity: JobExecutionEntity, new_state: JobState) -> Self {
        Self { entity, new_state }
    }

    /// Id of the job execution that changed.
    pub fn job_id(&self) -> JobExecutionId {
        self.entity.id
    }
}

/// A job status change, as seen by execution observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusChangedEvent {
    pub job_id: JobExecutionId,
    pub graph_id: GraphExecutionId,
    pub new_state: JobState,
}

impl From<&StatusUpdateEvent> for JobStatusChangedEvent {
    fn from(event: &StatusUpdateEvent) -> Self {
        Self {
            job_id: event.entity.id,
            graph_id: event.entity.graph_id.clone(),
            new_state: event.new_state.clone(),
        }
    }
}

/// A graph execution moved to a new aggregate status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStatusChangedEvent {
    pub graph_id: GraphExecutionId,
    /// Status before the change, if one was recorded.
    pub old_status: Option<GraphStatus>,
    pub new_status: GraphStatus,
}

/// Receiver of job status updates.
///
/// Exactly one handler is subscribed to a scheduler at a time.
pub trait JobExecutionStatusUpdateHandler: Send + Sync {
    /// Handle a batch of distinct status updates inside `tx`.
    ///
    /// Returning an error rolls the transaction back.
    fn handle(
        &self,
        tx: &mut dyn StorageTransaction,
        events: &[StatusUpdateEvent],
    ) -> Result<(), StorageError>;
}

/// Hooks invoked before status changes are committed.
pub trait ExecutionObserver: Send + Sync {
    /// Called with exactly the graph changes about to be committed in `tx`.
    fn on_before_graph_status_changed(
        &self,
        tx: &mut dyn StorageTransaction,
        events: &[GraphStatusChangedEvent],
    );

    /// Called with exactly the job changes about to be committed in `tx`.
    fn on_before_job_status_changed(
        &self,
        tx: &mut dyn StorageTransaction,
        events: &[JobStatusChangedEvent],
    );
}
