//! Graph status tracking.
//!
//! [`GraphStatusTracker`] is a status update handler that keeps the
//! aggregate status of every graph execution in step with its jobs. For each
//! batch it invokes the observer hooks with exactly the changes about to be
//! committed, inside the same transaction:
//!
//! 1. the job hook, with one event per job status update
//! 2. the graph hook, with one event per graph whose aggregate changed
//!
//! and then writes the new graph statuses. An optional downstream handler
//! receives the same batch afterwards.

use std::sync::Arc;

use crate::core::state::GraphStatus;
use crate::core::types::GraphExecutionId;
use crate::events::{
    ExecutionObserver, GraphStatusChangedEvent, JobExecutionStatusUpdateHandler,
    JobStatusChangedEvent, StatusUpdateEvent,
};
use crate::storage::{StorageError, StorageTransaction};

/// Status update handler that maintains graph statuses.
pub struct GraphStatusTracker {
    observer: Arc<dyn ExecutionObserver>,
    forward: Option<Arc<dyn JobExecutionStatusUpdateHandler>>,
}

impl GraphStatusTracker {
    /// Create a tracker that reports to `observer`.
    pub fn new(observer: Arc<dyn ExecutionObserver>) -> Self {
        Self {
            observer,
            forward: None,
        }
    }

    /// Pass every batch on to `handler` after graph statuses are updated.
    pub fn with_forward(mut self, handler: Arc<dyn JobExecutionStatusUpdateHandler>) -> Self {
        self.forward = Some(handler);
        self
    }

    fn graph_changes(
        &self,
        tx: &mut dyn StorageTransaction,
        events: &[StatusUpdateEvent],
    ) -> Result<Vec<GraphStatusChangedEvent>, StorageError> {
        let mut graphs: Vec<&GraphExecutionId> = Vec::new();
        for event in events {
            if !graphs.contains(&&event.entity.graph_id) {
                graphs.push(&event.entity.graph_id);
            }
        }

        let mut changes = Vec::new();
        for graph in graphs {
            let jobs = tx.graph_jobs(graph)?;
            let states = jobs
                .iter()
                .map(|job| tx.job_state(job.id))
                .collect::<Result<Vec<_>, _>>()?;
            let new_status = GraphStatus::aggregate(states.iter().map(Option::as_ref));
            let old_status = tx.graph_status(graph)?;

            if old_status != Some(new_status) {
                changes.push(GraphStatusChangedEvent {
                    graph_id: graph.clone(),
                    old_status,
                    new_status,
                });
            }
        }
        Ok(changes)
    }
}

impl JobExecutionStatusUpdateHandler for GraphStatusTracker {
    fn handle(
        &self,
        tx: &mut dyn StorageTransaction,
        events: &[StatusUpdateEvent],
    ) -> Result<(), StorageError> {
        let job_events: Vec<JobStatusChangedEvent> = events.iter().map(Into::into).collect();
        self.observer.on_before_job_status_changed(tx, &job_events);

        let changes = self.graph_changes(tx, events)?;
        if !changes.is_empty() {
            self.observer.on_before_graph_status_changed(tx, &changes);
            for change in &changes {
                tracing::debug!(
                    graph_id = %change.graph_id,
                    status = %change.new_status,
                    "Graph status changed"
                );
                tx.update_graph_status(&change.graph_id, change.new_status)?;
            }
        }

        if let Some(forward) = &self.forward {
            forward.handle(tx, events)?;
        }
        Ok(())
    }
}
