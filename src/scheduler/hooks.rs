//! Pre-commit observer hooks.

use std::sync::Arc;

use crate::events::{ExecutionObserver, GraphStatusChangedEvent, JobStatusChangedEvent};
use crate::host::HostProcess;
use crate::storage::StorageTransaction;

/// Exit code reported to the host when a graph completes.
pub const GRAPH_COMPLETED_EXIT_CODE: i32 = 0;

/// Observer that tells the host process to exit once a graph completes.
#[derive(Clone)]
pub struct HostNotifier {
    host: Arc<dyn HostProcess>,
}

impl HostNotifier {
    /// Create an observer that signals `host`.
    pub fn new(host: Arc<dyn HostProcess>) -> Self {
        Self { host }
    }
}

impl ExecutionObserver for HostNotifier {
    fn on_before_graph_status_changed(
        &self,
        tx: &mut dyn StorageTransaction,
        events: &[GraphStatusChangedEvent],
    ) {
        let Some(finished) = events.iter().find(|e| e.new_status.is_finished()) else {
            return;
        };

        tracing::info!(
            graph_id = %finished.graph_id,
            status = %finished.new_status,
            tx = tx.name(),
            "Graph execution completed, signalling host"
        );
        self.host.notify_process_terminated(GRAPH_COMPLETED_EXIT_CODE);
    }

    fn on_before_job_status_changed(
        &self,
        tx: &mut dyn StorageTransaction,
        events: &[JobStatusChangedEvent],
    ) {
        for event in events {
            tracing::trace!(
                job_id = %event.job_id,
                graph_id = %event.graph_id,
                state = %event.new_state,
                tx = tx.name(),
                "Job status about to change"
            );
        }
    }
}
