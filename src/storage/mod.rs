//! Storage abstraction for job executions and their states.
//!
//! All state-mutating access goes through a [`StorageTransaction`]. A
//! transaction is committed explicitly; dropping it without committing rolls
//! it back. [`TransactionalGateway`] wraps the begin/commit/rollback dance
//! around a closure.

mod gateway;
mod memory;

pub use gateway::TransactionalGateway;
pub use memory::InMemoryExecutionStorage;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::job::JobExecutionEntity;
use crate::core::state::{GraphStatus, JobState};
use crate::core::types::{GraphExecutionId, JobExecutionId, TransactionId};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested item was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A duplicate key was detected.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// A subscriber rejected the changes of a transaction.
    #[error("transaction '{name}' rejected: {reason}")]
    Rejected { name: String, reason: String },

    /// Generic storage error.
    #[error("storage error: {0}")]
    Other(String),
}

/// An open unit of work against the storage.
///
/// Reads observe the transaction's own uncommitted writes.
pub trait StorageTransaction: Send {
    /// Unique id of this transaction.
    fn id(&self) -> TransactionId;

    /// Name given when the transaction was opened.
    fn name(&self) -> &str;

    /// Load a job execution record.
    fn find_job_execution(
        &self,
        id: JobExecutionId,
    ) -> Result<Option<JobExecutionEntity>, StorageError>;

    /// Current state of a job execution. `None` means it has not started.
    fn job_state(&self, id: JobExecutionId) -> Result<Option<JobState>, StorageError>;

    /// Persist a new state for an existing job execution.
    fn update_job_state(&mut self, id: JobExecutionId, state: JobState)
    -> Result<(), StorageError>;

    /// All job executions of a graph, ordered by id.
    fn graph_jobs(&self, graph: &GraphExecutionId)
    -> Result<Vec<JobExecutionEntity>, StorageError>;

    /// Current status of a graph, if one was ever recorded.
    fn graph_status(&self, graph: &GraphExecutionId) -> Result<Option<GraphStatus>, StorageError>;

    /// Persist a new status for a graph.
    fn update_graph_status(
        &mut self,
        graph: &GraphExecutionId,
        status: GraphStatus,
    ) -> Result<(), StorageError>;

    /// Make every write of this transaction visible.
    fn commit(self: Box<Self>) -> Result<(), StorageError>;
}

/// Storage backend for job executions.
#[async_trait]
pub trait ExecutionStorage: Send + Sync {
    /// Open a named transaction.
    ///
    /// Transactions are isolated from each other: a backend may serialise
    /// them, in which case this waits for the previous one to finish.
    async fn begin(&self, name: &str) -> Result<Box<dyn StorageTransaction>, StorageError>;

    /// Load a job execution record outside of any write transaction.
    async fn find_job_execution(
        &self,
        id: JobExecutionId,
    ) -> Result<Option<JobExecutionEntity>, StorageError> {
        let tx = self.begin("find-job-execution").await?;
        tx.find_job_execution(id)
    }

    /// Read the committed state of a job execution.
    async fn job_state(&self, id: JobExecutionId) -> Result<Option<JobState>, StorageError> {
        let tx = self.begin("read-job-state").await?;
        tx.job_state(id)
    }

    /// Read the committed status of a graph.
    async fn graph_status(
        &self,
        graph: &GraphExecutionId,
    ) -> Result<Option<GraphStatus>, StorageError> {
        let tx = self.begin("read-graph-status").await?;
        tx.graph_status(graph)
    }
}
