//! In-memory storage implementation.
//!
//! Provides a transactional in-memory backend for testing and development.
//! Transactions are serialised: `begin` holds an owned lock on the tables
//! until the transaction is committed or dropped, and writes are staged on
//! a private copy of the tables. The commit log lives outside the tables
//! and keeps only the most recent transaction names.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{ExecutionStorage, StorageError, StorageTransaction};
use crate::core::job::JobExecutionEntity;
use crate::core::state::{GraphStatus, JobState};
use crate::core::types::{GraphExecutionId, JobExecutionId, TransactionId};

#[derive(Debug, Clone, Default)]
struct Tables {
    executions: HashMap<JobExecutionId, JobExecutionEntity>,
    job_states: HashMap<JobExecutionId, JobState>,
    graph_statuses: HashMap<GraphExecutionId, GraphStatus>,
}

/// Default number of committed transaction names kept.
const DEFAULT_COMMIT_LOG_CAPACITY: usize = 1024;

#[derive(Debug)]
struct CommitLog {
    names: VecDeque<String>,
    capacity: usize,
}

impl CommitLog {
    fn record(&mut self, name: String) {
        if self.capacity == 0 {
            return;
        }
        if self.names.len() == self.capacity {
            self.names.pop_front();
        }
        self.names.push_back(name);
    }
}

type SharedCommitLog = Arc<std::sync::Mutex<CommitLog>>;

/// In-memory storage backend.
///
/// Data is not persisted across restarts.
pub struct InMemoryExecutionStorage {
    tables: Arc<Mutex<Tables>>,
    commit_log: SharedCommitLog,
}

impl InMemoryExecutionStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self::with_commit_log_capacity(DEFAULT_COMMIT_LOG_CAPACITY)
    }

    /// Create a new empty in-memory storage that remembers the names of at
    /// most `capacity` committed transactions.
    pub fn with_commit_log_capacity(capacity: usize) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            commit_log: Arc::new(std::sync::Mutex::new(CommitLog {
                names: VecDeque::with_capacity(capacity.min(DEFAULT_COMMIT_LOG_CAPACITY)),
                capacity,
            })),
        }
    }

    /// Save a job execution record.
    pub async fn save_job_execution(&self, entity: JobExecutionEntity) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().await;
        if tables.executions.contains_key(&entity.id) {
            return Err(StorageError::DuplicateKey(format!(
                "job execution: {}",
                entity.id
            )));
        }
        tables.executions.insert(entity.id, entity);
        Ok(())
    }

    /// List all job execution records, ordered by id.
    pub async fn list_job_executions(&self) -> Vec<JobExecutionEntity> {
        let tables = self.tables.lock().await;
        let mut result: Vec<_> = tables.executions.values().cloned().collect();
        result.sort_by_key(|e| e.id);
        result
    }

    /// Names of the most recently committed transactions, oldest first.
    pub async fn committed_transactions(&self) -> Vec<String> {
        // Wait for a transaction in flight so its commit is visible.
        let _tables = self.tables.lock().await;
        self.commit_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .iter()
            .cloned()
            .collect()
    }
}

impl Default for InMemoryExecutionStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionStorage for InMemoryExecutionStorage {
    async fn begin(&self, name: &str) -> Result<Box<dyn StorageTransaction>, StorageError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction {
            id: TransactionId::new(),
            name: name.to_string(),
            guard,
            staged,
            commit_log: Arc::clone(&self.commit_log),
        }))
    }
}

/// A transaction over [`InMemoryExecutionStorage`].
struct MemoryTransaction {
    id: TransactionId,
    name: String,
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    commit_log: SharedCommitLog,
}

impl StorageTransaction for MemoryTransaction {
    fn id(&self) -> TransactionId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn find_job_execution(
        &self,
        id: JobExecutionId,
    ) -> Result<Option<JobExecutionEntity>, StorageError> {
        Ok(self.staged.executions.get(&id).cloned())
    }

    fn job_state(&self, id: JobExecutionId) -> Result<Option<JobState>, StorageError> {
        Ok(self.staged.job_states.get(&id).cloned())
    }

    fn update_job_state(
        &mut self,
        id: JobExecutionId,
        state: JobState,
    ) -> Result<(), StorageError> {
        if !self.staged.executions.contains_key(&id) {
            return Err(StorageError::NotFound(format!("job execution: {}", id)));
        }
        self.staged.job_states.insert(id, state);
        Ok(())
    }

    fn graph_jobs(
        &self,
        graph: &GraphExecutionId,
    ) -> Result<Vec<JobExecutionEntity>, StorageError> {
        let mut result: Vec<_> = self
            .staged
            .executions
            .values()
            .filter(|e| &e.graph_id == graph)
            .cloned()
            .collect();
        result.sort_by_key(|e| e.id);
        Ok(result)
    }

    fn graph_status(&self, graph: &GraphExecutionId) -> Result<Option<GraphStatus>, StorageError> {
        Ok(self.staged.graph_statuses.get(graph).copied())
    }

    fn update_graph_status(
        &mut self,
        graph: &GraphExecutionId,
        status: GraphStatus,
    ) -> Result<(), StorageError> {
        self.staged.graph_statuses.insert(graph.clone(), status);
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let MemoryTransaction {
            name,
            mut guard,
            staged,
            commit_log,
            ..
        } = *self;
        *guard = staged;
        commit_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(name);
        Ok(())
    }
}
