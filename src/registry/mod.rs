//! Registry of running job executions.
//!
//! Maps a job-execution id to the handle of its running task. The registry
//! is owned by whoever constructs the scheduler and shared by cloning.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use thiserror::Error;

use crate::core::types::JobExecutionId;
use crate::lifetime::{Lifetime, LifetimeId};

/// Errors that can occur when registering a running job.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A live handle is already registered under this id.
    #[error("job execution {0} is already running")]
    AlreadyRunning(JobExecutionId),
}

/// What `put` does when a live handle already exists for the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryPolicy {
    /// Reject the new handle with [`RegistryError::AlreadyRunning`].
    Strict,
    /// Replace the handle and terminate the replaced handle's lifetime.
    Overwrite,
}

impl Default for RegistryPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            RegistryPolicy::Strict
        } else {
            RegistryPolicy::Overwrite
        }
    }
}

/// In-memory handle of a running job execution.
#[derive(Debug, Clone)]
pub struct RunningJobHandle {
    id: JobExecutionId,
    image: String,
    lifetime: Lifetime,
    started_at: Instant,
}

impl RunningJobHandle {
    /// Create a handle owning `lifetime`.
    pub fn new(id: JobExecutionId, image: impl Into<String>, lifetime: Lifetime) -> Self {
        Self {
            id,
            image: image.into(),
            lifetime,
            started_at: Instant::now(),
        }
    }

    /// The job execution this handle belongs to.
    pub fn id(&self) -> JobExecutionId {
        self.id
    }

    /// Image the simulated container runs.
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Lifetime of the running job.
    pub fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    /// When the handle was created.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }
}

/// Concurrent map from job-execution id to running handle.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<JobExecutionId, RunningJobHandle>>>,
    policy: RegistryPolicy,
}

impl JobRegistry {
    /// Create an empty registry with the build's default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with an explicit policy.
    pub fn with_policy(policy: RegistryPolicy) -> Self {
        Self {
            jobs: Arc::default(),
            policy,
        }
    }

    /// The duplicate-registration policy.
    pub fn policy(&self) -> RegistryPolicy {
        self.policy
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobExecutionId, RunningJobHandle>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobExecutionId, RunningJobHandle>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a running job.
    ///
    /// A handle whose lifetime is already terminated is replaced silently.
    /// A live handle is handled according to the registry policy.
    pub fn put(&self, handle: RunningJobHandle) -> Result<(), RegistryError> {
        let id = handle.id;
        let replaced = {
            let mut jobs = self.write();
            let live = jobs
                .get(&id)
                .is_some_and(|existing| !existing.lifetime.is_terminated());

            if live && self.policy == RegistryPolicy::Strict {
                tracing::error!(job_id = %id, "Refusing to register a second running handle");
                return Err(RegistryError::AlreadyRunning(id));
            }
            jobs.insert(id, handle).filter(|_| live)
        };

        // Terminate outside the lock: the replaced job's cleanup touches the registry.
        if let Some(old) = replaced {
            tracing::warn!(
                job_id = %id,
                lifetime = %old.lifetime.id(),
                "Overwriting running handle, terminating the replaced one"
            );
            if let Err(e) = old.lifetime.terminate() {
                tracing::warn!(job_id = %id, error = %e, "Replaced handle cleanup failed");
            }
        }
        Ok(())
    }

    /// Look up a running job.
    pub fn get(&self, id: JobExecutionId) -> Option<RunningJobHandle> {
        self.read().get(&id).cloned()
    }

    /// Remove a running job unconditionally.
    pub fn remove(&self, id: JobExecutionId) -> Option<RunningJobHandle> {
        self.write().remove(&id)
    }

    /// Remove the entry only if it still belongs to `lifetime`.
    ///
    /// Returns whether an entry was removed.
    pub fn remove_if_owned(&self, id: JobExecutionId, lifetime: LifetimeId) -> bool {
        let mut jobs = self.write();
        if jobs.get(&id).is_some_and(|h| h.lifetime.id() == lifetime) {
            jobs.remove(&id);
            true
        } else {
            false
        }
    }

    /// Whether a job is registered.
    pub fn contains(&self, id: JobExecutionId) -> bool {
        self.read().contains_key(&id)
    }

    /// Number of registered jobs.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no job is registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<JobExecutionId> {
        let mut ids: Vec<_> = self.read().keys().copied().collect();
        ids.sort();
        ids
    }
}
