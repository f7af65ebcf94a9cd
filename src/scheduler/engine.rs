//! Scheduler facade.
//!
//! The scheduler is responsible for:
//! - Dispatching batches of execution and termination requests
//! - Owning the root lifetime every job lifetime hangs from
//! - Holding the single status subscriber
//! - Graceful shutdown of in-flight jobs

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use super::dispatch::Dispatcher;
use super::execution::{self, ExecutionContext};
use super::hooks::HostNotifier;
use super::notifier::StatusNotifier;
use super::types::{ExecutionSettings, SchedulerError};
use crate::config::SchedulerConfig;
use crate::core::job::JobExecutionRequest;
use crate::core::types::JobExecutionId;
use crate::events::{
    ExecutionObserver, GraphStatusChangedEvent, JobExecutionStatusUpdateHandler,
    JobStatusChangedEvent,
};
use crate::host::{HostProcess, LoggingHost, ProgressLog, TracingProgressLog};
use crate::lifetime::Lifetime;
use crate::registry::JobRegistry;
use crate::storage::{ExecutionStorage, StorageTransaction, TransactionalGateway};

/// Name of the root lifetime created by default.
const ROOT_LIFETIME_NAME: &str = "job-execution-scheduler";

/// Scheduler that runs container job executions.
pub struct JobExecutionScheduler<S: ExecutionStorage> {
    /// Storage backend.
    storage: Arc<S>,
    /// Running jobs keyed by execution id.
    registry: JobRegistry,
    /// Subscriber slot and state machine.
    notifier: Arc<StatusNotifier>,
    /// Lifetime every job lifetime is nested under.
    root: Lifetime,
    /// Spawns request handling and terminal transitions.
    dispatcher: Dispatcher,
    /// Sink for workload progress lines.
    progress: Arc<dyn ProgressLog>,
    /// Resolved execution settings.
    settings: Arc<ExecutionSettings>,
    /// Pre-commit hooks.
    observer: HostNotifier,
}

impl<S: ExecutionStorage + 'static> JobExecutionScheduler<S> {
    /// Create a new scheduler with the given storage.
    pub fn new(storage: S) -> Self {
        Self::with_storage(Arc::new(storage))
    }

    /// Create a new scheduler with shared storage.
    pub fn with_storage(storage: Arc<S>) -> Self {
        Self {
            storage,
            registry: JobRegistry::new(),
            notifier: Arc::new(StatusNotifier::new()),
            root: Lifetime::root(ROOT_LIFETIME_NAME),
            dispatcher: Dispatcher::current(),
            progress: Arc::new(TracingProgressLog),
            settings: Arc::new(ExecutionSettings::default()),
            observer: HostNotifier::new(Arc::new(LoggingHost)),
        }
    }

    /// Apply scheduler settings.
    ///
    /// Replaces the registry with an empty one using the configured policy.
    pub fn with_config(mut self, config: &SchedulerConfig) -> Self {
        self.settings = Arc::new(ExecutionSettings::from(config));
        self.registry = JobRegistry::with_policy(config.registry_policy);
        self
    }

    /// Set the job registry.
    pub fn with_registry(mut self, registry: JobRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the progress log.
    pub fn with_progress_log(mut self, progress: Arc<dyn ProgressLog>) -> Self {
        self.progress = progress;
        self
    }

    /// Set the host process signalled on graph completion.
    pub fn with_host(mut self, host: Arc<dyn HostProcess>) -> Self {
        self.observer = HostNotifier::new(host);
        self
    }

    /// Spawn all work on `runtime` instead of the current one.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.dispatcher = Dispatcher::with_runtime(runtime);
        self
    }

    /// Nest every job lifetime under `root`.
    pub fn with_root_lifetime(mut self, root: Lifetime) -> Self {
        self.root = root;
        self
    }

    /// Set the workload tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        Arc::make_mut(&mut self.settings).tick_interval = interval;
        self
    }

    /// Set the graceful shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        Arc::make_mut(&mut self.settings).shutdown_timeout = timeout;
        self
    }

    fn context(&self) -> ExecutionContext<S> {
        ExecutionContext {
            gateway: TransactionalGateway::new(Arc::clone(&self.storage)),
            registry: self.registry.clone(),
            notifier: Arc::clone(&self.notifier),
            root: self.root.clone(),
            dispatcher: self.dispatcher.clone(),
            progress: Arc::clone(&self.progress),
            settings: Arc::clone(&self.settings),
        }
    }

    /// Register the status subscriber, replacing the previous one.
    pub fn subscribe(
        &self,
        handler: Arc<dyn JobExecutionStatusUpdateHandler>,
    ) -> Option<Arc<dyn JobExecutionStatusUpdateHandler>> {
        let previous = self.notifier.subscribe(handler);
        if previous.is_some() {
            tracing::debug!("Status update handler replaced");
        }
        previous
    }

    /// Start every request in the batch concurrently.
    ///
    /// Each request runs in its own task; a failing request is logged and
    /// does not affect the others. Returns the number of requests dispatched.
    pub fn schedule_execution(
        &self,
        requests: impl IntoIterator<Item = JobExecutionRequest>,
    ) -> usize {
        let mut dispatched = 0;
        for request in requests {
            let ctx = self.context();
            let id = request.id();
            let spawned = self.dispatcher.spawn(async move {
                if let Err(e) = execution::start_execution(&ctx, &request).await {
                    tracing::error!(
                        job_id = %request.id(),
                        error = %e,
                        "Failed to start job execution"
                    );
                }
            });
            match spawned {
                Ok(_) => dispatched += 1,
                Err(e) => {
                    tracing::error!(job_id = %id, error = %e, "Failed to dispatch job execution")
                }
            }
        }
        dispatched
    }

    /// Terminate every request in the batch concurrently.
    ///
    /// Failures are logged per request. Returns the number of requests
    /// dispatched.
    pub fn schedule_termination(
        &self,
        requests: impl IntoIterator<Item = JobExecutionRequest>,
    ) -> usize {
        let mut dispatched = 0;
        for request in requests {
            let ctx = self.context();
            let id = request.id();
            let spawned = self.dispatcher.spawn(async move {
                if let Err(e) = execution::start_termination(&ctx, &request).await {
                    tracing::error!(
                        job_id = %request.id(),
                        error = %e,
                        "Failed to terminate job execution"
                    );
                }
            });
            match spawned {
                Ok(_) => dispatched += 1,
                Err(e) => {
                    tracing::error!(job_id = %id, error = %e, "Failed to dispatch job termination")
                }
            }
        }
        dispatched
    }

    /// Start one job execution and wait until it is Running.
    pub async fn start_execution(
        &self,
        request: &JobExecutionRequest,
    ) -> Result<(), SchedulerError> {
        execution::start_execution(&self.context(), request).await
    }

    /// Request cooperative termination of one running job execution.
    pub async fn start_termination(
        &self,
        request: &JobExecutionRequest,
    ) -> Result<(), SchedulerError> {
        execution::start_termination(&self.context(), request).await
    }

    /// Get the job registry.
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Ids of the job executions currently running.
    pub fn running_jobs(&self) -> Vec<JobExecutionId> {
        self.registry.ids()
    }

    /// Get the storage backend.
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Observer hooks of this scheduler, for wiring into a status tracker.
    pub fn observer(&self) -> Arc<dyn ExecutionObserver> {
        Arc::new(self.observer.clone())
    }

    /// Get the root lifetime.
    pub fn root_lifetime(&self) -> &Lifetime {
        &self.root
    }

    /// Whether the scheduler has been shut down.
    pub fn is_shut_down(&self) -> bool {
        self.root.is_terminated()
    }

    /// Terminate every running job and wait for their terminal transitions.
    ///
    /// Returns the number of tasks still running when the shutdown timeout
    /// expired.
    pub async fn shutdown(&self) -> usize {
        let running = self.registry.len();
        tracing::info!(
            "Graceful shutdown: terminating {} running job(s) (timeout: {:?})",
            running,
            self.settings.shutdown_timeout
        );

        if let Err(e) = self.root.terminate() {
            tracing::error!(error = %e, "Root lifetime cleanup failed");
        }
        self.dispatcher.drain(self.settings.shutdown_timeout).await
    }
}

impl<S: ExecutionStorage> ExecutionObserver for JobExecutionScheduler<S> {
    fn on_before_graph_status_changed(
        &self,
        tx: &mut dyn StorageTransaction,
        events: &[GraphStatusChangedEvent],
    ) {
        self.observer.on_before_graph_status_changed(tx, events);
    }

    fn on_before_job_status_changed(
        &self,
        tx: &mut dyn StorageTransaction,
        events: &[JobStatusChangedEvent],
    ) {
        self.observer.on_before_job_status_changed(tx, events);
    }
}
