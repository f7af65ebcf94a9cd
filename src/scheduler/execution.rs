//! Execution task of a single job.
//!
//! A job execution goes through three steps:
//!
//! 1. In the `start-execution` transaction: load the record, check its kind
//!    and that it has not started yet, open a child lifetime, register the
//!    running handle, move to Running.
//! 2. Run the simulated container: tick until the tick budget is spent,
//!    then terminate the job's lifetime.
//! 3. On lifetime termination (from the workload or a termination request):
//!    deregister, stop ticking, and hand the terminal transition to the
//!    root dispatcher, which runs it in the `finish-execution` transaction.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::dispatch::Dispatcher;
use super::notifier::StatusNotifier;
use super::types::{ExecutionSettings, FINISH_EXECUTION_TX, START_EXECUTION_TX, SchedulerError};
use crate::core::job::{JobExecutionEntity, JobExecutionRequest};
use crate::core::state::JobState;
use crate::core::types::JobExecutionId;
use crate::host::ProgressLog;
use crate::lifetime::Lifetime;
use crate::registry::{JobRegistry, RegistryError, RunningJobHandle};
use crate::storage::{ExecutionStorage, TransactionalGateway};

/// Everything an execution task needs, cheap to clone into spawned tasks.
pub(crate) struct ExecutionContext<S> {
    pub(crate) gateway: TransactionalGateway<S>,
    pub(crate) registry: JobRegistry,
    pub(crate) notifier: Arc<StatusNotifier>,
    pub(crate) root: Lifetime,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) progress: Arc<dyn ProgressLog>,
    pub(crate) settings: Arc<ExecutionSettings>,
}

impl<S> Clone for ExecutionContext<S> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            registry: self.registry.clone(),
            notifier: Arc::clone(&self.notifier),
            root: self.root.clone(),
            dispatcher: self.dispatcher.clone(),
            progress: Arc::clone(&self.progress),
            settings: Arc::clone(&self.settings),
        }
    }
}

/// Start a job execution and its simulated workload.
///
/// Returns once the job is Running; the workload continues in the
/// background.
pub(crate) async fn start_execution<S>(
    ctx: &ExecutionContext<S>,
    request: &JobExecutionRequest,
) -> Result<(), SchedulerError>
where
    S: ExecutionStorage + 'static,
{
    if ctx.root.is_terminated() {
        return Err(SchedulerError::ShuttingDown);
    }

    let id = request.id();
    let mut registered: Option<Lifetime> = None;

    let started = ctx
        .gateway
        .with_transaction(START_EXECUTION_TX, |tx| {
            let entity = tx
                .find_job_execution(id)?
                .ok_or(SchedulerError::NotFound(id))?;
            let image = match entity.container_meta() {
                Some(meta) => meta.image.clone(),
                None => {
                    return Err(SchedulerError::TypeMismatch {
                        id,
                        kind: entity.kind.name(),
                    });
                }
            };

            // A started job never runs again, so only stale handles get replaced.
            match tx.job_state(id)? {
                None => {}
                Some(JobState::Running) => {
                    return Err(RegistryError::AlreadyRunning(id).into());
                }
                Some(state) => {
                    return Err(SchedulerError::InvalidTransition {
                        id,
                        from: state.to_string(),
                        to: JobState::Running,
                    });
                }
            }

            ctx.progress
                .log(format!("prepare to run: image={}, id={}", image, request));

            let lifetime = ctx.root.nested(format!("job-{}", id));
            let handle = RunningJobHandle::new(id, image.clone(), lifetime.clone());
            if let Err(e) = ctx.registry.put(handle) {
                terminate_logged(&lifetime, id);
                return Err(e.into());
            }
            registered = Some(lifetime.clone());

            ctx.notifier.change_state(tx, &entity, JobState::Running)?;
            Ok((entity, image, lifetime))
        })
        .await;

    let (entity, image, lifetime) = match started {
        Ok(started) => started,
        Err(e) => {
            // Nothing was committed; undo the in-memory registration.
            if let Some(lifetime) = registered {
                ctx.registry.remove_if_owned(id, lifetime.id());
                terminate_logged(&lifetime, id);
            }
            return Err(e);
        }
    };

    tracing::info!(job_id = %id, image = %image, "Job execution running");

    let workload = match ctx.dispatcher.spawn(run_workload(
        lifetime.clone(),
        id,
        image.clone(),
        Arc::clone(&ctx.progress),
        ctx.settings.tick_interval,
        ctx.settings.ticks_to_complete,
    )) {
        Ok(abort) => Some(abort),
        Err(e) => {
            tracing::error!(job_id = %id, error = %e, "Failed to start workload");
            None
        }
    };
    let workload_started = workload.is_some();

    let cleanup_ctx = ctx.clone();
    let owner = lifetime.id();
    lifetime.on_termination(move || {
        cleanup_ctx.registry.remove_if_owned(id, owner);
        if let Some(workload) = workload {
            workload.abort();
        }
        cleanup_ctx
            .progress
            .log(format!("stop: image={}, id={}", image, id));

        let final_state = cleanup_ctx.settings.terminal_policy.final_state(&image);
        let finish_ctx = cleanup_ctx.clone();
        cleanup_ctx.dispatcher.spawn(async move {
            finish_execution(&finish_ctx, &entity, final_state).await;
        })?;
        Ok(())
    })?;

    if !workload_started {
        terminate_logged(&lifetime, id);
    }

    Ok(())
}

/// Cooperatively cancel a running job execution.
///
/// The job's own cleanup produces the terminal state.
pub(crate) async fn start_termination<S>(
    ctx: &ExecutionContext<S>,
    request: &JobExecutionRequest,
) -> Result<(), SchedulerError>
where
    S: ExecutionStorage + 'static,
{
    let id = request.id();
    if !ctx.settings.allow_termination {
        return Err(SchedulerError::Unsupported(format!(
            "terminating job execution {}",
            id
        )));
    }

    let handle = ctx.registry.get(id).ok_or(SchedulerError::NotRunning(id))?;
    ctx.progress.log(format!(
        "terminate: image={}, id={}",
        handle.image(),
        request
    ));

    if !handle.lifetime().terminate()? {
        tracing::debug!(job_id = %id, "Job execution was already terminating");
    }
    Ok(())
}

/// Simulated container: tick until the budget is spent, then exit.
async fn run_workload(
    lifetime: Lifetime,
    id: JobExecutionId,
    image: String,
    progress: Arc<dyn ProgressLog>,
    interval: Duration,
    ticks: u32,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    let mut counter: u32 = 0;
    loop {
        tokio::select! {
            _ = lifetime.terminated() => {
                tracing::debug!(job_id = %id, ticks = counter, "Workload cancelled");
                break;
            }
            _ = ticker.tick() => {
                progress.log(format!("run dummy container '{}'. counter = {}", image, counter));
                counter += 1;
                if counter >= ticks {
                    tracing::debug!(job_id = %id, ticks = counter, "Workload exited");
                    terminate_logged(&lifetime, id);
                    break;
                }
            }
        }
    }
}

/// Record the terminal state of a job execution.
async fn finish_execution<S>(
    ctx: &ExecutionContext<S>,
    entity: &JobExecutionEntity,
    state: JobState,
) where
    S: ExecutionStorage + 'static,
{
    let id = entity.id;
    let result = ctx
        .gateway
        .with_transaction(FINISH_EXECUTION_TX, |tx| {
            ctx.notifier.change_state(tx, entity, state.clone())
        })
        .await;

    match result {
        Ok(()) => {
            tracing::info!(job_id = %id, state = %state, "Job execution reached terminal state")
        }
        Err(e) => {
            tracing::error!(job_id = %id, error = %e, "Failed to record terminal state")
        }
    }
}

fn terminate_logged(lifetime: &Lifetime, id: JobExecutionId) {
    if let Err(e) = lifetime.terminate() {
        tracing::error!(job_id = %id, error = %e, "Job lifetime cleanup failed");
    }
}
