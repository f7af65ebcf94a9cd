//! Job execution integration tests.
//!
//! Tests that verify a job goes Running and then reaches exactly one
//! terminal state, and that failures stay isolated to their request.

use jobexec::testing::RecordingStatusHandler;
use jobexec::{
    ExecutionStorage, JobExecutionEntity, JobExecutionId, JobExecutionRequest, JobState,
    RegistryError, RegistryPolicy, SchedulerConfig, SchedulerError,
};
use std::time::Duration;

use crate::common::{
    fast_config, scheduler_with, wait_for_terminal_count, wait_for_terminal_state,
};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_start_moves_job_to_running_once() {
    let config = SchedulerConfig {
        tick_interval_ms: 60_000,
        ..fast_config()
    };
    let (scheduler, handler) =
        scheduler_with(vec![JobExecutionEntity::container(1, "g", "alpine")], &config).await;

    scheduler
        .start_execution(&JobExecutionRequest::new(1, "alpine"))
        .await
        .unwrap();

    assert_eq!(scheduler.running_jobs(), vec![JobExecutionId::new(1)]);
    assert_eq!(
        handler.states_for(JobExecutionId::new(1)),
        vec![JobState::Running]
    );
    assert_eq!(handler.transactions(), vec!["start-execution"]);
    assert_eq!(
        scheduler.storage().job_state(JobExecutionId::new(1)).await.unwrap(),
        Some(JobState::Running)
    );

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_missing_job_is_neither_registered_nor_notified() {
    let (scheduler, handler) = scheduler_with(vec![], &fast_config()).await;

    let result = scheduler
        .start_execution(&JobExecutionRequest::new(7, "alpine"))
        .await;

    assert!(matches!(result, Err(SchedulerError::NotFound(_))));
    assert!(scheduler.running_jobs().is_empty());
    assert!(handler.events().is_empty());
}

#[tokio::test]
async fn test_external_job_is_rejected() {
    let (scheduler, handler) = scheduler_with(
        vec![JobExecutionEntity::external(1, "g", "remote-runner")],
        &fast_config(),
    )
    .await;

    let result = scheduler
        .start_execution(&JobExecutionRequest::new(1, "remote-runner"))
        .await;

    assert!(matches!(result, Err(SchedulerError::TypeMismatch { .. })));
    assert!(scheduler.running_jobs().is_empty());
    assert!(handler.events().is_empty());
}

#[tokio::test]
async fn test_job_terminates_after_tick_budget() {
    let (scheduler, handler) =
        scheduler_with(vec![JobExecutionEntity::container(1, "g", "alpine")], &fast_config()).await;

    scheduler
        .start_execution(&JobExecutionRequest::new(1, "alpine"))
        .await
        .unwrap();

    let storage = scheduler.storage();
    let state = wait_for_terminal_state(storage.as_ref(), JobExecutionId::new(1), TIMEOUT).await;
    assert_eq!(state, JobState::finished(0));
    assert!(scheduler.running_jobs().is_empty());

    // Give a stray second transition the chance to show up.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        handler.states_for(JobExecutionId::new(1)),
        vec![JobState::Running, JobState::finished(0)]
    );
    assert_eq!(
        handler.transactions(),
        vec!["start-execution", "finish-execution"]
    );
}

#[tokio::test]
async fn test_terminal_state_depends_on_image_name() {
    let jobs = vec![
        JobExecutionEntity::container(1, "g", "build_toFail"),
        JobExecutionEntity::container(2, "g", "build"),
        JobExecutionEntity::container(3, "g", "_toFail_build"),
        JobExecutionEntity::container(4, "g", "_toFail"),
    ];
    let (scheduler, handler) = scheduler_with(jobs, &fast_config()).await;

    scheduler.schedule_execution(vec![
        JobExecutionRequest::new(1, "build_toFail"),
        JobExecutionRequest::new(2, "build"),
        JobExecutionRequest::new(3, "_toFail_build"),
        JobExecutionRequest::new(4, "_toFail"),
    ]);
    wait_for_terminal_count(&handler, 4, TIMEOUT).await;

    let terminal = |id: u64| handler.states_for(JobExecutionId::new(id))[1].clone();
    assert!(matches!(terminal(1), JobState::Failed { reason } if !reason.is_empty()));
    assert_eq!(terminal(2), JobState::finished(0));
    assert_eq!(terminal(3), JobState::finished(0));
    assert!(matches!(terminal(4), JobState::Failed { .. }));
}

#[tokio::test]
async fn test_custom_failure_marker() {
    let config = SchedulerConfig {
        failure_marker: "-broken".into(),
        ..fast_config()
    };
    let jobs = vec![
        JobExecutionEntity::container(1, "g", "image-broken"),
        JobExecutionEntity::container(2, "g", "image_toFail"),
    ];
    let (scheduler, handler) = scheduler_with(jobs, &config).await;

    scheduler.schedule_execution(vec![
        JobExecutionRequest::new(1, "image-broken"),
        JobExecutionRequest::new(2, "image_toFail"),
    ]);
    wait_for_terminal_count(&handler, 2, TIMEOUT).await;

    assert!(matches!(
        handler.states_for(JobExecutionId::new(1))[1],
        JobState::Failed { .. }
    ));
    assert_eq!(
        handler.states_for(JobExecutionId::new(2))[1],
        JobState::finished(0)
    );
}

#[tokio::test]
async fn test_batch_with_invalid_request_still_runs_the_rest() {
    let jobs = vec![
        JobExecutionEntity::container(1, "g", "first"),
        JobExecutionEntity::container(3, "g", "third"),
    ];
    let (scheduler, handler) = scheduler_with(jobs, &fast_config()).await;

    let dispatched = scheduler.schedule_execution(vec![
        JobExecutionRequest::new(1, "first"),
        JobExecutionRequest::new(2, "missing"),
        JobExecutionRequest::new(3, "third"),
    ]);
    assert_eq!(dispatched, 3);

    wait_for_terminal_count(&handler, 2, TIMEOUT).await;

    for id in [1, 3] {
        assert_eq!(
            handler.states_for(JobExecutionId::new(id)),
            vec![JobState::Running, JobState::finished(0)]
        );
    }
    assert!(handler.states_for(JobExecutionId::new(2)).is_empty());
    assert!(scheduler.running_jobs().is_empty());
}

#[tokio::test]
async fn test_resubscribe_routes_notifications_to_new_handler() {
    let config = SchedulerConfig {
        tick_interval_ms: 60_000,
        ..fast_config()
    };
    let (scheduler, first) =
        scheduler_with(vec![JobExecutionEntity::container(1, "g", "alpine")], &config).await;
    let request = JobExecutionRequest::new(1, "alpine");

    scheduler.start_execution(&request).await.unwrap();

    let second = RecordingStatusHandler::new();
    let previous = scheduler.subscribe(second.clone());
    assert!(previous.is_some());

    scheduler.start_termination(&request).await.unwrap();
    wait_for_terminal_count(&second, 1, TIMEOUT).await;

    assert_eq!(
        first.states_for(JobExecutionId::new(1)),
        vec![JobState::Running]
    );
    assert_eq!(second.events().len(), 1);
    assert!(second.events()[0].new_state.is_terminal());
}

#[tokio::test]
async fn test_jobs_run_concurrently() {
    let jobs = (1..=20u64)
        .map(|id| JobExecutionEntity::container(id, "g", format!("image-{}", id)))
        .collect();
    let (scheduler, handler) = scheduler_with(jobs, &fast_config()).await;

    let start = tokio::time::Instant::now();
    scheduler.schedule_execution(
        (1..=20u64).map(|id| JobExecutionRequest::new(id, format!("image-{}", id))),
    );
    wait_for_terminal_count(&handler, 20, TIMEOUT).await;

    // 20 jobs of 3 ticks each would take at least 600ms one after another.
    assert!(start.elapsed() < Duration::from_millis(600));
    assert_eq!(handler.events().len(), 40);
    assert!(scheduler.running_jobs().is_empty());
}

#[tokio::test]
async fn test_duplicate_start_leaves_running_job_alone_under_overwrite() {
    let config = SchedulerConfig {
        tick_interval_ms: 60_000,
        registry_policy: RegistryPolicy::Overwrite,
        ..fast_config()
    };
    let (scheduler, handler) =
        scheduler_with(vec![JobExecutionEntity::container(1, "g", "alpine")], &config).await;
    let request = JobExecutionRequest::new(1, "alpine");

    scheduler.start_execution(&request).await.unwrap();
    let second = scheduler.start_execution(&request).await;

    assert!(matches!(
        second,
        Err(SchedulerError::Registry(RegistryError::AlreadyRunning(_)))
    ));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(scheduler.running_jobs(), vec![JobExecutionId::new(1)]);
    assert_eq!(
        handler.states_for(JobExecutionId::new(1)),
        vec![JobState::Running]
    );

    // The original job is still the one that gets terminated.
    scheduler.start_termination(&request).await.unwrap();
    wait_for_terminal_count(&handler, 1, TIMEOUT).await;
    assert_eq!(
        handler.states_for(JobExecutionId::new(1)),
        vec![JobState::Running, JobState::finished(0)]
    );
}

#[tokio::test]
async fn test_finished_job_is_not_restarted() {
    let (scheduler, handler) =
        scheduler_with(vec![JobExecutionEntity::container(1, "g", "alpine")], &fast_config()).await;
    let request = JobExecutionRequest::new(1, "alpine");

    scheduler.start_execution(&request).await.unwrap();
    wait_for_terminal_count(&handler, 1, TIMEOUT).await;

    let again = scheduler.start_execution(&request).await;

    assert!(matches!(again, Err(SchedulerError::InvalidTransition { .. })));
    assert!(scheduler.running_jobs().is_empty());
    assert_eq!(handler.events().len(), 2);
}
